use crate::ir::Class;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::Declaration;
use crate::ir::ExprId;
use crate::ir::Expression;
use crate::ir::Field;
use crate::ir::Function;
use crate::ir::Origin;
use crate::ir::Package;
use crate::ir::Parameter;
use crate::ir::ParameterKind;
use crate::ir::Property;
use crate::ir::Type;
use anyhow::Result;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;

/// Platform that the module is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Platform {
    Jvm,
    Js,
    Native,
    Common,
    Multiplatform,
}

impl Platform {
    pub fn from_name(name: &str) -> Result<Platform> {
        match name {
            "jvm" => Ok(Platform::Jvm),
            "js" => Ok(Platform::Js),
            "native" => Ok(Platform::Native),
            "common" => Ok(Platform::Common),
            "multiplatform" => Ok(Platform::Multiplatform),
            _ => Err(anyhow::anyhow!("Unknown platform: {name}")),
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Jvm => "jvm",
            Platform::Js => "js",
            Platform::Native => "native",
            Platform::Common => "common",
            Platform::Multiplatform => "multiplatform",
        }
    }
}

impl Display for Platform {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A compilation unit.
///
/// The module is an arena that owns all declarations and expressions. Nodes
/// refer to each other via [DeclId] and [ExprId] only. Replacing a
/// declaration registers a mapping from the old id to the new id (see
/// [Module::replace_decl]) instead of mutating the old declaration, so
/// references that were created before the replacement stay valid.
#[derive(Clone, Debug)]
pub struct Module {
    name: String,
    target: Platform,
    decls: Vec<Declaration>,
    exprs: Vec<Expression>,
    packages: Vec<DeclId>,
    replacements: HashMap<DeclId, DeclId>,
}

impl Module {
    pub fn new(name: &str, target: Platform) -> Self {
        Module {
            name: name.to_string(),
            target,
            decls: vec![],
            exprs: vec![],
            packages: vec![],
            replacements: HashMap::new(),
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn target(&self) -> Platform {
        self.target
    }
    pub fn set_target(&mut self, target: Platform) {
        self.target = target;
    }
    pub fn packages(&self) -> &[DeclId] {
        &self.packages
    }
    pub fn add_package(&mut self, fq_name: &str, external: bool) -> DeclId {
        let package = Package {
            fq_name: fq_name.to_string(),
            external,
            declarations: vec![],
        };
        let name = fq_name.rsplit('.').next().unwrap_or(fq_name);
        let decl = Declaration::new(name, None, Origin::Defined, DeclKind::Package(package));
        let id = self.add_decl(decl);
        self.packages.push(id);
        id
    }
    /// Add a declaration to the arena without attaching it to a container.
    pub fn add_decl(&mut self, decl: Declaration) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(decl);
        id
    }
    pub fn decl(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }
    pub fn decl_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.decls[id.index()]
    }
    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }
    pub fn add_expr(&mut self, expr: Expression) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        id
    }
    pub fn expr(&self, id: ExprId) -> &Expression {
        &self.exprs[id.index()]
    }
    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expression {
        &mut self.exprs[id.index()]
    }
    pub fn name_of(&self, id: DeclId) -> &str {
        &self.decl(id).name
    }
    pub fn function(&self, id: DeclId) -> Option<&Function> {
        self.decl(id).as_function()
    }
    pub fn function_mut(&mut self, id: DeclId) -> Option<&mut Function> {
        self.decl_mut(id).as_function_mut()
    }
    pub fn class(&self, id: DeclId) -> Option<&Class> {
        self.decl(id).as_class()
    }
    pub fn field(&self, id: DeclId) -> Option<&Field> {
        self.decl(id).as_field()
    }
    pub fn property(&self, id: DeclId) -> Option<&Property> {
        self.decl(id).as_property()
    }
    pub fn parameter(&self, id: DeclId) -> Option<&Parameter> {
        self.decl(id).as_parameter()
    }
    pub fn package(&self, id: DeclId) -> Option<&Package> {
        self.decl(id).as_package()
    }
    /// Members of a package or class (empty for other declarations).
    pub fn members(&self, container: DeclId) -> Vec<DeclId> {
        self.decl(container)
            .declarations()
            .cloned()
            .unwrap_or_default()
    }
    /// Append `member` to the members of `container` and set its parent.
    pub fn add_member(&mut self, container: DeclId, member: DeclId) {
        if let Some(declarations) = self.decl_mut(container).declarations_mut() {
            declarations.push(member);
        }
        self.decl_mut(member).parent = Some(container);
    }
    pub fn insert_member(&mut self, container: DeclId, index: usize, member: DeclId) {
        if let Some(declarations) = self.decl_mut(container).declarations_mut() {
            let index = index.min(declarations.len());
            declarations.insert(index, member);
        }
        self.decl_mut(member).parent = Some(container);
    }
    /// Replace `old` by `new` in the members of `container`.
    ///
    /// Returns false if `old` is not a member of `container`.
    pub fn replace_member(&mut self, container: DeclId, old: DeclId, new: DeclId) -> bool {
        let replaced = match self.decl_mut(container).declarations_mut() {
            Some(declarations) => match declarations.iter().position(|d| *d == old) {
                Some(index) => {
                    declarations[index] = new;
                    true
                }
                None => false,
            },
            None => false,
        };
        if replaced {
            self.decl_mut(new).parent = Some(container);
        }
        replaced
    }
    /// Swap `old` out for `new` in the container of `old`.
    ///
    /// The old declaration is left untouched in the arena and stays
    /// resolvable; [Module::resolve] maps it to its replacement.
    pub fn replace_decl(&mut self, old: DeclId, new: DeclId) {
        if let Some(container) = self.decl(old).parent {
            self.replace_member(container, old, new);
        }
        self.replacements.insert(old, new);
    }
    /// Follow the replacement chain of `id`.
    pub fn resolve(&self, id: DeclId) -> DeclId {
        let mut current = id;
        while let Some(next) = self.replacements.get(&current) {
            current = *next;
        }
        current
    }
    /// Whether `id` has been swapped out by [Module::replace_decl].
    pub fn is_replaced(&self, id: DeclId) -> bool {
        self.replacements.contains_key(&id)
    }
    /// Ancestors of `id`, innermost first.
    pub fn parents(&self, id: DeclId) -> Vec<DeclId> {
        let mut out = vec![];
        let mut current = self.decl(id).parent;
        while let Some(parent) = current {
            out.push(parent);
            current = self.decl(parent).parent;
        }
        out
    }
    /// Package that (transitively) contains `id`.
    pub fn package_of(&self, id: DeclId) -> Option<DeclId> {
        if self.package(id).is_some() {
            return Some(id);
        }
        self.parents(id)
            .into_iter()
            .find(|p| self.package(*p).is_some())
    }
    /// Whether `id` is declared in a package from the dependency closure.
    pub fn is_external(&self, id: DeclId) -> bool {
        match self.package_of(id) {
            Some(package) => self.package(package).map(|p| p.external).unwrap_or(false),
            None => false,
        }
    }
    /// Fully qualified name such as `kotlinx.stm.STM.wrap`.
    pub fn fq_name(&self, id: DeclId) -> String {
        if let Some(package) = self.package(id) {
            return package.fq_name.clone();
        }
        let mut segments = vec![self.name_of(id).to_string()];
        for parent in self.parents(id) {
            match self.package(parent) {
                Some(package) => {
                    segments.push(package.fq_name.clone());
                    break;
                }
                None => segments.push(self.name_of(parent).to_string()),
            }
        }
        segments.reverse();
        segments.join(".")
    }
    fn packages_named(&self, fq_name: &str) -> Vec<DeclId> {
        self.packages
            .iter()
            .copied()
            .filter(|p| self.package(*p).map(|p| p.fq_name == fq_name).unwrap_or(false))
            .collect()
    }
    /// Find a class by package and simple name across the module and its
    /// dependencies.
    pub fn find_class(&self, package: &str, name: &str) -> Option<DeclId> {
        self.packages_named(package)
            .into_iter()
            .flat_map(|p| self.members(p))
            .find(|d| self.class(*d).is_some() && self.name_of(*d) == name)
    }
    /// Find top-level functions (all overloads) by package and simple name.
    pub fn find_functions(&self, package: &str, name: &str) -> Vec<DeclId> {
        self.packages_named(package)
            .into_iter()
            .flat_map(|p| self.members(p))
            .filter(|d| self.function(*d).is_some() && self.name_of(*d) == name)
            .collect()
    }
    /// Supertypes of `class` that resolve to classes in this module.
    pub fn superclasses(&self, class: DeclId) -> Vec<DeclId> {
        match self.class(class) {
            Some(class) => class
                .supertypes
                .iter()
                .filter_map(|t| t.class_or_none())
                .collect(),
            None => vec![],
        }
    }
    /// Member functions named `name` declared in `class` or its supertypes.
    ///
    /// Own declarations come first.
    pub fn find_member_functions(&self, class: DeclId, name: &str) -> Vec<DeclId> {
        let mut out: Vec<DeclId> = self
            .members(class)
            .into_iter()
            .filter(|d| self.function(*d).is_some() && self.name_of(*d) == name)
            .collect();
        for superclass in self.superclasses(class) {
            out.extend(self.find_member_functions(superclass, name));
        }
        out
    }
    /// First member function named `name` declared directly in `class`.
    pub fn find_method(&self, class: DeclId, name: &str) -> Option<DeclId> {
        self.members(class)
            .into_iter()
            .find(|d| self.function(*d).is_some() && self.name_of(*d) == name)
    }
    /// Property named `name` in `class` or its supertypes.
    pub fn find_property(&self, class: DeclId, name: &str) -> Option<DeclId> {
        let own = self
            .members(class)
            .into_iter()
            .find(|d| self.property(*d).is_some() && self.name_of(*d) == name);
        if own.is_some() {
            return own;
        }
        self.superclasses(class)
            .into_iter()
            .find_map(|s| self.find_property(s, name))
    }
    /// Field named `name` in `class` or its supertypes, including the backing
    /// fields of properties.
    pub fn find_field(&self, class: DeclId, name: &str) -> Option<DeclId> {
        for member in self.members(class) {
            if self.field(member).is_some() && self.name_of(member) == name {
                return Some(member);
            }
            if let Some(property) = self.property(member) {
                if self.name_of(member) == name && property.backing_field.is_some() {
                    return property.backing_field;
                }
            }
        }
        self.superclasses(class)
            .into_iter()
            .find_map(|s| self.find_field(s, name))
    }
    pub fn class_has_annotation(&self, class: DeclId, annotation: &str) -> bool {
        match self.class(class) {
            Some(class) => class.annotations.iter().any(|a| a == annotation),
            None => false,
        }
    }
    /// Type of instances of `class` with the type parameters as arguments.
    pub fn class_type(&self, class: DeclId) -> Type {
        let arguments = match self.class(class) {
            Some(c) => c
                .type_parameters
                .iter()
                .map(|p| Type::Parameter(p.clone()))
                .collect(),
            None => vec![],
        };
        Type::class(class, self.name_of(class), arguments)
    }
    /// Whether `typ` (ignoring nullability) is the class with the given
    /// fully qualified name.
    pub fn is_class_with_fq_name(&self, typ: &Type, fq_name: &str) -> bool {
        match typ.class_or_none() {
            Some(class) => self.fq_name(class) == fq_name,
            None => false,
        }
    }
    /// Classes declared in the module itself (not in dependencies).
    pub fn classes(&self) -> Vec<DeclId> {
        self.packages
            .iter()
            .filter(|p| !self.package(**p).map(|p| p.external).unwrap_or(true))
            .flat_map(|p| self.members(*p))
            .filter(|d| self.class(*d).is_some())
            .collect()
    }
    /// Named functions declared in the module itself: top-level functions
    /// and class members. Closures are not included.
    pub fn functions(&self) -> Vec<DeclId> {
        let mut out = vec![];
        for package in self.packages.iter() {
            if self.package(*package).map(|p| p.external).unwrap_or(true) {
                continue;
            }
            for member in self.members(*package) {
                if self.function(member).is_some() {
                    out.push(member);
                } else if self.class(member).is_some() {
                    out.extend(
                        self.members(member)
                            .into_iter()
                            .filter(|d| self.function(*d).is_some()),
                    );
                }
            }
        }
        out
    }
    /// Create a parameter owned by `function`.
    ///
    /// The parameter is not attached to the function signature; callers set
    /// the receiver or value parameter slot themselves.
    pub fn new_parameter(
        &mut self,
        function: DeclId,
        name: &str,
        typ: Type,
        kind: ParameterKind,
        index: usize,
    ) -> DeclId {
        let parameter = Parameter { typ, index, kind };
        let decl = Declaration::new(
            name,
            Some(function),
            Origin::Defined,
            DeclKind::Parameter(parameter),
        );
        self.add_decl(decl)
    }
    /// Value and receiver parameters of `function` in the order receivers,
    /// value parameters.
    pub fn all_parameters(&self, function: DeclId) -> Vec<DeclId> {
        match self.function(function) {
            Some(f) => f
                .dispatch_receiver
                .iter()
                .chain(f.extension_receiver.iter())
                .chain(f.value_parameters.iter())
                .copied()
                .collect(),
            None => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Visibility;

    fn function(name: &str) -> Declaration {
        let function = Function::new(Visibility::Public, Type::Unit);
        Declaration::new(name, None, Origin::Defined, DeclKind::Function(function))
    }

    #[test]
    fn test_replace_decl() {
        let mut module = Module::new("test", Platform::Jvm);
        let package = module.add_package("demo", false);
        let old = module.add_decl(function("transfer"));
        module.add_member(package, old);
        let new = module.add_decl(function("transfer"));
        module.replace_decl(old, new);

        assert_eq!(module.members(package), vec![new]);
        assert_eq!(module.decl(new).parent, Some(package));
        assert_eq!(module.resolve(old), new);
        assert_eq!(module.resolve(new), new);
        assert!(module.is_replaced(old));
        assert_eq!(module.fq_name(new), "demo.transfer");
        assert_eq!(module.find_functions("demo", "transfer"), vec![new]);
        assert_eq!(module.functions(), vec![new]);
    }

    #[test]
    fn test_platform() {
        assert_eq!(Platform::from_name("js").unwrap(), Platform::Js);
        assert_eq!(Platform::Native.to_string(), "native");
        assert!(Platform::from_name("wasm").is_err());
    }
}
