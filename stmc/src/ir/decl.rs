use crate::ir::DeclId;
use crate::ir::ExprId;
use crate::ir::Type;

/// Where a declaration comes from.
///
/// Origins other than [Origin::Defined] mark code that was produced by the
/// compiler rather than written by the user. The STM lowering uses
/// [Origin::Transactional] and [Origin::StmPlugin] to never process its own
/// output twice.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Defined,
    /// Inherited member that is not textually declared in the class.
    FakeOverride,
    /// Default `<get-x>`/`<set-x>` accessor of a property.
    PropertyAccessor,
    /// Backing field of a property.
    BackingField,
    /// Accessor stub (`getX`/`setX`) generated by the resolution extension.
    SyntheticAccessor,
    /// STM handle field and delegate fields.
    DelegatedMember,
    /// Method whose body was wrapped into a transaction.
    Transactional,
    /// Closures and context-extended functions generated by the lowering.
    StmPlugin,
}

impl Origin {
    /// Keyword used in the textual form, if any.
    pub fn keyword(&self) -> Option<&'static str> {
        match self {
            Origin::FakeOverride => Some("fake"),
            Origin::SyntheticAccessor => Some("synthetic"),
            Origin::DelegatedMember => Some("delegated"),
            Origin::Transactional => Some("transactional"),
            Origin::StmPlugin => Some("generated"),
            Origin::Defined | Origin::PropertyAccessor | Origin::BackingField => None,
        }
    }
    pub fn from_keyword(keyword: &str) -> Option<Origin> {
        match keyword {
            "fake" => Some(Origin::FakeOverride),
            "synthetic" => Some(Origin::SyntheticAccessor),
            "delegated" => Some(Origin::DelegatedMember),
            "transactional" => Some(Origin::Transactional),
            "generated" => Some(Origin::StmPlugin),
            _ => None,
        }
    }
    /// Whether the declaration was produced by the STM lowering itself.
    pub fn is_stm_generated(&self) -> bool {
        matches!(self, Origin::Transactional | Origin::StmPlugin)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
    /// Closures and other declarations that are only visible in their parent.
    Local,
}

#[derive(Clone, Debug)]
pub struct Declaration {
    pub name: String,
    /// Structural parent. Packages are the only declarations without one.
    pub parent: Option<DeclId>,
    pub origin: Origin,
    pub kind: DeclKind,
}

#[derive(Clone, Debug)]
pub enum DeclKind {
    Package(Package),
    Class(Class),
    Function(Function),
    Field(Field),
    Property(Property),
    Parameter(Parameter),
    Variable(Variable),
}

#[derive(Clone, Debug)]
pub struct Package {
    /// Fully qualified name such as `kotlinx.stm`.
    pub fq_name: String,
    /// Declarations from the dependency closure of the module; these have no
    /// bodies and are not lowered.
    pub external: bool,
    pub declarations: Vec<DeclId>,
}

#[derive(Clone, Debug)]
pub struct Class {
    pub is_interface: bool,
    pub annotations: Vec<String>,
    pub type_parameters: Vec<String>,
    pub supertypes: Vec<Type>,
    /// Receiver that is in scope inside field initializers.
    pub this_receiver: DeclId,
    pub declarations: Vec<DeclId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessorKind {
    Getter,
    Setter,
}

/// Links a default property accessor to its property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Accessor {
    pub property: DeclId,
    pub kind: AccessorKind,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub annotations: Vec<String>,
    pub visibility: Visibility,
    pub type_parameters: Vec<String>,
    pub dispatch_receiver: Option<DeclId>,
    pub extension_receiver: Option<DeclId>,
    pub value_parameters: Vec<DeclId>,
    pub return_type: Type,
    /// Statements of the block body; `None` for declarations without body.
    pub body: Option<Vec<ExprId>>,
    pub accessor: Option<Accessor>,
    /// Functions in supertypes that this function overrides.
    pub overridden: Vec<DeclId>,
}

impl Function {
    /// A function without parameters, annotations and body.
    pub fn new(visibility: Visibility, return_type: Type) -> Self {
        Function {
            annotations: vec![],
            visibility,
            type_parameters: vec![],
            dispatch_receiver: None,
            extension_receiver: None,
            value_parameters: vec![],
            return_type,
            body: None,
            accessor: None,
            overridden: vec![],
        }
    }
    pub fn has_annotation(&self, name: &str) -> bool {
        self.annotations.iter().any(|a| a == name)
    }
}

#[derive(Clone, Debug)]
pub struct Field {
    pub typ: Type,
    pub visibility: Visibility,
    pub is_final: bool,
    pub initializer: Option<ExprId>,
}

#[derive(Clone, Debug)]
pub struct Property {
    pub typ: Type,
    pub visibility: Visibility,
    pub is_var: bool,
    pub backing_field: Option<DeclId>,
    pub getter: Option<DeclId>,
    pub setter: Option<DeclId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParameterKind {
    DispatchReceiver,
    ExtensionReceiver,
    Value,
}

#[derive(Clone, Debug)]
pub struct Parameter {
    pub typ: Type,
    pub index: usize,
    pub kind: ParameterKind,
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub typ: Type,
    pub initializer: ExprId,
}

impl Declaration {
    pub fn new(name: &str, parent: Option<DeclId>, origin: Origin, kind: DeclKind) -> Self {
        Declaration {
            name: name.to_string(),
            parent,
            origin,
            kind,
        }
    }
    pub fn as_package(&self) -> Option<&Package> {
        match &self.kind {
            DeclKind::Package(package) => Some(package),
            _ => None,
        }
    }
    pub fn as_class(&self) -> Option<&Class> {
        match &self.kind {
            DeclKind::Class(class) => Some(class),
            _ => None,
        }
    }
    pub fn as_function(&self) -> Option<&Function> {
        match &self.kind {
            DeclKind::Function(function) => Some(function),
            _ => None,
        }
    }
    pub fn as_field(&self) -> Option<&Field> {
        match &self.kind {
            DeclKind::Field(field) => Some(field),
            _ => None,
        }
    }
    pub fn as_property(&self) -> Option<&Property> {
        match &self.kind {
            DeclKind::Property(property) => Some(property),
            _ => None,
        }
    }
    pub fn as_parameter(&self) -> Option<&Parameter> {
        match &self.kind {
            DeclKind::Parameter(parameter) => Some(parameter),
            _ => None,
        }
    }
    pub fn as_function_mut(&mut self) -> Option<&mut Function> {
        match &mut self.kind {
            DeclKind::Function(function) => Some(function),
            _ => None,
        }
    }
    pub fn as_class_mut(&mut self) -> Option<&mut Class> {
        match &mut self.kind {
            DeclKind::Class(class) => Some(class),
            _ => None,
        }
    }
    /// Type of a value-like declaration (parameter, variable, field or
    /// property).
    pub fn value_type(&self) -> Option<&Type> {
        match &self.kind {
            DeclKind::Parameter(parameter) => Some(&parameter.typ),
            DeclKind::Variable(variable) => Some(&variable.typ),
            DeclKind::Field(field) => Some(&field.typ),
            DeclKind::Property(property) => Some(&property.typ),
            _ => None,
        }
    }
    /// Members of a package or class.
    pub fn declarations(&self) -> Option<&Vec<DeclId>> {
        match &self.kind {
            DeclKind::Package(package) => Some(&package.declarations),
            DeclKind::Class(class) => Some(&class.declarations),
            _ => None,
        }
    }
    pub fn declarations_mut(&mut self) -> Option<&mut Vec<DeclId>> {
        match &mut self.kind {
            DeclKind::Package(package) => Some(&mut package.declarations),
            DeclKind::Class(class) => Some(&mut class.declarations),
            _ => None,
        }
    }
}
