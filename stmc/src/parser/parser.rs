use crate::ir::Accessor;
use crate::ir::AccessorKind;
use crate::ir::BinOp;
use crate::ir::Call;
use crate::ir::Class;
use crate::ir::Const;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::Declaration;
use crate::ir::ExprId;
use crate::ir::ExprKind;
use crate::ir::Expression;
use crate::ir::Field;
use crate::ir::Function;
use crate::ir::Module;
use crate::ir::Origin;
use crate::ir::ParameterKind;
use crate::ir::Platform;
use crate::ir::Property;
use crate::ir::Type;
use crate::ir::Variable;
use crate::ir::Visibility;
use crate::parser::scanner::Scanner;
use crate::parser::token::Token;
use crate::parser::token::TokenKind;
use anyhow::Result;
use tracing::debug;

/// Unresolved type as written in the source.
#[derive(Clone, Debug)]
enum TypeSyntax {
    Named {
        token: Token,
        arguments: Vec<TypeSyntax>,
        nullable: bool,
    },
    Function {
        receiver: Option<Box<TypeSyntax>>,
        parameters: Vec<TypeSyntax>,
        ret: Box<TypeSyntax>,
    },
}

#[derive(Clone, Debug, Default)]
struct Modifiers {
    annotations: Vec<String>,
    origin: Option<Origin>,
    private: bool,
    is_final: bool,
}

impl Modifiers {
    fn origin(&self) -> Origin {
        self.origin.unwrap_or(Origin::Defined)
    }
    fn visibility(&self) -> Visibility {
        if self.private {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }
}

#[derive(Clone, Debug)]
struct ParameterSyntax {
    name: String,
    typ: TypeSyntax,
}

#[derive(Clone, Debug)]
struct FunctionSyntax {
    modifiers: Modifiers,
    receiver: Option<ParameterSyntax>,
    name: Token,
    type_parameters: Vec<String>,
    parameters: Vec<ParameterSyntax>,
    ret: TypeSyntax,
    /// Token index of the `{` that opens the body.
    body: Option<usize>,
}

#[derive(Clone, Debug)]
struct ClassSyntax {
    modifiers: Modifiers,
    is_interface: bool,
    name: Token,
    type_parameters: Vec<String>,
    supertypes: Vec<TypeSyntax>,
    members: Vec<DeclSyntax>,
}

#[derive(Clone, Debug)]
struct FieldSyntax {
    modifiers: Modifiers,
    name: Token,
    typ: TypeSyntax,
    /// Token index of the first token of the initializer.
    initializer: Option<usize>,
}

#[derive(Clone, Debug)]
struct PropertySyntax {
    modifiers: Modifiers,
    is_var: bool,
    name: Token,
    typ: TypeSyntax,
    initializer: Option<usize>,
}

#[derive(Clone, Debug)]
enum DeclSyntax {
    Class(ClassSyntax),
    Function(FunctionSyntax),
    Field(FieldSyntax),
    Property(PropertySyntax),
}

#[derive(Clone, Debug)]
struct PackageSyntax {
    fq_name: String,
    external: bool,
    declarations: Vec<DeclSyntax>,
}

/// Body or initializer that is parsed after all declarations exist.
enum Pending {
    Body { function: DeclId, start: usize },
    Initializer { field: DeclId, start: usize },
}

/// Names that are visible while parsing a body.
struct Scope {
    package: DeclId,
    class: Option<DeclId>,
    /// Enclosing functions, innermost last.
    functions: Vec<DeclId>,
    locals: Vec<DeclId>,
    type_parameters: Vec<String>,
}

impl Scope {
    fn new(package: DeclId, class: Option<DeclId>) -> Self {
        Scope {
            package,
            class,
            functions: vec![],
            locals: vec![],
            type_parameters: vec![],
        }
    }
}

const BUILTIN_TYPES: [&str; 6] = ["Unit", "Int", "Boolean", "String", "Any", "Nothing"];

/// Reader for the textual form of the IR.
///
/// Reading happens in three phases. First, the declaration headers are read
/// into syntax records while bodies and initializers are skipped. Next, the
/// declarations are created with resolved types. Finally, the bodies are
/// parsed, so that expressions can refer to any declaration in the module.
pub struct Parser {
    src: String,
    tokens: Vec<Token>,
    current: usize,
    module: Module,
}

impl Parser {
    pub fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }
    pub fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }
    pub fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.current.min(last)]
    }
    pub fn peek_n(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.current + n).min(last)]
    }
    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }
    pub fn check(&self, kind: TokenKind) -> bool {
        if self.is_at_end() {
            return false;
        }
        self.peek().kind == kind
    }
    fn check_word(&self, word: &str) -> bool {
        self.peek().is_word(word)
    }
    pub fn error(&self, token: &Token, msg: &str) -> String {
        let msg = Scanner::error(&self.src, &token.location, msg);
        format!("\n\n{msg}\n")
    }
    pub fn report_token_error(&self, token: &Token, expected: TokenKind) -> Result<Token> {
        let msg = format!(
            "Expected {:?}, but got \"{}\" of kind {:?}",
            expected, token.lexeme, token.kind
        );
        let msg = Scanner::error(&self.src, &token.location, &msg);
        Err(anyhow::anyhow!(format!("\n\n{msg}\n")))
    }
    pub fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.check(kind) {
            self.advance();
            Ok(self.previous().clone())
        } else {
            self.report_token_error(self.peek(), kind)
        }
    }
    fn expect_word(&mut self, word: &str) -> Result<Token> {
        if self.check_word(word) {
            self.advance();
            Ok(self.previous().clone())
        } else {
            let token = self.peek().clone();
            let msg = format!("Expected \"{word}\", but got \"{}\"", token.lexeme);
            Err(anyhow::anyhow!(self.error(&token, &msg)))
        }
    }
    fn fail<T>(&self, token: &Token, msg: &str) -> Result<T> {
        Err(anyhow::anyhow!(self.error(token, msg)))
    }
    /// Read a module from its textual form.
    pub fn parse(src: &str) -> Result<Module> {
        let mut parser = Parser {
            src: src.to_string(),
            tokens: Scanner::scan(src)?,
            current: 0,
            module: Module::new("", Platform::Jvm),
        };
        let packages = parser.module_header()?;
        let pending = parser.declare(&packages)?;
        parser.bodies(pending)?;
        Ok(parser.module)
    }
}

// Phase 1: declaration headers.
impl Parser {
    fn module_header(&mut self) -> Result<Vec<PackageSyntax>> {
        self.expect_word("module")?;
        let name = self.expect(TokenKind::AtIdentifier)?;
        let name = name.lexeme.trim_start_matches('@').to_string();
        let target = if self.check_word("target") {
            self.advance();
            let token = self.expect(TokenKind::BareIdentifier)?;
            match Platform::from_name(&token.lexeme) {
                Ok(platform) => platform,
                Err(e) => return self.fail(&token, &e.to_string()),
            }
        } else {
            Platform::Jvm
        };
        self.module = Module::new(&name, target);
        self.expect(TokenKind::LBrace)?;
        let mut packages = vec![];
        while !self.check(TokenKind::RBrace) {
            if self.is_at_end() {
                return self.report_token_error(self.peek(), TokenKind::RBrace).map(|_| vec![]);
            }
            packages.push(self.package()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(packages)
    }
    fn dotted_name(&mut self) -> Result<String> {
        let mut segments = vec![self.expect(TokenKind::BareIdentifier)?.lexeme];
        while self.check(TokenKind::Dot) {
            self.advance();
            segments.push(self.expect(TokenKind::BareIdentifier)?.lexeme);
        }
        Ok(segments.join("."))
    }
    fn package(&mut self) -> Result<PackageSyntax> {
        let external = self.check_word("extern");
        if external {
            self.advance();
        }
        self.expect_word("package")?;
        let fq_name = self.dotted_name()?;
        self.expect(TokenKind::LBrace)?;
        let declarations = self.declarations()?;
        self.expect(TokenKind::RBrace)?;
        Ok(PackageSyntax {
            fq_name,
            external,
            declarations,
        })
    }
    /// Declarations until the closing `}` of the container.
    fn declarations(&mut self) -> Result<Vec<DeclSyntax>> {
        let mut declarations = vec![];
        while !self.check(TokenKind::RBrace) {
            if self.is_at_end() {
                return self.report_token_error(self.peek(), TokenKind::RBrace).map(|_| vec![]);
            }
            declarations.push(self.declaration()?);
        }
        Ok(declarations)
    }
    fn modifiers(&mut self) -> Modifiers {
        let mut modifiers = Modifiers::default();
        loop {
            let token = self.peek().clone();
            if token.kind == TokenKind::AtIdentifier {
                modifiers
                    .annotations
                    .push(token.lexeme.trim_start_matches('@').to_string());
            } else if token.is_word("private") {
                modifiers.private = true;
            } else if token.is_word("final") {
                modifiers.is_final = true;
            } else if let Some(origin) = Origin::from_keyword(&token.lexeme) {
                modifiers.origin = Some(origin);
            } else {
                break;
            }
            self.advance();
        }
        modifiers
    }
    fn declaration(&mut self) -> Result<DeclSyntax> {
        let modifiers = self.modifiers();
        let token = self.peek().clone();
        match token.lexeme.as_str() {
            "class" | "interface" => Ok(DeclSyntax::Class(self.class(modifiers)?)),
            "fun" => Ok(DeclSyntax::Function(self.function_header(modifiers)?)),
            "field" => Ok(DeclSyntax::Field(self.field(modifiers)?)),
            "var" | "val" => Ok(DeclSyntax::Property(self.property(modifiers)?)),
            _ => self.fail(&token, "Expected declaration"),
        }
    }
    fn type_parameters(&mut self) -> Result<Vec<String>> {
        let mut parameters = vec![];
        if self.check(TokenKind::Less) {
            self.advance();
            loop {
                parameters.push(self.expect(TokenKind::BareIdentifier)?.lexeme);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
            self.expect(TokenKind::Greater)?;
        }
        Ok(parameters)
    }
    fn class(&mut self, modifiers: Modifiers) -> Result<ClassSyntax> {
        let is_interface = self.advance().lexeme == "interface";
        let name = self.expect(TokenKind::BareIdentifier)?;
        let type_parameters = self.type_parameters()?;
        let mut supertypes = vec![];
        if self.check(TokenKind::Colon) {
            self.advance();
            loop {
                supertypes.push(self.type_syntax()?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        let members = if self.check(TokenKind::LBrace) {
            self.advance();
            let members = self.declarations()?;
            self.expect(TokenKind::RBrace)?;
            members
        } else {
            vec![]
        };
        Ok(ClassSyntax {
            modifiers,
            is_interface,
            name,
            type_parameters,
            supertypes,
            members,
        })
    }
    fn parameter_syntax(&mut self) -> Result<ParameterSyntax> {
        let name = self.expect(TokenKind::BareIdentifier)?.lexeme;
        self.expect(TokenKind::Colon)?;
        let typ = self.type_syntax()?;
        Ok(ParameterSyntax { name, typ })
    }
    fn parameter_list(&mut self) -> Result<Vec<ParameterSyntax>> {
        self.expect(TokenKind::LParen)?;
        let mut parameters = vec![];
        while !self.check(TokenKind::RParen) {
            parameters.push(self.parameter_syntax()?);
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        Ok(parameters)
    }
    /// Parse `fun (recv: T).name<T>(a: A): R` up to, but not including, the
    /// body.
    fn signature(&mut self, modifiers: Modifiers) -> Result<FunctionSyntax> {
        self.expect_word("fun")?;
        let receiver = if self.check(TokenKind::LParen) {
            self.advance();
            let receiver = self.parameter_syntax()?;
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::Dot)?;
            Some(receiver)
        } else {
            None
        };
        let name = self.expect(TokenKind::BareIdentifier)?;
        let type_parameters = self.type_parameters()?;
        let parameters = self.parameter_list()?;
        self.expect(TokenKind::Colon)?;
        let ret = self.type_syntax()?;
        Ok(FunctionSyntax {
            modifiers,
            receiver,
            name,
            type_parameters,
            parameters,
            ret,
            body: None,
        })
    }
    fn function_header(&mut self, modifiers: Modifiers) -> Result<FunctionSyntax> {
        let mut syntax = self.signature(modifiers)?;
        if self.check(TokenKind::LBrace) {
            syntax.body = Some(self.current);
            self.skip_block()?;
        }
        Ok(syntax)
    }
    fn field(&mut self, modifiers: Modifiers) -> Result<FieldSyntax> {
        self.expect_word("field")?;
        let name = self.expect(TokenKind::BareIdentifier)?;
        self.expect(TokenKind::Colon)?;
        let typ = self.type_syntax()?;
        let initializer = self.initializer_start();
        Ok(FieldSyntax {
            modifiers,
            name,
            typ,
            initializer,
        })
    }
    fn property(&mut self, modifiers: Modifiers) -> Result<PropertySyntax> {
        let is_var = self.advance().lexeme == "var";
        let name = self.expect(TokenKind::BareIdentifier)?;
        self.expect(TokenKind::Colon)?;
        let typ = self.type_syntax()?;
        let initializer = self.initializer_start();
        Ok(PropertySyntax {
            modifiers,
            is_var,
            name,
            typ,
            initializer,
        })
    }
    /// Skip `= expr` if present and return the index of the expression.
    fn initializer_start(&mut self) -> Option<usize> {
        if !self.check(TokenKind::Equal) {
            return None;
        }
        self.advance();
        let start = self.current;
        let mut depth = 0;
        let mut last_line = None;
        while !self.is_at_end() {
            let token = self.peek();
            if depth == 0 {
                if token.kind == TokenKind::RBrace {
                    break;
                }
                if last_line.is_some_and(|line| line != token.line()) {
                    break;
                }
            }
            match token.kind {
                TokenKind::LParen | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBrace => depth -= 1,
                _ => (),
            }
            last_line = Some(token.line());
            self.advance();
        }
        Some(start)
    }
    fn skip_block(&mut self) -> Result<()> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut depth = 1;
        while depth > 0 {
            if self.is_at_end() {
                return self.fail(&open, "Unclosed block");
            }
            match self.advance().kind {
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => depth -= 1,
                _ => (),
            }
        }
        Ok(())
    }
    fn type_syntax(&mut self) -> Result<TypeSyntax> {
        if self.check(TokenKind::LParen) {
            self.advance();
            let mut parameters = vec![];
            while !self.check(TokenKind::RParen) {
                parameters.push(self.type_syntax()?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
            self.expect(TokenKind::RParen)?;
            self.expect(TokenKind::Arrow)?;
            let ret = self.type_syntax()?;
            return Ok(TypeSyntax::Function {
                receiver: None,
                parameters,
                ret: Box::new(ret),
            });
        }
        let token = self.expect(TokenKind::BareIdentifier)?;
        let mut arguments = vec![];
        if self.check(TokenKind::Less) {
            self.advance();
            loop {
                arguments.push(self.type_syntax()?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
            self.expect(TokenKind::Greater)?;
        }
        let nullable = self.check(TokenKind::Question);
        if nullable {
            self.advance();
        }
        let named = TypeSyntax::Named {
            token,
            arguments,
            nullable,
        };
        if self.check(TokenKind::Dot) && self.peek_n(1).kind == TokenKind::LParen {
            self.advance();
            match self.type_syntax()? {
                TypeSyntax::Function {
                    parameters, ret, ..
                } => Ok(TypeSyntax::Function {
                    receiver: Some(Box::new(named)),
                    parameters,
                    ret,
                }),
                _ => self.fail(self.previous(), "Expected function type"),
            }
        } else {
            Ok(named)
        }
    }
}

// Phase 2: declarations.
impl Parser {
    fn lookup_class(&self, name: &str, package: DeclId) -> Option<DeclId> {
        let fq_name = self.module.fq_name(package);
        self.module.find_class(&fq_name, name).or_else(|| {
            self.module
                .packages()
                .iter()
                .find_map(|p| self.module.find_class(&self.module.fq_name(*p), name))
        })
    }
    fn resolve_type(
        &self,
        syntax: &TypeSyntax,
        type_parameters: &[String],
        package: DeclId,
    ) -> Result<Type> {
        match syntax {
            TypeSyntax::Named {
                token,
                arguments,
                nullable,
            } => {
                let name = token.lexeme.as_str();
                let typ = match name {
                    "Unit" => Type::Unit,
                    "Int" => Type::Int,
                    "Boolean" => Type::Boolean,
                    "String" => Type::String,
                    "Any" => Type::Any,
                    "Nothing" => Type::Nothing,
                    _ if type_parameters.iter().any(|p| p == name) => {
                        Type::Parameter(name.to_string())
                    }
                    _ => match self.lookup_class(name, package) {
                        Some(class) => {
                            let arguments = arguments
                                .iter()
                                .map(|a| self.resolve_type(a, type_parameters, package))
                                .collect::<Result<Vec<_>>>()?;
                            Type::class(class, name, arguments)
                        }
                        None => return self.fail(token, &format!("Unknown type {name}")),
                    },
                };
                if BUILTIN_TYPES.contains(&name) && !arguments.is_empty() {
                    return self.fail(token, "Builtin types take no type arguments");
                }
                if *nullable {
                    Ok(typ.make_nullable())
                } else {
                    Ok(typ)
                }
            }
            TypeSyntax::Function {
                receiver,
                parameters,
                ret,
            } => {
                let receiver = match receiver {
                    Some(receiver) => Some(self.resolve_type(receiver, type_parameters, package)?),
                    None => None,
                };
                let parameters = parameters
                    .iter()
                    .map(|p| self.resolve_type(p, type_parameters, package))
                    .collect::<Result<Vec<_>>>()?;
                let ret = self.resolve_type(ret, type_parameters, package)?;
                Ok(Type::function(receiver, parameters, ret))
            }
        }
    }
    fn class_type_parameters(&self, class: Option<DeclId>) -> Vec<String> {
        class
            .and_then(|c| self.module.class(c))
            .map(|c| c.type_parameters.clone())
            .unwrap_or_default()
    }
    fn declare(&mut self, packages: &[PackageSyntax]) -> Result<Vec<Pending>> {
        let mut package_ids = vec![];
        for syntax in packages {
            let package = self.module.add_package(&syntax.fq_name, syntax.external);
            package_ids.push(package);
            for decl in syntax.declarations.iter() {
                if let DeclSyntax::Class(class) = decl {
                    self.declare_class(class, package);
                }
            }
        }
        let mut pending = vec![];
        for (syntax, package) in packages.iter().zip(package_ids) {
            let classes = self.module.members(package);
            let mut classes = classes.into_iter();
            for decl in syntax.declarations.iter() {
                match decl {
                    DeclSyntax::Class(class_syntax) => {
                        let Some(class) = classes.next() else {
                            continue;
                        };
                        self.declare_members(class_syntax, class, package, &mut pending)?;
                    }
                    DeclSyntax::Function(function) => {
                        let id = self.declare_function(function, package, None, package, &[])?;
                        self.module.add_member(package, id);
                        if let Some(start) = function.body {
                            pending.push(Pending::Body { function: id, start });
                        }
                    }
                    DeclSyntax::Field(field) => {
                        return self.fail(&field.name, "Fields must be declared in a class");
                    }
                    DeclSyntax::Property(property) => {
                        return self.fail(&property.name, "Properties must be declared in a class");
                    }
                }
            }
        }
        self.link_overrides();
        Ok(pending)
    }
    fn declare_class(&mut self, syntax: &ClassSyntax, package: DeclId) -> DeclId {
        let class = Class {
            is_interface: syntax.is_interface,
            annotations: syntax.modifiers.annotations.clone(),
            type_parameters: syntax.type_parameters.clone(),
            supertypes: vec![],
            this_receiver: DeclId(0),
            declarations: vec![],
        };
        let decl = Declaration::new(
            &syntax.name.lexeme,
            Some(package),
            syntax.modifiers.origin(),
            DeclKind::Class(class),
        );
        let id = self.module.add_decl(decl);
        self.module.add_member(package, id);
        let typ = self.module.class_type(id);
        let this = self
            .module
            .new_parameter(id, "this", typ, ParameterKind::DispatchReceiver, 0);
        if let Some(class) = self.module.decl_mut(id).as_class_mut() {
            class.this_receiver = this;
        }
        id
    }
    fn declare_members(
        &mut self,
        syntax: &ClassSyntax,
        class: DeclId,
        package: DeclId,
        pending: &mut Vec<Pending>,
    ) -> Result<()> {
        let mut supertypes = vec![];
        for supertype in syntax.supertypes.iter() {
            supertypes.push(self.resolve_type(supertype, &syntax.type_parameters, package)?);
        }
        if let Some(c) = self.module.decl_mut(class).as_class_mut() {
            c.supertypes = supertypes;
        }
        for member in syntax.members.iter() {
            match member {
                DeclSyntax::Class(nested) => {
                    return self.fail(&nested.name, "Nested classes are not supported");
                }
                DeclSyntax::Function(function) => {
                    let id = self.declare_function(function, class, Some(class), package, &[])?;
                    self.module.add_member(class, id);
                    if let Some(start) = function.body {
                        pending.push(Pending::Body { function: id, start });
                    }
                }
                DeclSyntax::Field(field) => {
                    let typ = self.resolve_type(&field.typ, &syntax.type_parameters, package)?;
                    let decl = Field {
                        typ,
                        visibility: field.modifiers.visibility(),
                        is_final: field.modifiers.is_final,
                        initializer: None,
                    };
                    let decl = Declaration::new(
                        &field.name.lexeme,
                        Some(class),
                        field.modifiers.origin(),
                        DeclKind::Field(decl),
                    );
                    let id = self.module.add_decl(decl);
                    self.module.add_member(class, id);
                    if let Some(start) = field.initializer {
                        pending.push(Pending::Initializer { field: id, start });
                    }
                }
                DeclSyntax::Property(property) => {
                    let typ = self.resolve_type(&property.typ, &syntax.type_parameters, package)?;
                    let (id, backing_field) = self.declare_property(property, typ, class);
                    self.module.add_member(class, id);
                    if let Some(start) = property.initializer {
                        pending.push(Pending::Initializer {
                            field: backing_field,
                            start,
                        });
                    }
                }
            }
        }
        Ok(())
    }
    /// Create a property with its backing field and default accessors.
    fn declare_property(&mut self, syntax: &PropertySyntax, typ: Type, class: DeclId) -> (DeclId, DeclId) {
        let name = syntax.name.lexeme.clone();
        let visibility = syntax.modifiers.visibility();
        let property = Property {
            typ: typ.clone(),
            visibility,
            is_var: syntax.is_var,
            backing_field: None,
            getter: None,
            setter: None,
        };
        let property = Declaration::new(
            &name,
            Some(class),
            syntax.modifiers.origin(),
            DeclKind::Property(property),
        );
        let property = self.module.add_decl(property);
        let field = Field {
            typ: typ.clone(),
            visibility: Visibility::Private,
            is_final: !syntax.is_var,
            initializer: None,
        };
        let field = Declaration::new(&name, Some(class), Origin::BackingField, DeclKind::Field(field));
        let field = self.module.add_decl(field);
        let getter = self.declare_accessor(&name, property, AccessorKind::Getter, &typ, visibility, class);
        let setter = if syntax.is_var {
            Some(self.declare_accessor(&name, property, AccessorKind::Setter, &typ, visibility, class))
        } else {
            None
        };
        if let DeclKind::Property(p) = &mut self.module.decl_mut(property).kind {
            p.backing_field = Some(field);
            p.getter = Some(getter);
            p.setter = setter;
        }
        (property, field)
    }
    fn declare_accessor(
        &mut self,
        name: &str,
        property: DeclId,
        kind: AccessorKind,
        typ: &Type,
        visibility: Visibility,
        class: DeclId,
    ) -> DeclId {
        let (accessor_name, return_type) = match kind {
            AccessorKind::Getter => (format!("<get-{name}>"), typ.clone()),
            AccessorKind::Setter => (format!("<set-{name}>"), Type::Unit),
        };
        let mut function = Function::new(visibility, return_type);
        function.accessor = Some(Accessor { property, kind });
        let decl = Declaration::new(
            &accessor_name,
            Some(class),
            Origin::PropertyAccessor,
            DeclKind::Function(function),
        );
        let id = self.module.add_decl(decl);
        let this_type = self.module.class_type(class);
        let this = self
            .module
            .new_parameter(id, "this", this_type, ParameterKind::DispatchReceiver, 0);
        let value = match kind {
            AccessorKind::Getter => None,
            AccessorKind::Setter => Some(self.module.new_parameter(
                id,
                "value",
                typ.clone(),
                ParameterKind::Value,
                0,
            )),
        };
        if let Some(f) = self.module.function_mut(id) {
            f.dispatch_receiver = Some(this);
            f.value_parameters = value.into_iter().collect();
        }
        id
    }
    /// Create a function declaration from its header.
    ///
    /// Member functions get an implicit `this` dispatch receiver.
    fn declare_function(
        &mut self,
        syntax: &FunctionSyntax,
        parent: DeclId,
        class: Option<DeclId>,
        package: DeclId,
        outer_type_parameters: &[String],
    ) -> Result<DeclId> {
        let mut type_parameters = outer_type_parameters.to_vec();
        type_parameters.extend(self.class_type_parameters(class));
        type_parameters.extend(syntax.type_parameters.iter().cloned());
        let return_type = self.resolve_type(&syntax.ret, &type_parameters, package)?;
        let visibility = if parent == package || class.is_some() {
            syntax.modifiers.visibility()
        } else {
            Visibility::Local
        };
        let mut function = Function::new(visibility, return_type);
        function.annotations = syntax.modifiers.annotations.clone();
        function.type_parameters = syntax.type_parameters.clone();
        let decl = Declaration::new(
            &syntax.name.lexeme,
            Some(parent),
            syntax.modifiers.origin(),
            DeclKind::Function(function),
        );
        let id = self.module.add_decl(decl);
        let dispatch_receiver = match class {
            Some(class) => {
                let typ = self.module.class_type(class);
                Some(
                    self.module
                        .new_parameter(id, "this", typ, ParameterKind::DispatchReceiver, 0),
                )
            }
            None => None,
        };
        let extension_receiver = match &syntax.receiver {
            Some(receiver) => {
                let typ = self.resolve_type(&receiver.typ, &type_parameters, package)?;
                Some(self.module.new_parameter(
                    id,
                    &receiver.name,
                    typ,
                    ParameterKind::ExtensionReceiver,
                    0,
                ))
            }
            None => None,
        };
        let mut value_parameters = vec![];
        for (index, parameter) in syntax.parameters.iter().enumerate() {
            let typ = self.resolve_type(&parameter.typ, &type_parameters, package)?;
            let parameter =
                self.module
                    .new_parameter(id, &parameter.name, typ, ParameterKind::Value, index);
            value_parameters.push(parameter);
        }
        if let Some(f) = self.module.function_mut(id) {
            f.dispatch_receiver = dispatch_receiver;
            f.extension_receiver = extension_receiver;
            f.value_parameters = value_parameters;
        }
        Ok(id)
    }
    /// Link member functions to the functions they override in supertypes.
    fn link_overrides(&mut self) {
        let packages = self.module.packages().to_vec();
        for package in packages {
            for class in self.module.members(package) {
                if self.module.class(class).is_none() {
                    continue;
                }
                for member in self.module.members(class) {
                    let Some(function) = self.module.function(member) else {
                        continue;
                    };
                    let arity = function.value_parameters.len();
                    let name = self.module.name_of(member).to_string();
                    let overridden = self
                        .module
                        .superclasses(class)
                        .into_iter()
                        .flat_map(|s| self.module.find_member_functions(s, &name))
                        .find(|f| {
                            self.module
                                .function(*f)
                                .is_some_and(|f| f.value_parameters.len() == arity)
                        });
                    if let (Some(overridden), Some(f)) = (overridden, self.module.function_mut(member)) {
                        f.overridden = vec![overridden];
                    }
                }
            }
        }
    }
}

// Phase 3: bodies.
impl Parser {
    fn bodies(&mut self, pending: Vec<Pending>) -> Result<()> {
        for item in pending {
            match item {
                Pending::Body { function, start } => {
                    let class = self
                        .module
                        .decl(function)
                        .parent
                        .filter(|p| self.module.class(*p).is_some());
                    let package = self.module.package_of(function).unwrap_or(DeclId(0));
                    let mut scope = Scope::new(package, class);
                    scope.type_parameters = self.class_type_parameters(class);
                    if let Some(f) = self.module.function(function) {
                        scope.type_parameters.extend(f.type_parameters.iter().cloned());
                    }
                    scope.functions.push(function);
                    self.current = start;
                    let body = self.block(&mut scope)?;
                    debug!("Parsed body of {}", self.module.fq_name(function));
                    if let Some(f) = self.module.function_mut(function) {
                        f.body = Some(body);
                    }
                }
                Pending::Initializer { field, start } => {
                    let class = self.module.decl(field).parent;
                    let package = self.module.package_of(field).unwrap_or(DeclId(0));
                    let mut scope = Scope::new(package, class);
                    scope.type_parameters = self.class_type_parameters(class);
                    self.current = start;
                    let initializer = self.expression(&mut scope)?;
                    if let DeclKind::Field(f) = &mut self.module.decl_mut(field).kind {
                        f.initializer = Some(initializer);
                    }
                }
            }
        }
        Ok(())
    }
    fn add_expr(&mut self, kind: ExprKind, typ: Type) -> ExprId {
        self.module.add_expr(Expression::new(kind, typ))
    }
    fn scope_type(&self, syntax: &TypeSyntax, scope: &Scope) -> Result<Type> {
        self.resolve_type(syntax, &scope.type_parameters, scope.package)
    }
    /// Parent for declarations created at the current position.
    fn scope_parent(scope: &Scope) -> DeclId {
        scope
            .functions
            .last()
            .copied()
            .or(scope.class)
            .unwrap_or(scope.package)
    }
    fn block(&mut self, scope: &mut Scope) -> Result<Vec<ExprId>> {
        self.expect(TokenKind::LBrace)?;
        let locals = scope.locals.len();
        let mut statements = vec![];
        while !self.check(TokenKind::RBrace) {
            if self.is_at_end() {
                return self.report_token_error(self.peek(), TokenKind::RBrace).map(|_| vec![]);
            }
            statements.push(self.statement(scope)?);
        }
        self.expect(TokenKind::RBrace)?;
        scope.locals.truncate(locals);
        Ok(statements)
    }
    fn statement(&mut self, scope: &mut Scope) -> Result<ExprId> {
        if self.check_word("val") {
            return self.local_variable(scope);
        }
        if self.check_word("return") {
            return self.return_statement(scope);
        }
        if self.check_word("if") {
            return self.if_statement(scope);
        }
        let target = self.expression(scope)?;
        if self.check(TokenKind::Equal) {
            let equal = self.advance().clone();
            let value = self.expression(scope)?;
            self.assign(target, value, &equal)?;
        }
        Ok(target)
    }
    /// Turn a property read or field read into a write of `value`.
    fn assign(&mut self, target: ExprId, value: ExprId, token: &Token) -> Result<()> {
        let kind = match &self.module.expr(target).kind {
            ExprKind::GetField { receiver, field } => ExprKind::SetField {
                receiver: *receiver,
                field: *field,
                value,
            },
            ExprKind::Call(call) => {
                let accessor = self.module.function(call.callee).and_then(|f| f.accessor);
                let setter = accessor
                    .filter(|a| a.kind == AccessorKind::Getter)
                    .and_then(|a| self.module.property(a.property))
                    .and_then(|p| p.setter);
                match setter {
                    Some(setter) => {
                        let mut call = call.clone();
                        call.callee = setter;
                        call.arguments = vec![value];
                        ExprKind::Call(call)
                    }
                    None => return self.fail(token, "Cannot assign to this expression"),
                }
            }
            _ => return self.fail(token, "Cannot assign to this expression"),
        };
        let expr = self.module.expr_mut(target);
        expr.kind = kind;
        expr.typ = Type::Unit;
        Ok(())
    }
    fn local_variable(&mut self, scope: &mut Scope) -> Result<ExprId> {
        self.expect_word("val")?;
        let name = self.expect(TokenKind::BareIdentifier)?;
        self.expect(TokenKind::Colon)?;
        let typ = self.type_syntax()?;
        let typ = self.scope_type(&typ, scope)?;
        self.expect(TokenKind::Equal)?;
        let initializer = self.expression(scope)?;
        let variable = Variable { typ, initializer };
        let decl = Declaration::new(
            &name.lexeme,
            Some(Self::scope_parent(scope)),
            Origin::Defined,
            DeclKind::Variable(variable),
        );
        let variable = self.module.add_decl(decl);
        scope.locals.push(variable);
        Ok(self.add_expr(ExprKind::Variable(variable), Type::Unit))
    }
    fn return_statement(&mut self, scope: &mut Scope) -> Result<ExprId> {
        let keyword = self.expect_word("return")?;
        let mut line = keyword.line();
        let target = if self.check(TokenKind::AtIdentifier) && self.peek().line() == line {
            let label = self.advance().clone();
            line = label.line();
            let name = label.lexeme.trim_start_matches('@');
            let target = scope
                .functions
                .iter()
                .rev()
                .find(|f| self.module.name_of(**f) == name)
                .copied();
            match target {
                Some(target) => target,
                None => return self.fail(&label, &format!("Unknown return label {name}")),
            }
        } else {
            match scope.functions.last() {
                Some(function) => *function,
                None => return self.fail(&keyword, "Return outside of function"),
            }
        };
        let value = if !self.check(TokenKind::RBrace) && !self.is_at_end() && self.peek().line() == line {
            Some(self.expression(scope)?)
        } else {
            None
        };
        Ok(self.add_expr(ExprKind::Return { target, value }, Type::Nothing))
    }
    fn if_statement(&mut self, scope: &mut Scope) -> Result<ExprId> {
        self.expect_word("if")?;
        self.expect(TokenKind::LParen)?;
        let condition = self.expression(scope)?;
        self.expect(TokenKind::RParen)?;
        let then = self.block(scope)?;
        let els = if self.check_word("else") {
            self.advance();
            self.block(scope)?
        } else {
            vec![]
        };
        let kind = ExprKind::If {
            condition,
            then,
            els,
        };
        Ok(self.add_expr(kind, Type::Unit))
    }
    fn expression(&mut self, scope: &mut Scope) -> Result<ExprId> {
        let lhs = self.postfix(scope)?;
        let op = match self.peek().kind {
            TokenKind::Plus => BinOp::Add,
            TokenKind::Minus => BinOp::Sub,
            TokenKind::Star => BinOp::Mul,
            TokenKind::EqualEqual => BinOp::Eq,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.postfix(scope)?;
        let typ = match op {
            BinOp::Eq => Type::Boolean,
            _ => self.module.expr(lhs).typ.clone(),
        };
        Ok(self.add_expr(ExprKind::Binary { op, lhs, rhs }, typ))
    }
    fn postfix(&mut self, scope: &mut Scope) -> Result<ExprId> {
        let mut expr = self.primary(scope)?;
        while self.check(TokenKind::Dot) {
            self.advance();
            if self.check(TokenKind::Hash) {
                self.advance();
                let name = self.expect(TokenKind::BareIdentifier)?;
                expr = self.field_access(expr, &name)?;
                continue;
            }
            let name = self.expect(TokenKind::BareIdentifier)?;
            if self.check(TokenKind::Less) || self.check(TokenKind::LParen) {
                expr = self.member_call(expr, &name, scope)?;
            } else {
                expr = self.property_access(expr, &name)?;
            }
        }
        Ok(expr)
    }
    fn receiver_class(&self, receiver: ExprId, token: &Token) -> Result<DeclId> {
        let typ = &self.module.expr(receiver).typ;
        match typ.class_or_none() {
            Some(class) => Ok(class),
            None => self.fail(token, &format!("Receiver of type {typ} has no members")),
        }
    }
    fn field_access(&mut self, receiver: ExprId, name: &Token) -> Result<ExprId> {
        let class = self.receiver_class(receiver, name)?;
        let field = match self.module.find_field(class, &name.lexeme) {
            Some(field) => field,
            None => return self.fail(name, &format!("Unknown field {}", name.lexeme)),
        };
        let typ = self.member_type(field, receiver);
        let kind = ExprKind::GetField {
            receiver: Some(receiver),
            field,
        };
        Ok(self.add_expr(kind, typ))
    }
    /// Type of a field or property seen through `receiver`.
    fn member_type(&self, member: DeclId, receiver: ExprId) -> Type {
        let typ = self
            .module
            .decl(member)
            .value_type()
            .cloned()
            .unwrap_or(Type::Unit);
        let parameters = self.class_type_parameters(self.module.decl(member).parent);
        let arguments = self.module.expr(receiver).typ.arguments().to_vec();
        typ.substitute(&parameters, &arguments)
    }
    fn property_access(&mut self, receiver: ExprId, name: &Token) -> Result<ExprId> {
        let class = self.receiver_class(receiver, name)?;
        let property = self.module.find_property(class, &name.lexeme);
        let getter = property
            .and_then(|p| self.module.property(p))
            .and_then(|p| p.getter);
        match (property, getter) {
            (Some(property), Some(getter)) => {
                let typ = self.member_type(property, receiver);
                let mut call = Call::new(getter);
                call.dispatch_receiver = Some(receiver);
                Ok(self.add_expr(ExprKind::Call(call), typ))
            }
            _ => self.fail(name, &format!("Unknown property {}", name.lexeme)),
        }
    }
    fn type_arguments(&mut self, scope: &Scope) -> Result<Vec<Type>> {
        let mut arguments = vec![];
        if self.check(TokenKind::Less) {
            self.advance();
            loop {
                let typ = self.type_syntax()?;
                arguments.push(self.scope_type(&typ, scope)?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
            self.expect(TokenKind::Greater)?;
        }
        Ok(arguments)
    }
    fn arguments(&mut self, scope: &mut Scope) -> Result<Vec<ExprId>> {
        self.expect(TokenKind::LParen)?;
        let mut arguments = vec![];
        while !self.check(TokenKind::RParen) {
            arguments.push(self.expression(scope)?);
            if !self.check(TokenKind::Comma) {
                break;
            }
            self.advance();
        }
        self.expect(TokenKind::RParen)?;
        Ok(arguments)
    }
    fn has_arity(&self, function: DeclId, arity: usize) -> bool {
        self.module
            .function(function)
            .is_some_and(|f| f.value_parameters.len() == arity)
    }
    /// Return type of a call of `callee` with the given type arguments.
    fn call_type(&self, callee: DeclId, receiver: Option<ExprId>, type_arguments: &[Type]) -> Type {
        let Some(function) = self.module.function(callee) else {
            return Type::Unit;
        };
        let mut parameters = function.type_parameters.clone();
        let mut arguments = type_arguments.to_vec();
        while arguments.len() < parameters.len() {
            arguments.push(Type::Parameter(parameters[arguments.len()].clone()));
        }
        arguments.truncate(parameters.len());
        let class = self
            .module
            .decl(callee)
            .parent
            .filter(|p| self.module.class(*p).is_some());
        if let (Some(class), Some(receiver)) = (class, receiver) {
            parameters.extend(self.class_type_parameters(Some(class)));
            arguments.extend(self.module.expr(receiver).typ.arguments().iter().cloned());
        }
        function.return_type.substitute(&parameters, &arguments)
    }
    fn top_level_functions(&self, name: &str, package: DeclId) -> Vec<DeclId> {
        let own = self.module.fq_name(package);
        let mut out = self.module.find_functions(&own, name);
        for p in self.module.packages() {
            let fq_name = self.module.fq_name(*p);
            if fq_name != own {
                out.extend(self.module.find_functions(&fq_name, name));
            }
        }
        out
    }
    fn member_call(&mut self, receiver: ExprId, name: &Token, scope: &mut Scope) -> Result<ExprId> {
        let type_arguments = self.type_arguments(scope)?;
        let arguments = self.arguments(scope)?;
        let arity = arguments.len();
        let member = self
            .module
            .expr(receiver)
            .typ
            .class_or_none()
            .map(|class| self.module.find_member_functions(class, &name.lexeme))
            .unwrap_or_default()
            .into_iter()
            .find(|f| self.has_arity(*f, arity));
        let mut call = match member {
            Some(member) => {
                let mut call = Call::new(member);
                call.dispatch_receiver = Some(receiver);
                call
            }
            None => {
                let extension = self
                    .top_level_functions(&name.lexeme, scope.package)
                    .into_iter()
                    .find(|f| {
                        self.has_arity(*f, arity)
                            && self.module.function(*f).is_some_and(|f| f.extension_receiver.is_some())
                    });
                match extension {
                    Some(extension) => {
                        let mut call = Call::new(extension);
                        call.extension_receiver = Some(receiver);
                        call
                    }
                    None => return self.fail(name, &format!("Unknown function {}", name.lexeme)),
                }
            }
        };
        call.arguments = arguments;
        let typ = self.call_type(call.callee, call.dispatch_receiver, &type_arguments);
        call.type_arguments = type_arguments;
        Ok(self.add_expr(ExprKind::Call(call), typ))
    }
    /// Innermost receiver that `this` refers to.
    fn this_receiver(&self, scope: &Scope) -> Option<DeclId> {
        let function = scope
            .functions
            .iter()
            .rev()
            .find_map(|f| self.module.function(*f).and_then(|f| f.dispatch_receiver));
        function.or_else(|| {
            scope
                .class
                .and_then(|c| self.module.class(c))
                .map(|c| c.this_receiver)
        })
    }
    fn value(&mut self, name: &Token, scope: &Scope) -> Result<ExprId> {
        let local = scope
            .locals
            .iter()
            .rev()
            .find(|l| self.module.name_of(**l) == name.lexeme)
            .copied();
        let parameter = || {
            scope.functions.iter().rev().find_map(|f| {
                self.module
                    .all_parameters(*f)
                    .into_iter()
                    .find(|p| self.module.name_of(*p) == name.lexeme)
            })
        };
        let value = local.or_else(parameter).or_else(|| {
            if name.lexeme == "this" {
                self.this_receiver(scope)
            } else {
                None
            }
        });
        match value {
            Some(value) => {
                let typ = self
                    .module
                    .decl(value)
                    .value_type()
                    .cloned()
                    .unwrap_or(Type::Unit);
                Ok(self.add_expr(ExprKind::GetValue(value), typ))
            }
            None => self.fail(name, &format!("Unknown name {}", name.lexeme)),
        }
    }
    /// Call without explicit receiver: a member of `this` or a top-level
    /// function.
    fn free_call(&mut self, name: &Token, scope: &mut Scope) -> Result<ExprId> {
        let type_arguments = self.type_arguments(scope)?;
        let arguments = self.arguments(scope)?;
        let arity = arguments.len();
        let this = self.this_receiver(scope);
        let member = scope
            .class
            .map(|class| self.module.find_member_functions(class, &name.lexeme))
            .unwrap_or_default()
            .into_iter()
            .find(|f| self.has_arity(*f, arity));
        let mut call = match (member, this) {
            (Some(member), Some(this)) => {
                let typ = self
                    .module
                    .decl(this)
                    .value_type()
                    .cloned()
                    .unwrap_or(Type::Unit);
                let receiver = self.add_expr(ExprKind::GetValue(this), typ);
                let mut call = Call::new(member);
                call.dispatch_receiver = Some(receiver);
                call
            }
            _ => {
                let function = self
                    .top_level_functions(&name.lexeme, scope.package)
                    .into_iter()
                    .find(|f| {
                        self.has_arity(*f, arity)
                            && self.module.function(*f).is_some_and(|f| f.extension_receiver.is_none())
                    });
                match function {
                    Some(function) => Call::new(function),
                    None => return self.fail(name, &format!("Unknown function {}", name.lexeme)),
                }
            }
        };
        call.arguments = arguments;
        let typ = self.call_type(call.callee, call.dispatch_receiver, &type_arguments);
        call.type_arguments = type_arguments;
        Ok(self.add_expr(ExprKind::Call(call), typ))
    }
    fn super_call(&mut self, scope: &mut Scope) -> Result<ExprId> {
        let keyword = self.expect_word("super")?;
        self.expect(TokenKind::Less)?;
        let base_name = self.expect(TokenKind::BareIdentifier)?;
        self.expect(TokenKind::Greater)?;
        self.expect(TokenKind::Dot)?;
        let name = self.expect(TokenKind::BareIdentifier)?;
        let Some(base) = self.lookup_class(&base_name.lexeme, scope.package) else {
            return self.fail(&base_name, &format!("Unknown class {}", base_name.lexeme));
        };
        let Some(this) = self.this_receiver(scope) else {
            return self.fail(&keyword, "super outside of class");
        };
        let type_arguments = self.type_arguments(scope)?;
        let arguments = self.arguments(scope)?;
        let arity = arguments.len();
        let callee = self
            .module
            .find_member_functions(base, &name.lexeme)
            .into_iter()
            .find(|f| self.has_arity(*f, arity));
        let Some(callee) = callee else {
            return self.fail(&name, &format!("Unknown function {}", name.lexeme));
        };
        let typ = self
            .module
            .decl(this)
            .value_type()
            .cloned()
            .unwrap_or(Type::Unit);
        let receiver = self.add_expr(ExprKind::GetValue(this), typ);
        let mut call = Call::new(callee);
        call.dispatch_receiver = Some(receiver);
        call.arguments = arguments;
        call.super_qualifier = Some(base);
        let typ = self.call_type(callee, None, &type_arguments);
        call.type_arguments = type_arguments;
        Ok(self.add_expr(ExprKind::Call(call), typ))
    }
    /// Parse a function expression (closure) including its body.
    fn closure(&mut self, scope: &mut Scope) -> Result<ExprId> {
        let modifiers = self.modifiers();
        let syntax = self.signature(modifiers)?;
        let parent = Self::scope_parent(scope);
        let type_parameters = scope.type_parameters.len();
        let outer = scope.type_parameters.clone();
        let function = self.declare_function(&syntax, parent, None, scope.package, &outer)?;
        scope.type_parameters.extend(syntax.type_parameters.iter().cloned());
        let typ = {
            let f = self.module.function(function);
            let receiver = f
                .and_then(|f| f.extension_receiver)
                .and_then(|r| self.module.decl(r).value_type().cloned());
            let parameters = f
                .map(|f| f.value_parameters.clone())
                .unwrap_or_default()
                .iter()
                .filter_map(|p| self.module.decl(*p).value_type().cloned())
                .collect();
            let ret = f.map(|f| f.return_type.clone()).unwrap_or(Type::Unit);
            Type::function(receiver, parameters, ret)
        };
        scope.functions.push(function);
        let body = self.block(scope);
        scope.functions.pop();
        scope.type_parameters.truncate(type_parameters);
        let body = body?;
        if let Some(f) = self.module.function_mut(function) {
            f.body = Some(body);
        }
        Ok(self.add_expr(ExprKind::FunctionExpr(function), typ))
    }
    fn is_closure_start(&self) -> bool {
        if self.check_word("fun") {
            return true;
        }
        self.peek().kind == TokenKind::BareIdentifier
            && Origin::from_keyword(&self.peek().lexeme).is_some()
            && self.peek_n(1).is_word("fun")
    }
    fn primary(&mut self, scope: &mut Scope) -> Result<ExprId> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer => {
                self.advance();
                self.integer(&token, false)
            }
            TokenKind::Minus if self.peek_n(1).kind == TokenKind::Integer => {
                self.advance();
                let number = self.advance().clone();
                self.integer(&number, true)
            }
            TokenKind::String => {
                self.advance();
                let value = token.lexeme.trim_matches('"').to_string();
                Ok(self.add_expr(ExprKind::Const(Const::String(value)), Type::String))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.expression(scope)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::BareIdentifier => match token.lexeme.as_str() {
                "true" | "false" => {
                    self.advance();
                    let value = Const::Boolean(token.lexeme == "true");
                    Ok(self.add_expr(ExprKind::Const(value), Type::Boolean))
                }
                "null" => {
                    self.advance();
                    let typ = Type::Nothing.make_nullable();
                    Ok(self.add_expr(ExprKind::Const(Const::Null), typ))
                }
                "super" => self.super_call(scope),
                _ if self.is_closure_start() => self.closure(scope),
                _ => {
                    self.advance();
                    if self.check(TokenKind::Less) || self.check(TokenKind::LParen) {
                        self.free_call(&token, scope)
                    } else {
                        self.value(&token, scope)
                    }
                }
            },
            _ => self.fail(&token, "Expected expression"),
        }
    }
    fn integer(&mut self, token: &Token, negative: bool) -> Result<ExprId> {
        let value = match token.lexeme.parse::<i64>() {
            Ok(value) => value,
            Err(_) => return self.fail(token, "Invalid integer"),
        };
        let value = if negative { -value } else { value };
        Ok(self.add_expr(ExprKind::Const(Const::Int(value)), Type::Int))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const SRC: &str = indoc! {"
    module @counter target jvm {
      package demo {
        class Counter {
          var n: Int = 0
          val label: String = \"counter\"
          fun inc(): Unit {
            this.n = this.n + 1
          }
          fun get(): Int {
            return this.n
          }
        }
        fun twice(c: Counter): Int {
          val x: Int = c.get()
          return x + x
        }
      }
    }"};

    #[test]
    fn test_parse_counter() {
        let module = Parser::parse(SRC).unwrap();
        assert_eq!(module.name(), "counter");
        assert_eq!(module.target(), Platform::Jvm);
        let counter = module.find_class("demo", "Counter").unwrap();
        let n = module.find_property(counter, "n").unwrap();
        let property = module.property(n).unwrap();
        assert!(property.is_var);
        assert!(property.setter.is_some());
        let label = module.find_property(counter, "label").unwrap();
        assert!(module.property(label).unwrap().setter.is_none());

        let inc = module.find_method(counter, "inc").unwrap();
        let body = module.function(inc).unwrap().body.clone().unwrap();
        assert_eq!(body.len(), 1);
        let call = module.expr(body[0]).as_call().unwrap();
        assert_eq!(Some(call.callee), property.setter);

        let twice = module.find_functions("demo", "twice");
        assert_eq!(twice.len(), 1);
        assert_eq!(module.fq_name(twice[0]), "demo.twice");
    }

    #[test]
    fn test_round_trip() {
        let module = Parser::parse(SRC).unwrap();
        let printed = module.to_string();
        assert_eq!(printed, SRC);
    }

    #[test]
    fn test_unknown_name() {
        let src = indoc! {"
        module @m {
          package demo {
            fun f(): Int {
              return y
            }
          }
        }"};
        let err = Parser::parse(src).unwrap_err().to_string();
        assert!(err.contains("Unknown name y"), "{err}");
        assert!(err.contains("^ Unknown name y"), "{err}");
    }
}
