use crate::ir::spaces;
use crate::ir::AccessorKind;
use crate::ir::Const;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::ExprId;
use crate::ir::ExprKind;
use crate::ir::Module;
use crate::ir::Visibility;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result;

fn display_modifiers(f: &mut Formatter<'_>, module: &Module, decl: DeclId) -> Result {
    let declaration = module.decl(decl);
    let annotations = match &declaration.kind {
        DeclKind::Class(class) => class.annotations.clone(),
        DeclKind::Function(function) => function.annotations.clone(),
        _ => vec![],
    };
    for annotation in annotations {
        write!(f, "@{annotation} ")?;
    }
    if let Some(keyword) = declaration.origin.keyword() {
        write!(f, "{keyword} ")?;
    }
    let visibility = match &declaration.kind {
        DeclKind::Function(function) => Some(function.visibility),
        DeclKind::Field(field) => Some(field.visibility),
        DeclKind::Property(property) => Some(property.visibility),
        _ => None,
    };
    if visibility == Some(Visibility::Private) {
        write!(f, "private ")?;
    }
    Ok(())
}

fn display_type_parameters(f: &mut Formatter<'_>, parameters: &[String]) -> Result {
    if !parameters.is_empty() {
        write!(f, "<{}>", parameters.join(", "))?;
    }
    Ok(())
}

fn display_parameter(f: &mut Formatter<'_>, module: &Module, parameter: DeclId) -> Result {
    let name = module.name_of(parameter);
    match module.parameter(parameter) {
        Some(p) => write!(f, "{name}: {}", p.typ),
        None => write!(f, "{name}"),
    }
}

/// Print `fun (recv: T).name<T>(a: A): R` without the body.
fn display_signature(f: &mut Formatter<'_>, module: &Module, function: DeclId) -> Result {
    let Some(func) = module.function(function) else {
        return Ok(());
    };
    write!(f, "fun ")?;
    if let Some(receiver) = func.extension_receiver {
        write!(f, "(")?;
        display_parameter(f, module, receiver)?;
        write!(f, ").")?;
    }
    write!(f, "{}", module.name_of(function))?;
    display_type_parameters(f, &func.type_parameters)?;
    write!(f, "(")?;
    for (i, parameter) in func.value_parameters.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        display_parameter(f, module, *parameter)?;
    }
    write!(f, "): {}", func.return_type)
}

fn display_body(
    f: &mut Formatter<'_>,
    module: &Module,
    body: &[ExprId],
    indent: i32,
    function: Option<DeclId>,
) -> Result {
    for statement in body {
        write!(f, "{}", spaces(indent))?;
        display_expr(f, module, *statement, indent, function)?;
        writeln!(f)?;
    }
    Ok(())
}

fn display_function(f: &mut Formatter<'_>, module: &Module, function: DeclId, indent: i32) -> Result {
    display_signature(f, module, function)?;
    let body = module.function(function).and_then(|func| func.body.as_ref());
    if let Some(body) = body {
        writeln!(f, " {{")?;
        display_body(f, module, body, indent + 1, Some(function))?;
        write!(f, "{}}}", spaces(indent))?;
    }
    Ok(())
}

/// Print an operand, using parentheses for binary expressions.
fn display_operand(
    f: &mut Formatter<'_>,
    module: &Module,
    expr: ExprId,
    indent: i32,
    function: Option<DeclId>,
) -> Result {
    if matches!(module.expr(expr).kind, ExprKind::Binary { .. }) {
        write!(f, "(")?;
        display_expr(f, module, expr, indent, function)?;
        write!(f, ")")
    } else {
        display_expr(f, module, expr, indent, function)
    }
}

fn display_arguments(
    f: &mut Formatter<'_>,
    module: &Module,
    arguments: &[ExprId],
    indent: i32,
    function: Option<DeclId>,
) -> Result {
    write!(f, "(")?;
    for (i, argument) in arguments.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        display_expr(f, module, *argument, indent, function)?;
    }
    write!(f, ")")
}

pub fn display_expr(
    f: &mut Formatter<'_>,
    module: &Module,
    expr: ExprId,
    indent: i32,
    function: Option<DeclId>,
) -> Result {
    match &module.expr(expr).kind {
        ExprKind::Const(Const::Int(value)) => write!(f, "{value}"),
        ExprKind::Const(Const::Boolean(value)) => write!(f, "{value}"),
        ExprKind::Const(Const::String(value)) => write!(f, "\"{value}\""),
        ExprKind::Const(Const::Null) => write!(f, "null"),
        ExprKind::GetValue(value) => write!(f, "{}", module.name_of(*value)),
        ExprKind::GetField { receiver, field } => {
            if let Some(receiver) = receiver {
                display_operand(f, module, *receiver, indent, function)?;
                write!(f, ".")?;
            }
            write!(f, "#{}", module.name_of(*field))
        }
        ExprKind::SetField {
            receiver,
            field,
            value,
        } => {
            if let Some(receiver) = receiver {
                display_operand(f, module, *receiver, indent, function)?;
                write!(f, ".")?;
            }
            write!(f, "#{} = ", module.name_of(*field))?;
            display_expr(f, module, *value, indent, function)
        }
        ExprKind::Call(call) => {
            let accessor = module.function(call.callee).and_then(|c| c.accessor);
            let receiver = call.dispatch_receiver.or(call.extension_receiver);
            if let Some(super_qualifier) = call.super_qualifier {
                write!(f, "super<{}>.", module.name_of(super_qualifier))?;
            } else if let Some(receiver) = receiver {
                display_operand(f, module, receiver, indent, function)?;
                write!(f, ".")?;
            }
            if let Some(accessor) = accessor {
                write!(f, "{}", module.name_of(accessor.property))?;
                if accessor.kind == AccessorKind::Setter {
                    if let Some(value) = call.arguments.first() {
                        write!(f, " = ")?;
                        display_expr(f, module, *value, indent, function)?;
                    }
                }
                return Ok(());
            }
            write!(f, "{}", module.name_of(call.callee))?;
            if !call.type_arguments.is_empty() {
                let arguments = call
                    .type_arguments
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>();
                write!(f, "<{}>", arguments.join(", "))?;
            }
            display_arguments(f, module, &call.arguments, indent, function)
        }
        ExprKind::Binary { op, lhs, rhs } => {
            display_operand(f, module, *lhs, indent, function)?;
            write!(f, " {} ", op.symbol())?;
            display_operand(f, module, *rhs, indent, function)
        }
        ExprKind::Return { target, value } => {
            write!(f, "return")?;
            if Some(*target) != function {
                write!(f, "@{}", module.name_of(*target))?;
            }
            if let Some(value) = value {
                write!(f, " ")?;
                display_expr(f, module, *value, indent, function)?;
            }
            Ok(())
        }
        ExprKind::FunctionExpr(closure) => {
            if let Some(keyword) = module.decl(*closure).origin.keyword() {
                write!(f, "{keyword} ")?;
            }
            display_function(f, module, *closure, indent)
        }
        ExprKind::Variable(variable) => {
            let name = module.name_of(*variable);
            match &module.decl(*variable).kind {
                DeclKind::Variable(v) => {
                    write!(f, "val {name}: {} = ", v.typ)?;
                    display_expr(f, module, v.initializer, indent, function)
                }
                _ => write!(f, "val {name}"),
            }
        }
        ExprKind::If {
            condition,
            then,
            els,
        } => {
            write!(f, "if (")?;
            display_expr(f, module, *condition, indent, function)?;
            writeln!(f, ") {{")?;
            display_body(f, module, then, indent + 1, function)?;
            write!(f, "{}}}", spaces(indent))?;
            if !els.is_empty() {
                writeln!(f, " else {{")?;
                display_body(f, module, els, indent + 1, function)?;
                write!(f, "{}}}", spaces(indent))?;
            }
            Ok(())
        }
    }
}

fn display_decl(f: &mut Formatter<'_>, module: &Module, decl: DeclId, indent: i32) -> Result {
    let declaration = module.decl(decl);
    match &declaration.kind {
        DeclKind::Package(package) => {
            write!(f, "{}", spaces(indent))?;
            if package.external {
                write!(f, "extern ")?;
            }
            writeln!(f, "package {} {{", package.fq_name)?;
            for member in package.declarations.iter() {
                display_decl(f, module, *member, indent + 1)?;
            }
            writeln!(f, "{}}}", spaces(indent))
        }
        DeclKind::Class(class) => {
            write!(f, "{}", spaces(indent))?;
            display_modifiers(f, module, decl)?;
            let keyword = if class.is_interface { "interface" } else { "class" };
            write!(f, "{keyword} {}", declaration.name)?;
            display_type_parameters(f, &class.type_parameters)?;
            if !class.supertypes.is_empty() {
                let supertypes = class
                    .supertypes
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>();
                write!(f, " : {}", supertypes.join(", "))?;
            }
            if class.declarations.is_empty() {
                return writeln!(f);
            }
            writeln!(f, " {{")?;
            for member in class.declarations.iter() {
                display_decl(f, module, *member, indent + 1)?;
            }
            writeln!(f, "{}}}", spaces(indent))
        }
        DeclKind::Function(_) => {
            write!(f, "{}", spaces(indent))?;
            display_modifiers(f, module, decl)?;
            display_function(f, module, decl, indent)?;
            writeln!(f)
        }
        DeclKind::Field(field) => {
            write!(f, "{}", spaces(indent))?;
            display_modifiers(f, module, decl)?;
            if field.is_final {
                write!(f, "final ")?;
            }
            write!(f, "field {}: {}", declaration.name, field.typ)?;
            if let Some(initializer) = field.initializer {
                write!(f, " = ")?;
                display_expr(f, module, initializer, indent, None)?;
            }
            writeln!(f)
        }
        DeclKind::Property(property) => {
            write!(f, "{}", spaces(indent))?;
            display_modifiers(f, module, decl)?;
            let keyword = if property.is_var { "var" } else { "val" };
            write!(f, "{keyword} {}: {}", declaration.name, property.typ)?;
            let initializer = property
                .backing_field
                .and_then(|field| module.field(field))
                .and_then(|field| field.initializer);
            if let Some(initializer) = initializer {
                write!(f, " = ")?;
                display_expr(f, module, initializer, indent, None)?;
            }
            writeln!(f)
        }
        DeclKind::Parameter(_) | DeclKind::Variable(_) => Ok(()),
    }
}

/// Wrapper to print a single expression, mostly for logging.
pub struct ExprDisplay<'a> {
    pub module: &'a Module,
    pub expr: ExprId,
}

impl Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        display_expr(f, self.module, self.expr, 0, None)
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "module @{} target {} {{", self.name(), self.target())?;
        for package in self.packages() {
            display_decl(f, self, *package, 1)?;
        }
        write!(f, "}}")
    }
}
