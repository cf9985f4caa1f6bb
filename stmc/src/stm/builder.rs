//! Construction of new declarations and expressions for the lowering.

use crate::ir::deep_copy_body;
use crate::ir::Call;
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
use crate::ir::SymbolRemapper;
use crate::ir::Type;
use crate::ir::Visibility;
use crate::stm::names;

/// Add an extension receiver to `function`.
pub fn add_extension_receiver(module: &mut Module, function: DeclId, name: &str, typ: Type) -> DeclId {
    let receiver = module.new_parameter(function, name, typ, ParameterKind::ExtensionReceiver, 0);
    if let Some(f) = module.function_mut(function) {
        f.extension_receiver = Some(receiver);
    }
    receiver
}

/// Append a value parameter to `function`.
pub fn add_value_parameter(module: &mut Module, function: DeclId, name: &str, typ: Type) -> DeclId {
    let index = module
        .function(function)
        .map(|f| f.value_parameters.len())
        .unwrap_or(0);
    let parameter = module.new_parameter(function, name, typ, ParameterKind::Value, index);
    if let Some(f) = module.function_mut(function) {
        f.value_parameters.push(parameter);
    }
    parameter
}

/// Private final field owned by `class`; the field is not yet a member.
pub fn private_final_field(module: &mut Module, class: DeclId, name: &str, typ: Type) -> DeclId {
    let field = Field {
        typ,
        visibility: Visibility::Private,
        is_final: true,
        initializer: None,
    };
    let decl = Declaration::new(name, Some(class), Origin::DelegatedMember, DeclKind::Field(field));
    module.add_decl(decl)
}

pub fn set_field_initializer(module: &mut Module, field: DeclId, initializer: ExprId) {
    if let DeclKind::Field(f) = &mut module.decl_mut(field).kind {
        f.initializer = Some(initializer);
    }
}

pub fn get_value(module: &mut Module, value: DeclId) -> ExprId {
    let typ = module
        .decl(value)
        .value_type()
        .cloned()
        .unwrap_or(Type::Unit);
    module.add_expr(Expression::new(ExprKind::GetValue(value), typ))
}

/// `receiver.#field`
pub fn get_field(module: &mut Module, receiver: DeclId, field: DeclId) -> ExprId {
    let receiver = get_value(module, receiver);
    let typ = module
        .decl(field)
        .value_type()
        .cloned()
        .unwrap_or(Type::Unit);
    let kind = ExprKind::GetField {
        receiver: Some(receiver),
        field,
    };
    module.add_expr(Expression::new(kind, typ))
}

pub fn null_const(module: &mut Module, typ: Type) -> ExprId {
    module.add_expr(Expression::new(ExprKind::Const(Const::Null), typ.make_nullable()))
}

pub fn call(module: &mut Module, call: Call, typ: Type) -> ExprId {
    module.add_expr(Expression::new(ExprKind::Call(call), typ))
}

pub fn return_expr(module: &mut Module, target: DeclId, value: Option<ExprId>) -> ExprId {
    let kind = ExprKind::Return { target, value };
    module.add_expr(Expression::new(kind, Type::Nothing))
}

/// Point the returns of `body` that leave `from` to `to`.
///
/// Returns inside `if` blocks are included, returns inside nested closures
/// are not.
fn retarget_returns(module: &mut Module, body: &[ExprId], from: DeclId, to: DeclId) {
    for statement in body {
        let (then, els) = match &mut module.expr_mut(*statement).kind {
            ExprKind::Return { target, .. } => {
                if *target == from {
                    *target = to;
                }
                continue;
            }
            ExprKind::If { then, els, .. } => (then.clone(), els.clone()),
            _ => continue,
        };
        retarget_returns(module, &then, from, to);
        retarget_returns(module, &els, from, to);
    }
}

/// Closure `STMContext.() -> ret` that runs a copy of `body`.
///
/// The closure is owned by `method` and has the context as extension
/// receiver, so that the copied body can find it. Returns from `method`,
/// also the early ones inside `if` blocks, become returns from the closure;
/// the value they carry is the value that the closure yields and that
/// `method` then returns.
pub fn atomic_lambda(
    module: &mut Module,
    method: DeclId,
    context_type: &Type,
    ret: &Type,
    body: &[ExprId],
) -> ExprId {
    let name = names::atomic_lambda_name(module.name_of(method));
    let function = Function::new(Visibility::Local, ret.clone());
    let decl = Declaration::new(&name, Some(method), Origin::StmPlugin, DeclKind::Function(function));
    let closure = module.add_decl(decl);
    add_extension_receiver(module, closure, names::CONTEXT_PARAMETER, context_type.clone());
    let mut remapper = SymbolRemapper::new();
    let body = deep_copy_body(module, body, &mut remapper, closure);
    retarget_returns(module, &body, method, closure);
    if let Some(f) = module.function_mut(closure) {
        f.body = Some(body);
    }
    let typ = Type::function(Some(context_type.clone()), vec![], ret.clone());
    module.add_expr(Expression::new(ExprKind::FunctionExpr(closure), typ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ExprDisplay;
    use crate::parser::Parser;
    use indoc::indoc;

    #[test]
    fn test_atomic_lambda() {
        let src = indoc! {"
        module @app {
          extern package kotlinx.stm {
            class STMContext
          }
          package demo {
            fun pick(a: Int): Int {
              if (a == 0) {
                return 1
              }
              val f: () -> Int = fun local(): Int {
                return@pick 2
              }
              return a
            }
          }
        }"};
        let mut module = Parser::parse(src).unwrap();
        let pick = module.find_functions("demo", "pick")[0];
        let context = module.find_class("kotlinx.stm", "STMContext").unwrap();
        let context_type = module.class_type(context);
        let body = module.function(pick).unwrap().body.clone().unwrap();
        let lambda = atomic_lambda(&mut module, pick, &context_type, &Type::Int, &body);

        let ExprKind::FunctionExpr(closure) = module.expr(lambda).kind else {
            panic!("expected closure");
        };
        assert_eq!(module.name_of(closure), "pick_atomicLambda");
        assert_eq!(module.decl(closure).parent, Some(pick));
        assert_eq!(module.decl(closure).origin, Origin::StmPlugin);
        let copied = module.function(closure).unwrap().body.clone().unwrap();
        assert_eq!(copied.len(), 3);
        // The top level return now leaves the closure.
        match &module.expr(copied[2]).kind {
            ExprKind::Return { target, .. } => assert_eq!(*target, closure),
            _ => panic!("expected return"),
        }
        // So does the early return.
        match &module.expr(copied[0]).kind {
            ExprKind::If { then, .. } => match &module.expr(then[0]).kind {
                ExprKind::Return { target, .. } => assert_eq!(*target, closure),
                _ => panic!("expected return"),
            },
            _ => panic!("expected if"),
        }
        // Returns inside a nested closure keep their target.
        let ExprKind::Variable(local) = module.expr(copied[1]).kind else {
            panic!("expected variable");
        };
        let DeclKind::Variable(v) = &module.decl(local).kind else {
            panic!("expected variable");
        };
        let ExprKind::FunctionExpr(nested) = module.expr(v.initializer).kind else {
            panic!("expected closure");
        };
        let nested_body = module.function(nested).unwrap().body.clone().unwrap();
        match &module.expr(nested_body[0]).kind {
            ExprKind::Return { target, .. } => assert_eq!(*target, pick),
            _ => panic!("expected return"),
        }
        let printed = ExprDisplay {
            module: &module,
            expr: lambda,
        }
        .to_string();
        assert!(printed.starts_with("generated fun (ctx: STMContext).pick_atomicLambda(): Int {"));
    }
}
