use crate::ir::Call;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::Declaration;
use crate::ir::ExprId;
use crate::ir::ExprKind;
use crate::ir::Expression;
use crate::ir::Module;
use crate::ir::Variable;
use std::collections::HashMap;

/// Mapping from declarations in the original tree to their copies.
///
/// Symbols that are not in the map refer to declarations outside of the
/// copied subtree and are kept as is.
#[derive(Clone, Debug, Default)]
pub struct SymbolRemapper {
    decls: HashMap<DeclId, DeclId>,
}

impl SymbolRemapper {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn insert(&mut self, old: DeclId, new: DeclId) {
        self.decls.insert(old, new);
    }
    pub fn remap(&self, id: DeclId) -> DeclId {
        self.decls.get(&id).copied().unwrap_or(id)
    }
}

/// Copy the declaration `old` including its parameters, but without body.
fn copy_function_signature(
    module: &mut Module,
    old: DeclId,
    parent: DeclId,
    remapper: &mut SymbolRemapper,
) -> DeclId {
    let mut decl = module.decl(old).clone();
    decl.parent = Some(parent);
    let new = module.add_decl(decl);
    remapper.insert(old, new);
    let parameters = module.all_parameters(old);
    let mut copies = HashMap::new();
    for parameter in parameters {
        let mut copy = module.decl(parameter).clone();
        copy.parent = Some(new);
        let copy = module.add_decl(copy);
        remapper.insert(parameter, copy);
        copies.insert(parameter, copy);
    }
    if let Some(function) = module.function_mut(new) {
        let remap = |id: DeclId| copies.get(&id).copied().unwrap_or(id);
        function.dispatch_receiver = function.dispatch_receiver.map(remap);
        function.extension_receiver = function.extension_receiver.map(remap);
        function.value_parameters = function.value_parameters.iter().map(|p| remap(*p)).collect();
    }
    new
}

fn copy_call(module: &mut Module, call: &Call, remapper: &mut SymbolRemapper, parent: DeclId) -> Call {
    let dispatch_receiver = call
        .dispatch_receiver
        .map(|r| deep_copy_expr(module, r, remapper, parent));
    let extension_receiver = call
        .extension_receiver
        .map(|r| deep_copy_expr(module, r, remapper, parent));
    let arguments = call
        .arguments
        .iter()
        .map(|a| deep_copy_expr(module, *a, remapper, parent))
        .collect();
    Call {
        callee: call.callee,
        dispatch_receiver,
        extension_receiver,
        arguments,
        type_arguments: call.type_arguments.clone(),
        super_qualifier: call.super_qualifier,
    }
}

/// Copy the expression tree rooted at `expr`.
///
/// Closures and local variables declared inside the tree are copied too.
/// References to them (value reads and return targets) are rebound to the
/// copies via `remapper`. Copied declarations that are not nested in another
/// copied declaration get `parent` as their structural parent.
pub fn deep_copy_expr(
    module: &mut Module,
    expr: ExprId,
    remapper: &mut SymbolRemapper,
    parent: DeclId,
) -> ExprId {
    let original = module.expr(expr).clone();
    let kind = match &original.kind {
        ExprKind::Const(c) => ExprKind::Const(c.clone()),
        ExprKind::GetValue(value) => ExprKind::GetValue(remapper.remap(*value)),
        ExprKind::GetField { receiver, field } => ExprKind::GetField {
            receiver: receiver.map(|r| deep_copy_expr(module, r, remapper, parent)),
            field: remapper.remap(*field),
        },
        ExprKind::SetField {
            receiver,
            field,
            value,
        } => {
            let receiver = receiver.map(|r| deep_copy_expr(module, r, remapper, parent));
            let value = deep_copy_expr(module, *value, remapper, parent);
            ExprKind::SetField {
                receiver,
                field: remapper.remap(*field),
                value,
            }
        }
        ExprKind::Call(call) => ExprKind::Call(copy_call(module, call, remapper, parent)),
        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = deep_copy_expr(module, *lhs, remapper, parent);
            let rhs = deep_copy_expr(module, *rhs, remapper, parent);
            ExprKind::Binary { op: *op, lhs, rhs }
        }
        ExprKind::Return { target, value } => {
            let value = value.map(|v| deep_copy_expr(module, v, remapper, parent));
            ExprKind::Return {
                target: remapper.remap(*target),
                value,
            }
        }
        ExprKind::FunctionExpr(function) => {
            let new = copy_function_signature(module, *function, parent, remapper);
            let body = module
                .function(*function)
                .and_then(|f| f.body.clone())
                .map(|body| deep_copy_body(module, &body, remapper, new));
            if let Some(f) = module.function_mut(new) {
                f.body = body;
            }
            ExprKind::FunctionExpr(new)
        }
        ExprKind::Variable(variable) => {
            let old = module.decl(*variable).clone();
            match &old.kind {
                DeclKind::Variable(v) => {
                    let initializer = deep_copy_expr(module, v.initializer, remapper, parent);
                    let kind = DeclKind::Variable(Variable {
                        typ: v.typ.clone(),
                        initializer,
                    });
                    let decl = Declaration::new(&old.name, Some(parent), old.origin, kind);
                    let new = module.add_decl(decl);
                    remapper.insert(*variable, new);
                    ExprKind::Variable(new)
                }
                _ => ExprKind::Variable(remapper.remap(*variable)),
            }
        }
        ExprKind::If {
            condition,
            then,
            els,
        } => {
            let condition = deep_copy_expr(module, *condition, remapper, parent);
            let then = deep_copy_body(module, then, remapper, parent);
            let els = deep_copy_body(module, els, remapper, parent);
            ExprKind::If {
                condition,
                then,
                els,
            }
        }
    };
    module.add_expr(Expression::new(kind, original.typ.clone()))
}

/// Copy a statement sequence; see [deep_copy_expr].
pub fn deep_copy_body(
    module: &mut Module,
    body: &[ExprId],
    remapper: &mut SymbolRemapper,
    parent: DeclId,
) -> Vec<ExprId> {
    body.iter()
        .map(|e| deep_copy_expr(module, *e, remapper, parent))
        .collect()
}

/// Return the parent of the first declaration inside the tree at `expr`.
///
/// Declarations are searched depth-first in evaluation order. This is the
/// structural parent that a copy of the tree should get.
pub fn find_parent(module: &Module, expr: ExprId) -> Option<DeclId> {
    match &module.expr(expr).kind {
        ExprKind::FunctionExpr(function) => module.decl(*function).parent,
        ExprKind::Variable(variable) => {
            let initializer = match &module.decl(*variable).kind {
                DeclKind::Variable(v) => find_parent(module, v.initializer),
                _ => None,
            };
            initializer.or(module.decl(*variable).parent)
        }
        _ => module
            .expr(expr)
            .children()
            .into_iter()
            .find_map(|child| find_parent(module, child)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Const;
    use crate::ir::Function;
    use crate::ir::Origin;
    use crate::ir::Parameter;
    use crate::ir::ParameterKind;
    use crate::ir::Platform;
    use crate::ir::Type;
    use crate::ir::Visibility;

    fn function(module: &mut Module, name: &str, parent: DeclId) -> DeclId {
        let function = Function::new(Visibility::Local, Type::Int);
        let decl = Declaration::new(name, Some(parent), Origin::Defined, DeclKind::Function(function));
        module.add_decl(decl)
    }

    #[test]
    fn test_deep_copy_rebinds_closure() {
        let mut module = Module::new("test", Platform::Jvm);
        let package = module.add_package("demo", false);
        let outer = function(&mut module, "outer", package);
        module.add_member(package, outer);
        let closure = function(&mut module, "lambda", outer);
        let parameter = Parameter {
            typ: Type::Int,
            index: 0,
            kind: ParameterKind::Value,
        };
        let x = Declaration::new("x", Some(closure), Origin::Defined, DeclKind::Parameter(parameter));
        let x = module.add_decl(x);
        let read = module.add_expr(Expression::new(ExprKind::GetValue(x), Type::Int));
        let ret = ExprKind::Return {
            target: closure,
            value: Some(read),
        };
        let ret = module.add_expr(Expression::new(ret, Type::Nothing));
        if let Some(f) = module.function_mut(closure) {
            f.value_parameters = vec![x];
            f.body = Some(vec![ret]);
        }
        let typ = Type::function(None, vec![Type::Int], Type::Int);
        let expr = module.add_expr(Expression::new(ExprKind::FunctionExpr(closure), typ));
        assert_eq!(find_parent(&module, expr), Some(outer));

        let other = function(&mut module, "other", package);
        let mut remapper = SymbolRemapper::new();
        let copy = deep_copy_expr(&mut module, expr, &mut remapper, other);
        let new_closure = match &module.expr(copy).kind {
            ExprKind::FunctionExpr(f) => *f,
            _ => panic!("expected closure"),
        };
        assert_ne!(new_closure, closure);
        assert_eq!(module.decl(new_closure).parent, Some(other));
        let f = module.function(new_closure).unwrap();
        let new_x = f.value_parameters[0];
        assert_ne!(new_x, x);
        assert_eq!(module.decl(new_x).parent, Some(new_closure));
        let body = f.body.clone().unwrap();
        match &module.expr(body[0]).kind {
            ExprKind::Return { target, value } => {
                assert_eq!(*target, new_closure);
                let value = value.unwrap();
                assert!(matches!(module.expr(value).kind, ExprKind::GetValue(v) if v == new_x));
            }
            _ => panic!("expected return"),
        }
    }

    #[test]
    fn test_find_parent_without_declarations() {
        let mut module = Module::new("test", Platform::Jvm);
        let one = module.add_expr(Expression::new(ExprKind::Const(Const::Int(1)), Type::Int));
        assert_eq!(find_parent(&module, one), None);
    }
}
