use crate::ir::deep_copy_expr;
use crate::ir::find_parent;
use crate::ir::AccessorKind;
use crate::ir::Call;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::ExprId;
use crate::ir::ExprKind;
use crate::ir::Expression;
use crate::ir::Module;
use crate::ir::Origin;
use crate::ir::SymbolRemapper;
use crate::stm::builder;
use crate::stm::context::fetch_stm_context;
use crate::stm::context::fetch_stm_context_or_null;
use crate::stm::context::FunctionStack;
use crate::stm::names;
use crate::stm::symbols::find_run_atomically_overload;
use crate::stm::FunctionTransformMap;
use crate::stm::LoweringError;
use crate::stm::SymbolBundle;
use anyhow::anyhow;
use anyhow::Result;
use tracing::debug;

/// Rewrites call sites module-wide.
///
/// Every call is visited after its arguments, so arguments are already in
/// their final form when a call is rebuilt.
pub struct CallPatcher<'a> {
    bundle: &'a SymbolBundle,
    map: &'a FunctionTransformMap,
    changed: usize,
    /// Field whose initializer is being visited.
    field: Option<DeclId>,
}

impl<'a> CallPatcher<'a> {
    pub fn new(bundle: &'a SymbolBundle, map: &'a FunctionTransformMap) -> Self {
        CallPatcher {
            bundle,
            map,
            changed: 0,
            field: None,
        }
    }
    /// Number of rewritten expressions so far.
    pub fn changed(&self) -> usize {
        self.changed
    }
    /// Visit all function bodies and field initializers of the module.
    pub fn patch_module(&mut self, module: &mut Module) -> Result<()> {
        for function in module.functions() {
            let mut stack = FunctionStack::new();
            self.visit_function(module, function, &mut stack)?;
        }
        for class in module.classes() {
            for member in module.members(class) {
                let field = match module.property(member) {
                    Some(property) => property.backing_field,
                    None => Some(member),
                };
                let initializer = field
                    .and_then(|f| module.field(f))
                    .and_then(|f| f.initializer);
                if let Some(initializer) = initializer {
                    let mut stack = FunctionStack::new();
                    self.field = field;
                    let result = self.visit(module, initializer, &mut stack);
                    self.field = None;
                    result?;
                }
            }
        }
        Ok(())
    }
    fn visit_function(&mut self, module: &mut Module, function: DeclId, stack: &mut FunctionStack) -> Result<()> {
        let body = module.function(function).and_then(|f| f.body.clone());
        let Some(body) = body else {
            return Ok(());
        };
        stack.push(function);
        let result = body.iter().try_for_each(|e| self.visit(module, *e, stack));
        stack.pop();
        result
    }
    fn visit(&mut self, module: &mut Module, expr: ExprId, stack: &mut FunctionStack) -> Result<()> {
        let kind = module.expr(expr).kind.clone();
        match &kind {
            ExprKind::FunctionExpr(closure) => {
                return self.visit_function(module, *closure, stack);
            }
            ExprKind::Variable(variable) => {
                let initializer = match &module.decl(*variable).kind {
                    DeclKind::Variable(v) => Some(v.initializer),
                    _ => None,
                };
                if let Some(initializer) = initializer {
                    self.visit(module, initializer, stack)?;
                }
            }
            _ => {
                for child in module.expr(expr).children() {
                    self.visit(module, child, stack)?;
                }
            }
        }
        let replacement = match &kind {
            ExprKind::GetValue(value) => self.map.argument(*value).map(|new| {
                let typ = module.expr(expr).typ.clone();
                Expression::new(ExprKind::GetValue(new), typ)
            }),
            ExprKind::Call(call) => self.patch_call(module, expr, call, stack)?,
            _ => None,
        };
        if let Some(replacement) = replacement {
            *module.expr_mut(expr) = replacement;
            self.changed += 1;
        }
        Ok(())
    }
    fn patch_call(
        &self,
        module: &mut Module,
        expr: ExprId,
        call: &Call,
        stack: &FunctionStack,
    ) -> Result<Option<Expression>> {
        let callee = call.callee;
        let Some(function) = module.function(callee).cloned() else {
            return Ok(None);
        };
        if let Some(accessor) = function.accessor {
            let property_class = module.decl(accessor.property).parent;
            let shared = property_class.is_some_and(|c| module.class_has_annotation(c, names::SHARED_MUTABLE));
            if shared {
                return self.patch_property_access(module, expr, call, accessor.property, accessor.kind, stack);
            }
            return Ok(None);
        }
        let atomic = self.map.patched(callee).is_some()
            || (function.has_annotation(names::ATOMIC_FUNCTION) && module.decl(callee).origin != Origin::StmPlugin);
        if atomic {
            return self.patch_atomic_function_call(module, expr, call, stack).map(Some);
        }
        let is_top_level = module
            .decl(callee)
            .parent
            .is_some_and(|p| module.package(p).is_some());
        if is_top_level
            && function.value_parameters.len() == 1
            && module.fq_name(callee) == names::run_atomically_fq_name()
        {
            return self.patch_run_atomically_call(module, expr, call, stack).map(Some);
        }
        Ok(None)
    }
    /// Copy `expr` for use in a rebuilt call.
    ///
    /// Declarations in the copy are owned by the owner of the original, else
    /// by the innermost function or the field whose initializer is visited.
    fn copy(&self, module: &mut Module, expr: ExprId, stack: &FunctionStack) -> Result<ExprId> {
        let Some(parent) = find_parent(module, expr).or(stack.innermost()).or(self.field) else {
            return Err(anyhow!("Call argument outside of a function or field initializer"));
        };
        let mut remapper = SymbolRemapper::new();
        Ok(deep_copy_expr(module, expr, &mut remapper, parent))
    }
    fn copy_receiver(
        &self,
        module: &mut Module,
        receiver: Option<ExprId>,
        stack: &FunctionStack,
    ) -> Result<Option<ExprId>> {
        receiver.map(|r| self.copy(module, r, stack)).transpose()
    }
    /// Rewrite `recv.n` into `recv.getN(ctx)` and `recv.n = v` into
    /// `recv.setN(ctx, v)`.
    fn patch_property_access(
        &self,
        module: &mut Module,
        expr: ExprId,
        call: &Call,
        property: DeclId,
        kind: AccessorKind,
        stack: &FunctionStack,
    ) -> Result<Option<Expression>> {
        let name = module.name_of(property).to_string();
        if names::is_stm_field_name(&name) {
            return Ok(None);
        }
        let receiver = call.dispatch_receiver.or(call.extension_receiver);
        let class = receiver.and_then(|r| module.expr(r).typ.class_or_none());
        let Some(class) = class else {
            return Err(LoweringError::UnknownReceiverClass {
                accessor: module.name_of(call.callee).to_string(),
            }
            .into());
        };
        let accessor_name = match kind {
            AccessorKind::Getter => names::getter_name(&name),
            AccessorKind::Setter => names::setter_name(&name),
        };
        let Some(accessor) = module.find_member_functions(class, &accessor_name).first().copied() else {
            debug!("No {accessor_name} in {}; keeping access", module.name_of(class));
            return Ok(None);
        };
        let context = match fetch_stm_context_or_null(module, stack) {
            Some(context) => builder::get_value(module, context),
            None => {
                let typ = module
                    .function(accessor)
                    .and_then(|f| f.value_parameters.first().copied())
                    .and_then(|p| module.decl(p).value_type().cloned())
                    .unwrap_or_else(|| self.bundle.context_type.make_nullable());
                builder::null_const(module, typ)
            }
        };
        let mut arguments = vec![context];
        for argument in call.arguments.iter() {
            arguments.push(self.copy(module, *argument, stack)?);
        }
        let new = Call {
            callee: accessor,
            dispatch_receiver: self.copy_receiver(module, call.dispatch_receiver, stack)?,
            extension_receiver: self.copy_receiver(module, call.extension_receiver, stack)?,
            arguments,
            type_arguments: call.type_arguments.clone(),
            super_qualifier: call.super_qualifier,
        };
        debug!("Rewrote access of {name} into a call of {accessor_name}");
        let typ = module.expr(expr).typ.clone();
        Ok(Some(Expression::new(ExprKind::Call(new), typ)))
    }
    /// Call the patched counterpart of an atomic function with the context
    /// of the nearest enclosing function as last argument.
    fn patch_atomic_function_call(
        &self,
        module: &mut Module,
        expr: ExprId,
        call: &Call,
        stack: &FunctionStack,
    ) -> Result<Expression> {
        let context = fetch_stm_context(module, stack, call.callee)?;
        let Some(patched) = self.map.patched(call.callee) else {
            return Err(LoweringError::UnmappedAtomicFunction {
                function: module.name_of(call.callee).to_string(),
            }
            .into());
        };
        let mut arguments = vec![];
        for argument in call.arguments.iter() {
            arguments.push(self.copy(module, *argument, stack)?);
        }
        arguments.push(builder::get_value(module, context));
        let new = Call {
            callee: patched,
            dispatch_receiver: self.copy_receiver(module, call.dispatch_receiver, stack)?,
            extension_receiver: self.copy_receiver(module, call.extension_receiver, stack)?,
            arguments,
            type_arguments: call.type_arguments.clone(),
            super_qualifier: call.super_qualifier,
        };
        debug!("Rewrote call of atomic function {}", module.name_of(patched));
        let typ = module.expr(expr).typ.clone();
        Ok(Expression::new(ExprKind::Call(new), typ))
    }
    /// Rewrite `runAtomically(block)` into `runAtomically(findXSTM(), block)`.
    fn patch_run_atomically_call(
        &self,
        module: &mut Module,
        expr: ExprId,
        call: &Call,
        stack: &FunctionStack,
    ) -> Result<Expression> {
        let overload = find_run_atomically_overload(module)?;
        let stm_type = module
            .function(overload)
            .and_then(|f| f.value_parameters.first().copied())
            .and_then(|p| module.decl(p).value_type().cloned())
            .unwrap_or_else(|| self.bundle.stm_type.clone());
        let stm = builder::call(module, Call::new(self.bundle.search), stm_type);
        let mut arguments = vec![stm];
        if let Some(block) = call.arguments.first() {
            arguments.push(self.copy(module, *block, stack)?);
        }
        let new = Call {
            callee: overload,
            dispatch_receiver: call.dispatch_receiver,
            extension_receiver: call.extension_receiver,
            arguments,
            type_arguments: call.type_arguments.clone(),
            super_qualifier: call.super_qualifier,
        };
        debug!("Rewrote runAtomically call");
        let typ = module.expr(expr).typ.clone();
        Ok(Expression::new(ExprKind::Call(new), typ))
    }
}
