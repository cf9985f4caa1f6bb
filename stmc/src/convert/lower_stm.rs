use crate::convert::apply_rewrites;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::ExprId;
use crate::ir::ExprKind;
use crate::ir::Module;
use crate::ir::Origin;
use crate::stm::is_atomic_candidate;
use crate::stm::names;
use crate::stm::patch_function;
use crate::stm::patch_shared_class;
use crate::stm::CallPatcher;
use crate::stm::FunctionTransformMap;
use crate::stm::SymbolBundle;
use anyhow::Result;
use tracing::debug;
use tracing::info;

/// Lower a class annotated with `@SharedMutable`.
struct SharedClassLowering<'a> {
    bundle: &'a SymbolBundle,
}

impl Rewrite for SharedClassLowering<'_> {
    fn name(&self) -> &'static str {
        "lower_stm::SharedClassLowering"
    }
    fn is_match(&self, module: &Module, decl: DeclId) -> Result<bool> {
        Ok(module.class_has_annotation(decl, names::SHARED_MUTABLE))
    }
    fn rewrite(&self, module: &mut Module, class: DeclId) -> Result<RewriteResult> {
        if patch_shared_class(module, self.bundle, class)? {
            Ok(RewriteResult::Changed)
        } else {
            Ok(RewriteResult::Unchanged)
        }
    }
}

fn is_run_atomically_call(module: &Module, expr: ExprId) -> bool {
    let Some(call) = module.expr(expr).as_call() else {
        return false;
    };
    let single = module
        .function(call.callee)
        .is_some_and(|f| f.value_parameters.len() == 1);
    single && module.fq_name(call.callee) == names::run_atomically_fq_name()
}

/// Calls of `@AtomicFunction` declarations, including external ones.
fn is_atomic_function_call(module: &Module, expr: ExprId) -> bool {
    let Some(call) = module.expr(expr).as_call() else {
        return false;
    };
    let annotated = module
        .function(call.callee)
        .is_some_and(|f| f.has_annotation(names::ATOMIC_FUNCTION));
    annotated && module.decl(call.callee).origin != Origin::StmPlugin
}

/// Whether `body` contains a call for which `predicate` holds, also inside
/// closures and local variable initializers.
fn contains_call(module: &Module, body: &[ExprId], predicate: fn(&Module, ExprId) -> bool) -> bool {
    body.iter().any(|expr| {
        if predicate(module, *expr) {
            return true;
        }
        match &module.expr(*expr).kind {
            ExprKind::FunctionExpr(closure) => module
                .function(*closure)
                .and_then(|f| f.body.as_deref())
                .is_some_and(|body| contains_call(module, body, predicate)),
            ExprKind::Variable(variable) => match &module.decl(*variable).kind {
                DeclKind::Variable(v) => contains_call(module, &[v.initializer], predicate),
                _ => false,
            },
            _ => contains_call(module, &module.expr(*expr).children(), predicate),
        }
    })
}

/// Whether the module uses anything that the lowering rewrites.
///
/// Modules without shared classes, atomic functions, calls of atomic
/// functions and `runAtomically` calls do not need the runtime to be
/// resolvable.
fn needs_lowering(module: &Module) -> bool {
    let shared = module
        .classes()
        .into_iter()
        .any(|c| module.class_has_annotation(c, names::SHARED_MUTABLE));
    if shared {
        return true;
    }
    let functions = module.functions();
    if functions.iter().any(|f| is_atomic_candidate(module, *f)) {
        return true;
    }
    functions.iter().any(|f| {
        let body = module.function(*f).and_then(|f| f.body.as_deref());
        body.is_some_and(|body| {
            contains_call(module, body, is_run_atomically_call)
                || contains_call(module, body, is_atomic_function_call)
        })
    })
}

/// Lower STM-shared classes, atomic functions and `runAtomically` calls to
/// calls of the STM runtime.
///
/// Expects the accessors of shared classes to be declared; see
/// `--resolve-stm-accessors`.
pub struct LowerStm;

impl Pass for LowerStm {
    const NAME: &'static str = "lower-stm";
    fn convert(module: &mut Module) -> Result<RewriteResult> {
        if !needs_lowering(module) {
            debug!("Module {} does not use STM", module.name());
            return Ok(RewriteResult::Unchanged);
        }
        let bundle = SymbolBundle::resolve(module)?;
        let rewrite = SharedClassLowering { bundle: &bundle };
        let mut result = apply_rewrites(module, &[&rewrite])?;

        let mut map = FunctionTransformMap::new();
        for function in module.functions() {
            if is_atomic_candidate(module, function) {
                let patched = patch_function(module, &bundle, &mut map, function);
                module.replace_decl(function, patched);
            }
        }
        if !map.is_empty() {
            info!("Patched {} atomic functions", map.len());
            result = RewriteResult::Changed;
        }

        let mut patcher = CallPatcher::new(&bundle, &map);
        patcher.patch_module(module)?;
        if patcher.changed() > 0 {
            info!("Rewrote {} call sites", patcher.changed());
            result = RewriteResult::Changed;
        }
        Ok(result)
    }
}
