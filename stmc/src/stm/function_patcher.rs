use crate::ir::deep_copy_body;
use crate::ir::DeclId;
use crate::ir::Module;
use crate::ir::Origin;
use crate::ir::SymbolRemapper;
use crate::stm::builder;
use crate::stm::names;
use crate::stm::SymbolBundle;
use std::collections::HashMap;
use tracing::debug;

/// Mapping from atomic functions to their context-extended counterparts.
#[derive(Clone, Debug, Default)]
pub struct FunctionTransformMap {
    functions: HashMap<DeclId, DeclId>,
    /// Parameters of original functions to the parameters of the patched
    /// functions.
    arguments: HashMap<DeclId, DeclId>,
}

impl FunctionTransformMap {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn patched(&self, original: DeclId) -> Option<DeclId> {
        self.functions.get(&original).copied()
    }
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
    pub fn len(&self) -> usize {
        self.functions.len()
    }
    /// Parameter that replaces `parameter`, if `parameter` belongs to a
    /// patched function.
    pub fn argument(&self, parameter: DeclId) -> Option<DeclId> {
        self.arguments.get(&parameter).copied()
    }
}

/// Whether `function` has to get a context parameter.
pub fn is_atomic_candidate(module: &Module, function: DeclId) -> bool {
    let Some(f) = module.function(function) else {
        return false;
    };
    f.has_annotation(names::ATOMIC_FUNCTION)
        && f.body.is_some()
        && module.decl(function).origin != Origin::StmPlugin
        && !module.is_external(function)
}

/// Create a copy of `original` with a trailing `ctx: STMContext` parameter.
///
/// The body is copied with all symbols of `original` rebound to the copy.
/// The original is left untouched; the caller is expected to swap it out via
/// [Module::replace_decl].
pub fn patch_function(
    module: &mut Module,
    bundle: &SymbolBundle,
    map: &mut FunctionTransformMap,
    original: DeclId,
) -> DeclId {
    let mut decl = module.decl(original).clone();
    decl.origin = Origin::StmPlugin;
    if let Some(f) = decl.as_function_mut() {
        f.dispatch_receiver = None;
        f.extension_receiver = None;
        f.value_parameters = vec![];
        f.body = None;
    }
    let patched = module.add_decl(decl);
    let mut remapper = SymbolRemapper::new();
    remapper.insert(original, patched);

    let Some(f) = module.function(original).cloned() else {
        return patched;
    };
    let mut copy = |module: &mut Module, parameter: DeclId| {
        let mut decl = module.decl(parameter).clone();
        decl.parent = Some(patched);
        let new = module.add_decl(decl);
        remapper.insert(parameter, new);
        map.arguments.insert(parameter, new);
        new
    };
    let dispatch_receiver = f.dispatch_receiver.map(|p| copy(module, p));
    let extension_receiver = f.extension_receiver.map(|p| copy(module, p));
    let value_parameters: Vec<DeclId> = f.value_parameters.iter().map(|p| copy(module, *p)).collect();
    if let Some(new) = module.function_mut(patched) {
        new.dispatch_receiver = dispatch_receiver;
        new.extension_receiver = extension_receiver;
        new.value_parameters = value_parameters;
    }
    builder::add_value_parameter(module, patched, names::CONTEXT_PARAMETER, bundle.context_type.clone());

    let body = f
        .body
        .map(|body| deep_copy_body(module, &body, &mut remapper, patched));
    if let Some(new) = module.function_mut(patched) {
        new.body = body;
    }
    map.functions.insert(original, patched);
    debug!("Patched atomic function {}", module.fq_name(patched));
    patched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ExprKind;
    use crate::parser::Parser;
    use indoc::indoc;

    #[test]
    fn test_patch_function() {
        let src = indoc! {"
        module @bank {
          extern package kotlinx.stm {
            class STMContext
            class UniversalDelegate<T>
            interface STM {
              fun wrap<T>(initValue: T?): UniversalDelegate<T>
              fun getVar<T>(ctx: STMContext?, delegate: UniversalDelegate<T>): T
              fun setVar<T>(ctx: STMContext?, delegate: UniversalDelegate<T>, newValue: T): Unit
              fun runAtomically<T>(ctx: STMContext?, block: STMContext.() -> T): T
              fun getContext(): STMContext
            }
            fun findJavaSTM(): STM
          }
          package demo {
            @AtomicFunction fun fee(amount: Int): Int {
              return amount * 2
            }
          }
        }"};
        let mut module = Parser::parse(src).unwrap();
        let bundle = SymbolBundle::resolve(&module).unwrap();
        let fee = module.find_functions("demo", "fee")[0];
        assert!(is_atomic_candidate(&module, fee));
        let mut map = FunctionTransformMap::new();
        let patched = patch_function(&mut module, &bundle, &mut map, fee);
        module.replace_decl(fee, patched);

        assert_eq!(map.patched(fee), Some(patched));
        assert_eq!(module.resolve(fee), patched);
        assert!(!is_atomic_candidate(&module, patched));
        let f = module.function(patched).unwrap();
        assert_eq!(f.value_parameters.len(), 2);
        let amount = module.function(fee).unwrap().value_parameters[0];
        assert_eq!(map.argument(amount), Some(f.value_parameters[0]));
        assert_eq!(module.name_of(f.value_parameters[1]), "ctx");

        let body = f.body.clone().unwrap();
        let ExprKind::Return { target, value } = module.expr(body[0]).kind.clone() else {
            panic!("expected return");
        };
        assert_eq!(target, patched);
        let ExprKind::Binary { lhs, .. } = module.expr(value.unwrap()).kind.clone() else {
            panic!("expected binary");
        };
        assert!(matches!(module.expr(lhs).kind, ExprKind::GetValue(p) if p == f.value_parameters[0]));

        let printed = module.to_string();
        assert!(printed.contains("@AtomicFunction generated fun fee(amount: Int, ctx: STMContext): Int {"));
    }
}
