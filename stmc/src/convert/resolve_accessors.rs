use crate::convert::apply_rewrites;
use crate::convert::Pass;
use crate::convert::Rewrite;
use crate::convert::RewriteResult;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::Declaration;
use crate::ir::Function;
use crate::ir::Module;
use crate::ir::Origin;
use crate::ir::ParameterKind;
use crate::ir::Type;
use crate::ir::Visibility;
use crate::stm::names;
use crate::stm::LoweringError;
use anyhow::Result;
use tracing::debug;

/// Declare `getX`/`setX` for the properties of shared classes.
///
/// For example, this rewrites:
/// ```text
/// @SharedMutable class Counter {
///   var n: Int = 0
/// }
/// ```
/// to
/// ```text
/// @SharedMutable class Counter {
///   var n: Int = 0
///   synthetic fun getN(ctx: STMContext): Int
///   synthetic fun setN(ctx: STMContext, value: Int): Unit
/// }
/// ```
/// The declarations get their bodies during `--lower-stm`.
struct AccessorStubs;

fn context_type(module: &Module) -> Result<Type> {
    match module.find_class(names::STM_PACKAGE, names::STM_CONTEXT) {
        Some(class) => Ok(module.class_type(class)),
        None => Err(LoweringError::MissingClass {
            class: names::STM_CONTEXT.to_string(),
            module: module.name().to_string(),
        }
        .into()),
    }
}

/// Declare an accessor stub without body; the stub is not yet a member.
fn accessor_stub(
    module: &mut Module,
    class: DeclId,
    name: &str,
    context: &Type,
    value: Option<&Type>,
    ret: Type,
) -> DeclId {
    let function = Function::new(Visibility::Public, ret);
    let decl = Declaration::new(name, Some(class), Origin::SyntheticAccessor, DeclKind::Function(function));
    let id = module.add_decl(decl);
    let this = module.new_parameter(id, "this", module.class_type(class), ParameterKind::DispatchReceiver, 0);
    let mut parameters = vec![module.new_parameter(
        id,
        names::CONTEXT_PARAMETER,
        context.clone(),
        ParameterKind::Value,
        0,
    )];
    if let Some(value) = value {
        parameters.push(module.new_parameter(id, "value", value.clone(), ParameterKind::Value, 1));
    }
    if let Some(f) = module.function_mut(id) {
        f.dispatch_receiver = Some(this);
        f.value_parameters = parameters;
    }
    id
}

impl Rewrite for AccessorStubs {
    fn name(&self) -> &'static str {
        "resolve_accessors::AccessorStubs"
    }
    fn is_match(&self, module: &Module, decl: DeclId) -> Result<bool> {
        Ok(module.class_has_annotation(decl, names::SHARED_MUTABLE))
    }
    fn rewrite(&self, module: &mut Module, class: DeclId) -> Result<RewriteResult> {
        let context = context_type(module)?;
        let mut result = RewriteResult::Unchanged;
        for member in module.members(class) {
            let Some(property) = module.property(member).cloned() else {
                continue;
            };
            let name = module.name_of(member).to_string();
            if property.visibility == Visibility::Private
                || names::is_stm_field_name(&name)
                || names::is_sharable_name(&name)
            {
                continue;
            }
            let mut index = module
                .members(class)
                .iter()
                .position(|m| *m == member)
                .unwrap_or(0);
            let getter = names::getter_name(&name);
            if module.find_method(class, &getter).is_none() {
                let stub = accessor_stub(module, class, &getter, &context, None, property.typ.clone());
                index += 1;
                module.insert_member(class, index, stub);
                debug!("Declared {getter} for {}", module.fq_name(member));
                result = RewriteResult::Changed;
            }
            let setter = names::setter_name(&name);
            if property.is_var && module.find_method(class, &setter).is_none() {
                let stub = accessor_stub(module, class, &setter, &context, Some(&property.typ), Type::Unit);
                index += 1;
                module.insert_member(class, index, stub);
                debug!("Declared {setter} for {}", module.fq_name(member));
                result = RewriteResult::Changed;
            }
        }
        Ok(result)
    }
}

/// Declare the accessors that `--lower-stm` expects for shared classes.
pub struct ResolveStmAccessors;

impl Pass for ResolveStmAccessors {
    const NAME: &'static str = "resolve-stm-accessors";
    fn convert(module: &mut Module) -> Result<RewriteResult> {
        apply_rewrites(module, &[&AccessorStubs])
    }
}
