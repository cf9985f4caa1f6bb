use crate::ir::deep_copy_expr;
use crate::ir::Call;
use crate::ir::DeclId;
use crate::ir::DeclKind;
use crate::ir::Module;
use crate::ir::Origin;
use crate::ir::SymbolRemapper;
use crate::ir::Type;
use crate::stm::builder;
use crate::stm::context::fetch_stm_context_or_null;
use crate::stm::context::FunctionStack;
use crate::stm::names;
use crate::stm::LoweringError;
use crate::stm::SymbolBundle;
use anyhow::Result;
use tracing::debug;
use tracing::warn;

/// Whether the wrapping of method bodies applies to `function`.
fn is_wrappable(module: &Module, function: DeclId) -> bool {
    let origin = module.decl(function).origin;
    !matches!(
        origin,
        Origin::SyntheticAccessor | Origin::PropertyAccessor | Origin::StmPlugin | Origin::Transactional
    )
}

/// Add `delegated private final field stm: STM = findXSTM()` as first member.
fn add_stm_field(module: &mut Module, bundle: &SymbolBundle, class: DeclId) -> DeclId {
    let field = builder::private_final_field(module, class, names::STM_FIELD_NAME, bundle.stm_type.clone());
    let typ = module
        .function(bundle.search)
        .map(|f| f.return_type.clone())
        .unwrap_or_else(|| bundle.stm_type.clone());
    let initializer = builder::call(module, Call::new(bundle.search), typ);
    builder::set_field_initializer(module, field, initializer);
    module.insert_member(class, 0, field);
    field
}

/// Give a fake override the body `return super<Base>.f(params)`.
fn materialize_fake_override(module: &mut Module, function: DeclId) -> Result<()> {
    let Some(f) = module.function(function).cloned() else {
        return Ok(());
    };
    let Some(base) = f.overridden.first().copied() else {
        return Err(LoweringError::FakeOverrideWithoutBase {
            function: module.fq_name(function),
        }
        .into());
    };
    let qualifier = module.decl(base).parent.filter(|p| module.class(*p).is_some());
    let mut call = Call::new(base);
    call.dispatch_receiver = f.dispatch_receiver.map(|r| builder::get_value(module, r));
    call.extension_receiver = f.extension_receiver.map(|r| builder::get_value(module, r));
    call.arguments = f
        .value_parameters
        .iter()
        .map(|p| builder::get_value(module, *p))
        .collect();
    call.super_qualifier = qualifier;
    let value = builder::call(module, call, f.return_type.clone());
    let ret = builder::return_expr(module, function, Some(value));
    if let Some(f) = module.function_mut(function) {
        f.body = Some(vec![ret]);
    }
    module.decl_mut(function).origin = Origin::Defined;
    debug!("Materialized fake override {}", module.fq_name(function));
    Ok(())
}

/// Replace the body of `function` by a call of `runAtomically` on the STM
/// handle that runs the old body in a closure.
///
/// Functions that the lowering produced itself are left alone.
pub fn wrap_function_into_transaction(
    module: &mut Module,
    bundle: &SymbolBundle,
    function: DeclId,
    stm_field: DeclId,
) -> Result<()> {
    if module.decl(function).origin.is_stm_generated() {
        debug!("Not wrapping {} again", module.fq_name(function));
        return Ok(());
    }
    let Some(f) = module.function(function).cloned() else {
        return Ok(());
    };
    let Some(body) = f.body.clone() else {
        return Ok(());
    };
    let Some(this) = f.dispatch_receiver else {
        return Ok(());
    };
    let ret = f.return_type.clone();
    let lambda = builder::atomic_lambda(module, function, &bundle.context_type, &ret, &body);

    let mut stack = FunctionStack::new();
    for parent in module.parents(function).into_iter().rev() {
        if module.function(parent).is_some() {
            stack.push(parent);
        }
    }
    let context = match fetch_stm_context_or_null(module, &stack) {
        Some(context) => builder::get_value(module, context),
        None => {
            let typ = module
                .function(bundle.run_atomically)
                .and_then(|r| r.value_parameters.first().copied())
                .and_then(|p| module.decl(p).value_type().cloned())
                .unwrap_or_else(|| bundle.context_type.make_nullable());
            builder::null_const(module, typ)
        }
    };
    let mut call = Call::new(bundle.run_atomically);
    call.dispatch_receiver = Some(builder::get_field(module, this, stm_field));
    call.arguments = vec![context, lambda];
    call.type_arguments = vec![ret.clone()];
    let value = builder::call(module, call, ret);
    let statement = builder::return_expr(module, function, Some(value));
    if let Some(f) = module.function_mut(function) {
        f.body = Some(vec![statement]);
    }
    module.decl_mut(function).origin = Origin::Transactional;
    debug!("Wrapped {} into a transaction", module.fq_name(function));
    Ok(())
}

/// Create `<name>_delegate: UniversalDelegate<T> = this.#stm.wrap<T>(init)`.
fn add_delegate_field(
    module: &mut Module,
    bundle: &SymbolBundle,
    class: DeclId,
    name: &str,
    backing_field: DeclId,
    stm_field: DeclId,
) -> Result<DeclId> {
    let Some(field) = module.field(backing_field).cloned() else {
        return Err(LoweringError::MissingDelegateTypeArgument {
            property: name.to_string(),
        }
        .into());
    };
    let delegate_type = bundle.delegate_type(module, &field.typ);
    let delegate = builder::private_final_field(module, class, &names::delegate_name(name), delegate_type.clone());
    let init = match field.initializer {
        Some(initializer) => {
            let mut remapper = SymbolRemapper::new();
            deep_copy_expr(module, initializer, &mut remapper, delegate)
        }
        None => builder::null_const(module, field.typ.clone()),
    };
    let this = match module.class(class) {
        Some(c) => c.this_receiver,
        None => return Ok(delegate),
    };
    let mut call = Call::new(bundle.wrap);
    call.dispatch_receiver = Some(builder::get_field(module, this, stm_field));
    call.arguments = vec![init];
    call.type_arguments = vec![field.typ.clone()];
    let initializer = builder::call(module, call, delegate_type);
    builder::set_field_initializer(module, delegate, initializer);
    Ok(delegate)
}

/// Type argument for `getVar`/`setVar`: the value type of the delegate.
fn delegate_value_type(module: &Module, delegate: DeclId, property: &str) -> Result<Type> {
    let typ = module.decl(delegate).value_type();
    match typ.and_then(|t| t.arguments().first()) {
        Some(argument) => Ok(argument.clone()),
        None => Err(LoweringError::MissingDelegateTypeArgument {
            property: property.to_string(),
        }
        .into()),
    }
}

/// Accessor parameters: dispatch receiver and the given number of value
/// parameters.
fn accessor_parameters(module: &Module, accessor: DeclId, property: &str, count: usize) -> Result<(DeclId, Vec<DeclId>)> {
    let malformed = || LoweringError::MalformedAccessor {
        function: module.name_of(accessor).to_string(),
        property: property.to_string(),
    };
    let f = module.function(accessor).ok_or_else(malformed)?;
    let this = f.dispatch_receiver.ok_or_else(malformed)?;
    if f.value_parameters.len() < count {
        return Err(malformed().into());
    }
    Ok((this, f.value_parameters[..count].to_vec()))
}

/// Body `return this.#stm.getVar<T>(ctx, this.#n_delegate)`.
fn add_get_function(
    module: &mut Module,
    bundle: &SymbolBundle,
    getter: DeclId,
    property: &str,
    delegate: DeclId,
    stm_field: DeclId,
) -> Result<()> {
    let (this, parameters) = accessor_parameters(module, getter, property, 1)?;
    let value_type = delegate_value_type(module, delegate, property)?;
    let ret = module
        .function(getter)
        .map(|f| f.return_type.clone())
        .unwrap_or(value_type.clone());
    let mut call = Call::new(bundle.get_var);
    call.dispatch_receiver = Some(builder::get_field(module, this, stm_field));
    call.arguments = vec![
        builder::get_value(module, parameters[0]),
        builder::get_field(module, this, delegate),
    ];
    call.type_arguments = vec![value_type];
    let value = builder::call(module, call, ret);
    let statement = builder::return_expr(module, getter, Some(value));
    if let Some(f) = module.function_mut(getter) {
        f.body = Some(vec![statement]);
    }
    Ok(())
}

/// Body `this.#stm.setVar<T>(ctx, this.#n_delegate, value)`.
fn add_set_function(
    module: &mut Module,
    bundle: &SymbolBundle,
    setter: DeclId,
    property: &str,
    delegate: DeclId,
    stm_field: DeclId,
) -> Result<()> {
    let (this, parameters) = accessor_parameters(module, setter, property, 2)?;
    let value_type = module
        .decl(parameters[1])
        .value_type()
        .cloned()
        .unwrap_or(Type::Unit);
    let mut call = Call::new(bundle.set_var);
    call.dispatch_receiver = Some(builder::get_field(module, this, stm_field));
    call.arguments = vec![
        builder::get_value(module, parameters[0]),
        builder::get_field(module, this, delegate),
        builder::get_value(module, parameters[1]),
    ];
    call.type_arguments = vec![value_type];
    let statement = builder::call(module, call, Type::Unit);
    if let Some(f) = module.function_mut(setter) {
        f.body = Some(vec![statement]);
    }
    Ok(())
}

/// Replace the property or field `old` of `class` by a delegate field and
/// give the generated accessors their bodies.
///
/// Nothing happens if the class has neither a getter nor a setter for the
/// property.
pub fn add_delegate_and_accessor_functions(
    module: &mut Module,
    bundle: &SymbolBundle,
    class: DeclId,
    old: DeclId,
    backing_field: DeclId,
    stm_field: DeclId,
) -> Result<bool> {
    let name = module.name_of(old).to_string();
    let getter = module.find_method(class, &names::getter_name(&name));
    let setter = module.find_method(class, &names::setter_name(&name));
    if getter.is_none() && setter.is_none() {
        warn!(
            "Skipping {}: no accessors {} or {} found",
            module.fq_name(old),
            names::getter_name(&name),
            names::setter_name(&name)
        );
        return Ok(false);
    }
    let delegate = add_delegate_field(module, bundle, class, &name, backing_field, stm_field)?;
    if let Some(getter) = getter {
        add_get_function(module, bundle, getter, &name, delegate, stm_field)?;
    }
    if let Some(setter) = setter {
        add_set_function(module, bundle, setter, &name, delegate, stm_field)?;
    }
    module.replace_member(class, old, delegate);
    debug!("Delegated {} to {}", module.fq_name(old), module.name_of(delegate));
    Ok(true)
}

/// Whether `member` is an STM handle field added by [patch_shared_class].
fn is_stm_handle(module: &Module, member: DeclId) -> bool {
    module.field(member).is_some()
        && module.decl(member).origin == Origin::DelegatedMember
        && names::is_stm_field_name(module.name_of(member))
}

/// Lower a shared class.
///
/// Returns false if the class already has an STM handle field, which means
/// that it was lowered before. A user property named `stm` does not count;
/// it is kept as is.
pub fn patch_shared_class(module: &mut Module, bundle: &SymbolBundle, class: DeclId) -> Result<bool> {
    let members = module.members(class);
    if members.iter().any(|m| is_stm_handle(module, *m)) {
        debug!("Class {} already has an STM handle", module.fq_name(class));
        return Ok(false);
    }
    let stm_field = add_stm_field(module, bundle, class);

    for member in members.iter().copied() {
        if module.function(member).is_none() || !is_wrappable(module, member) {
            continue;
        }
        if module.decl(member).origin == Origin::FakeOverride {
            materialize_fake_override(module, member)?;
        }
        wrap_function_into_transaction(module, bundle, member, stm_field)?;
    }

    for member in members {
        let name = module.name_of(member).to_string();
        if names::is_stm_field_name(&name) || names::is_sharable_name(&name) {
            continue;
        }
        let backing_field = match &module.decl(member).kind {
            DeclKind::Property(property) => property.backing_field,
            DeclKind::Field(_) => Some(member),
            _ => None,
        };
        if let Some(backing_field) = backing_field {
            add_delegate_and_accessor_functions(module, bundle, class, member, backing_field, stm_field)?;
        }
    }
    Ok(true)
}
