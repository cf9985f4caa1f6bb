use crate::ir::DeclId;
use crate::ir::Module;
use crate::ir::Type;
use crate::stm::names;
use crate::stm::LoweringError;
use anyhow::Result;
use tracing::debug;

/// Runtime declarations that the generated code calls into.
///
/// The bundle is resolved once per module. Construction fails if any of the
/// declarations is missing, so a bundle is never partially populated.
#[derive(Clone, Debug)]
pub struct SymbolBundle {
    /// The `STM` interface.
    pub stm: DeclId,
    pub stm_type: Type,
    /// Class of the transaction context, taken from the return type of
    /// `STM.getContext`.
    pub context: DeclId,
    pub context_type: Type,
    pub delegate: DeclId,
    pub wrap: DeclId,
    pub get_var: DeclId,
    pub set_var: DeclId,
    pub run_atomically: DeclId,
    /// Function that returns the STM handle on the target platform.
    pub search: DeclId,
}

fn find_class(module: &Module, name: &str) -> Result<DeclId> {
    match module.find_class(names::STM_PACKAGE, name) {
        Some(class) => Ok(class),
        None => Err(LoweringError::MissingClass {
            class: name.to_string(),
            module: module.name().to_string(),
        }
        .into()),
    }
}

fn find_method(module: &Module, class: DeclId, method: &str) -> Result<DeclId> {
    match module.find_method(class, method) {
        Some(method) => Ok(method),
        None => Err(LoweringError::MissingMethod {
            class: module.name_of(class).to_string(),
            method: method.to_string(),
            module: module.name().to_string(),
        }
        .into()),
    }
}

fn find_context(module: &Module, stm: DeclId) -> Result<(DeclId, Type)> {
    let missing = || LoweringError::MissingContextAccessor {
        class: module.name_of(stm).to_string(),
        method: names::GET_CONTEXT.to_string(),
        module: module.name().to_string(),
    };
    let accessor = module.find_method(stm, names::GET_CONTEXT).ok_or_else(missing)?;
    let typ = module
        .function(accessor)
        .map(|f| f.return_type.make_not_null())
        .ok_or_else(missing)?;
    let class = typ.class_or_none().ok_or_else(missing)?;
    Ok((class, typ))
}

/// Find the platform specific search function and fall back to the
/// `Default` variant.
pub fn find_search_function(module: &Module) -> Result<DeclId> {
    let name = names::search_function_name(module.target())?;
    let default = format!("{name}{}", names::DEFAULT_SUFFIX);
    let found = module
        .find_functions(names::STM_PACKAGE, name)
        .into_iter()
        .chain(module.find_functions(names::STM_PACKAGE, &default))
        .next();
    match found {
        Some(function) => Ok(function),
        None => Err(LoweringError::MissingSearchFunction {
            name: name.to_string(),
            module: module.name().to_string(),
        }
        .into()),
    }
}

/// The top-level `runAtomically` overload that takes the STM handle as first
/// argument.
pub fn find_run_atomically_overload(module: &Module) -> Result<DeclId> {
    let found = module
        .find_functions(names::STM_PACKAGE, names::RUN_ATOMICALLY)
        .into_iter()
        .find(|f| module.function(*f).is_some_and(|f| f.value_parameters.len() == 2));
    match found {
        Some(function) => Ok(function),
        None => Err(LoweringError::MissingRunAtomicallyOverload {
            module: module.name().to_string(),
        }
        .into()),
    }
}

impl SymbolBundle {
    pub fn resolve(module: &Module) -> Result<SymbolBundle> {
        let stm = find_class(module, names::STM_INTERFACE)?;
        let delegate = find_class(module, names::UNIVERSAL_DELEGATE)?;
        let (context, context_type) = find_context(module, stm)?;
        let bundle = SymbolBundle {
            stm,
            stm_type: module.class_type(stm),
            context,
            context_type,
            delegate,
            wrap: find_method(module, stm, names::WRAP)?,
            get_var: find_method(module, stm, names::GET_VAR)?,
            set_var: find_method(module, stm, names::SET_VAR)?,
            run_atomically: find_method(module, stm, names::RUN_ATOMICALLY)?,
            search: find_search_function(module)?,
        };
        debug!(
            "Resolved STM runtime for module {} (search function {})",
            module.name(),
            module.name_of(bundle.search)
        );
        Ok(bundle)
    }
    /// Type of a delegate cell holding values of type `typ`.
    pub fn delegate_type(&self, module: &Module, typ: &Type) -> Type {
        Type::class(self.delegate, module.name_of(self.delegate), vec![typ.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Platform;
    use crate::parser::Parser;
    use indoc::indoc;

    const RUNTIME: &str = indoc! {"
    module @app target js {
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
        fun findJsSTMDefault(): STM
      }
    }"};

    #[test]
    fn test_resolve() {
        let module = Parser::parse(RUNTIME).unwrap();
        let bundle = SymbolBundle::resolve(&module).unwrap();
        assert_eq!(module.fq_name(bundle.wrap), "kotlinx.stm.STM.wrap");
        assert_eq!(module.fq_name(bundle.context), "kotlinx.stm.STMContext");
        assert_eq!(bundle.context_type.to_string(), "STMContext");
        assert_eq!(module.name_of(bundle.search), "findJsSTMDefault");
        let typ = bundle.delegate_type(&module, &Type::Int);
        assert_eq!(typ.to_string(), "UniversalDelegate<Int>");
    }

    #[test]
    fn test_missing_search_function() {
        let mut module = Parser::parse(RUNTIME).unwrap();
        module.set_target(Platform::Native);
        let err = SymbolBundle::resolve(&module).unwrap_err();
        let err = err.downcast_ref::<LoweringError>().unwrap();
        assert_eq!(
            err.to_string(),
            "Expected findNativeSTMDefault to be visible in module app"
        );

        module.set_target(Platform::Common);
        let err = SymbolBundle::resolve(&module).unwrap_err();
        assert_eq!(
            err.downcast_ref::<LoweringError>(),
            Some(&LoweringError::UnsupportedPlatform)
        );
    }

    #[test]
    fn test_missing_overload() {
        let module = Parser::parse(RUNTIME).unwrap();
        let err = find_run_atomically_overload(&module).unwrap_err();
        assert_eq!(err.to_string(), "Expected runAtomically to be visible in module app");
    }
}
