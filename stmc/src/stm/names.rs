//! Names of the runtime declarations and of the generated members.
//!
//! The accessor naming has to agree with the resolution pass that creates the
//! `getX`/`setX` declarations ahead of the lowering (see
//! [crate::convert::ResolveStmAccessors]).

use crate::ir::Platform;
use crate::stm::LoweringError;

pub const STM_PACKAGE: &str = "kotlinx.stm";
pub const STM_INTERFACE: &str = "STM";
pub const STM_CONTEXT: &str = "STMContext";
pub const UNIVERSAL_DELEGATE: &str = "UniversalDelegate";

pub const WRAP: &str = "wrap";
pub const GET_VAR: &str = "getVar";
pub const SET_VAR: &str = "setVar";
pub const RUN_ATOMICALLY: &str = "runAtomically";
pub const GET_CONTEXT: &str = "getContext";

pub const JAVA_STM_SEARCH: &str = "findJavaSTM";
pub const JS_STM_SEARCH: &str = "findJsSTM";
pub const NATIVE_STM_SEARCH: &str = "findNativeSTM";
pub const DEFAULT_SUFFIX: &str = "Default";

pub const SHARED_MUTABLE: &str = "SharedMutable";
pub const ATOMIC_FUNCTION: &str = "AtomicFunction";

pub const STM_FIELD_NAME: &str = "stm";
pub const SHARABLE_SUFFIX: &str = "_delegate";
pub const ATOMIC_LAMBDA_SUFFIX: &str = "_atomicLambda";
pub const CONTEXT_PARAMETER: &str = "ctx";

/// Fully qualified name of the context class.
pub fn context_fq_name() -> String {
    format!("{STM_PACKAGE}.{STM_CONTEXT}")
}

pub fn run_atomically_fq_name() -> String {
    format!("{STM_PACKAGE}.{RUN_ATOMICALLY}")
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `n` becomes `getN`.
pub fn getter_name(property: &str) -> String {
    format!("get{}", capitalize(property))
}

/// `n` becomes `setN`.
pub fn setter_name(property: &str) -> String {
    format!("set{}", capitalize(property))
}

pub fn delegate_name(property: &str) -> String {
    format!("{property}{SHARABLE_SUFFIX}")
}

pub fn atomic_lambda_name(function: &str) -> String {
    format!("{function}{ATOMIC_LAMBDA_SUFFIX}")
}

/// Whether `name` is the name of the STM handle field.
pub fn is_stm_field_name(name: &str) -> bool {
    name == STM_FIELD_NAME
}

/// Whether `name` is the name of a generated delegate field.
pub fn is_sharable_name(name: &str) -> bool {
    name.ends_with(SHARABLE_SUFFIX)
}

/// Name of the function that returns the STM handle on `platform`.
pub fn search_function_name(platform: Platform) -> Result<&'static str, LoweringError> {
    match platform {
        Platform::Jvm => Ok(JAVA_STM_SEARCH),
        Platform::Js => Ok(JS_STM_SEARCH),
        Platform::Native => Ok(NATIVE_STM_SEARCH),
        Platform::Common | Platform::Multiplatform => Err(LoweringError::UnsupportedPlatform),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessor_names() {
        assert_eq!(getter_name("n"), "getN");
        assert_eq!(setter_name("balance"), "setBalance");
        assert_eq!(getter_name("éte"), "getÉte");
        assert_eq!(delegate_name("n"), "n_delegate");
        assert_eq!(atomic_lambda_name("inc"), "inc_atomicLambda");
    }

    #[test]
    fn test_predicates() {
        assert!(is_stm_field_name("stm"));
        assert!(!is_stm_field_name("stmCount"));
        assert!(is_sharable_name("n_delegate"));
        assert!(!is_sharable_name("n"));
        assert!(!is_sharable_name(STM_FIELD_NAME));
    }

    #[test]
    fn test_search_function_name() {
        assert_eq!(search_function_name(Platform::Js).unwrap(), "findJsSTM");
        assert!(search_function_name(Platform::Common).is_err());
    }
}
