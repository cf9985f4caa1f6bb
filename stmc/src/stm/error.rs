use thiserror::Error;

/// Reasons for the STM lowering to abort.
///
/// Any of these aborts the lowering of the whole module. Absences that are
/// expected, such as a property without generated accessors, are not errors
/// and are only logged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoweringError {
    #[error("Couldn't find {class} runtime class in dependencies of module {module}")]
    MissingClass { class: String, module: String },
    #[error("Couldn't find {class}.{method}(...) runtime method in dependencies of module {module}")]
    MissingMethod {
        class: String,
        method: String,
        module: String,
    },
    #[error("Couldn't find {class}.{method}() context accessor in dependencies of module {module}")]
    MissingContextAccessor {
        class: String,
        method: String,
        module: String,
    },
    #[error("Expected {name}Default to be visible in module {module}")]
    MissingSearchFunction { name: String, module: String },
    #[error("Unexpected platform in IR code: Multiplatform/Common")]
    UnsupportedPlatform,
    #[error("Expected runAtomically to be visible in module {module}")]
    MissingRunAtomicallyOverload { module: String },
    #[error("Call of function {function} requires kotlinx.stm.STMContext to be present in scope")]
    MissingContext { function: String },
    #[error("Function {function} expected to be mapped to a transformed function")]
    UnmappedAtomicFunction { function: String },
    #[error("Unexpected call of accessor {accessor} for an unknown class")]
    UnknownReceiverClass { accessor: String },
    #[error("Accessor {function} of property {property} has an unexpected signature")]
    MalformedAccessor { function: String, property: String },
    #[error("Expected delegate field for property {property} to be defined and have a type")]
    MissingDelegateTypeArgument { property: String },
    #[error("Fake override {function} does not override any function")]
    FakeOverrideWithoutBase { function: String },
}
