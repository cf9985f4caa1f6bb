//! Lowering of STM-shared classes and atomic functions.
//!
//! The lowering runs in four steps:
//!
//! 1. Resolve the runtime declarations ([SymbolBundle]).
//! 2. Patch every class annotated with `@SharedMutable`: add the STM handle
//!    field, wrap method bodies into `runAtomically` and replace stored
//!    properties by delegate fields ([patch_shared_class]).
//! 3. Give every `@AtomicFunction` an extra trailing context parameter
//!    ([patch_function]).
//! 4. Rewrite call sites so that they call the generated accessors and the
//!    patched functions ([CallPatcher]).
//!
//! Steps 2 and 3 have to finish before step 4, since the call sites refer to
//! the generated declarations.

mod builder;
mod call_patcher;
mod class_patcher;
mod context;
mod error;
mod function_patcher;
pub mod names;
mod symbols;

pub use call_patcher::CallPatcher;
pub use class_patcher::add_delegate_and_accessor_functions;
pub use class_patcher::patch_shared_class;
pub use class_patcher::wrap_function_into_transaction;
pub use context::context_parameter;
pub use context::fetch_stm_context;
pub use context::fetch_stm_context_or_null;
pub use context::FunctionStack;
pub use error::LoweringError;
pub use function_patcher::is_atomic_candidate;
pub use function_patcher::patch_function;
pub use function_patcher::FunctionTransformMap;
pub use symbols::find_run_atomically_overload;
pub use symbols::find_search_function;
pub use symbols::SymbolBundle;
