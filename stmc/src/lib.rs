//! stmc lowers software-transactional-memory annotations to calls of an STM
//! runtime.
//!
//! The input is a typed, symbol-resolved IR module (see [ir]) in which
//! classes can be marked `@SharedMutable` and functions `@AtomicFunction`.
//! The passes in [convert] rewrite such modules so that:
//!
//! - every shared class holds an STM handle and runs each of its methods
//!   inside `runAtomically`,
//! - every stored property of a shared class lives in a delegate cell that is
//!   only read and written through `getVar`/`setVar`,
//! - every atomic function takes the transaction context as extra trailing
//!   parameter, and every call site passes the context that is in scope.
//!
//! The IR has a textual form that is read by [parser::Parser] and printed via
//! `Display`, so a typical round trip is
//!
//! ```text
//! stmc --resolve-stm-accessors --lower-stm counter.ir
//! ```
//!
//! The [interp] module evaluates lowered modules against an in-memory stub of
//! the runtime; it is what the tests use to check that lowering preserves
//! behavior.

pub mod convert;
pub mod interp;
pub mod ir;
pub mod parser;
pub mod stm;
#[cfg(feature = "test-utils")]
pub mod tester;
mod transform;

pub use transform::default_arguments;
pub use transform::init_subscriber;
pub use transform::transform;
pub use transform::DefaultTransformDispatch;
pub use transform::Passes;
pub use transform::SinglePass;
pub use transform::TransformDispatch;
pub use transform::TransformOptions;
