//! Intermediate representation (IR) for the compiler.
//!
//! The IR is a typed, symbol-resolved declaration tree stored in an arena
//! ([Module]). Declarations and expressions refer to each other via [DeclId]
//! and [ExprId].

mod copy;
mod decl;
mod display;
mod expr;
mod id;
mod module;
mod typ;

pub use copy::deep_copy_body;
pub use copy::deep_copy_expr;
pub use copy::find_parent;
pub use copy::SymbolRemapper;
pub use decl::Accessor;
pub use decl::AccessorKind;
pub use decl::Class;
pub use decl::DeclKind;
pub use decl::Declaration;
pub use decl::Field;
pub use decl::Function;
pub use decl::Origin;
pub use decl::Package;
pub use decl::Parameter;
pub use decl::ParameterKind;
pub use decl::Property;
pub use decl::Variable;
pub use decl::Visibility;
pub use display::ExprDisplay;
pub use expr::BinOp;
pub use expr::Call;
pub use expr::Const;
pub use expr::ExprKind;
pub use expr::Expression;
pub use id::DeclId;
pub use id::ExprId;
pub use module::Module;
pub use module::Platform;
pub use typ::Type;

pub fn spaces(indent: i32) -> String {
    "  ".repeat(indent as usize)
}
