//! Passes that transform a [Module].
//!
//! A pass either works on the module as a whole or is built from
//! [Rewrite]s, which are matched against every declaration that is defined
//! in the module (declarations in `extern` packages are never rewritten).

use crate::ir::DeclId;
use crate::ir::Module;
use anyhow::Result;
use tracing::debug;

mod lower_stm;
mod resolve_accessors;

pub use lower_stm::LowerStm;
pub use resolve_accessors::ResolveStmAccessors;

/// Whether a rewrite changed the IR.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewriteResult {
    Changed,
    Unchanged,
}

impl RewriteResult {
    pub fn is_changed(&self) -> bool {
        matches!(self, RewriteResult::Changed)
    }
    /// Combine the results of two steps.
    pub fn or(self, other: RewriteResult) -> RewriteResult {
        if self.is_changed() || other.is_changed() {
            RewriteResult::Changed
        } else {
            RewriteResult::Unchanged
        }
    }
}

pub trait Rewrite {
    /// The name of the rewrite; is used for logging.
    fn name(&self) -> &'static str;
    /// Returns true if the rewrite can be applied to the given declaration.
    ///
    /// This method is not allowed to mutate the IR.
    fn is_match(&self, module: &Module, decl: DeclId) -> Result<bool>;
    /// Applies the rewrite to the given declaration.
    fn rewrite(&self, module: &mut Module, decl: DeclId) -> Result<RewriteResult>;
}

/// Top-level declarations and class members defined in the module.
fn candidates(module: &Module) -> Vec<DeclId> {
    let mut out = vec![];
    for package in module.packages() {
        if module.is_external(*package) {
            continue;
        }
        for member in module.members(*package) {
            out.push(member);
            if module.class(member).is_some() {
                out.extend(module.members(member));
            }
        }
    }
    out
}

/// Apply each rewrite to each matching declaration.
///
/// The declarations are collected before rewriting, so declarations that a
/// rewrite adds are not visited in the same sweep.
pub fn apply_rewrites(module: &mut Module, rewrites: &[&dyn Rewrite]) -> Result<RewriteResult> {
    let mut result = RewriteResult::Unchanged;
    for decl in candidates(module) {
        for rewrite in rewrites {
            debug!("Matching {} with {}", module.fq_name(decl), rewrite.name());
            if rewrite.is_match(module, decl)? {
                debug!("--> Success");
                let changed = rewrite.rewrite(module, decl)?;
                if changed.is_changed() {
                    debug!("----> Changed");
                }
                result = result.or(changed);
            }
        }
    }
    Ok(result)
}

/// A pass is a transformation that can be applied to the IR.
pub trait Pass {
    const NAME: &'static str;
    fn convert(module: &mut Module) -> Result<RewriteResult>;
}
