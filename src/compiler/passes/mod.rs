//! Built-in SSA passes.
//!
//! Each pass operates on SSA form and records what it changed in the
//! [`EventLog`](crate::compiler::EventLog) of the shared context.
//!
//! | Pass | Group | Description |
//! |------|-------|-------------|
//! | [`ClassInliningPass`] | transform | Scalar-replaces instances that never escape their method |
//! | [`InliningPass`] | transform | Inlines small methods at their call sites (off by default) |
//! | [`DeadCodeEliminationPass`] | normalize | Folds branches, clears unreachable blocks, removes dead definitions |
//!
//! The [`PassScheduler`](crate::compiler::PassScheduler) runs the transform
//! group to a fixpoint and normalizes after every round that changed
//! something.

pub mod classinliner;
mod deadcode;
mod inlining;

pub use classinliner::ClassInliningPass;
pub use deadcode::DeadCodeEliminationPass;
pub use inlining::{check_admissible, inline_call_site, is_admissible, InlinedCall, InliningPass};
