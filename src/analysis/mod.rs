//! Program analysis infrastructure.
//!
//! Hosts the SSA intermediate representation the optimizer transforms,
//! together with the control flow and dominance views derived from it.
//!
//! # Usage
//!
//! ```rust
//! use dotinline::analysis::ssa::{DominatorTree, SsaCfg, SsaFunctionBuilder};
//!
//! let ssa = SsaFunctionBuilder::new(1).build_with(|f| {
//!     let cond = f.arg(0);
//!     f.block(0, |b| b.branch(cond, 1, 2));
//!     f.block(1, |b| b.ret());
//!     f.block(2, |b| b.ret());
//! });
//!
//! let cfg = SsaCfg::from_ssa(&ssa);
//! let dominators = DominatorTree::compute(&cfg);
//! assert!(dominators.dominates(0, 2));
//! ```

pub mod ssa;

// Re-export primary types at module level
pub use ssa::{
    DominatorTree, SsaBlock, SsaCfg, SsaFunction, SsaFunctionBuilder, SsaInstruction, SsaOp,
    SsaVarId,
};
