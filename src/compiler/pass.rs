//! The interface every SSA pass implements.

use std::sync::Arc;

use crate::{
    analysis::ssa::SsaFunction, compiler::context::CompilerContext,
    metadata::{program::Program, token::Token}, Result,
};

/// A transformation over the SSA form of one method at a time.
///
/// Passes are shared across the scheduler's worker threads, so
/// [`SsaPass::run_on_method`] takes `&self`; per-method state lives on the
/// stack of that call and cross-method state lives in the
/// [`CompilerContext`].
pub trait SsaPass: Send + Sync {
    /// Short unique name, used in events.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str {
        ""
    }

    /// Returns `false` to skip `method` this round.
    fn should_run(&self, _method: Token, _ctx: &CompilerContext) -> bool {
        true
    }

    /// Transforms one method body.
    ///
    /// # Arguments
    ///
    /// * `ssa` - The body, taken out of the context for the duration of the call.
    /// * `method` - The token of the method the body belongs to.
    /// * `ctx` - Shared interprocedural state.
    /// * `program` - The original program, for symbol resolution and callee bodies.
    ///
    /// # Returns
    ///
    /// `true` if the body changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is malformed. The scheduler reports the
    /// error and keeps the body as the pass left it.
    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: Token,
        ctx: &CompilerContext,
        program: &Arc<Program>,
    ) -> Result<bool>;

    /// Called once before each scheduler round.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot run.
    fn initialize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }

    /// Called once after each scheduler round.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass cannot complete.
    fn finalize(&mut self, _ctx: &CompilerContext) -> Result<()> {
        Ok(())
    }
}
