//! Pass scheduler for orchestrating SSA pass execution.
//!
//! The `PassScheduler` runs a phase of transforming passes to fixpoint,
//! normalizing after every round that changed something, and repeats the
//! pipeline until it is stable or the iteration limit is reached.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rayon::prelude::*;

use crate::{
    compiler::{context::CompilerContext, events::EventKind, pass::SsaPass},
    metadata::program::Program,
    Result,
};

/// Orchestrates SSA pass execution.
///
/// The scheduler runs two groups of passes:
///
/// 1. **Transform**: inlining passes that restructure method bodies
/// 2. **Normalize**: cleanup passes (DCE) run after each transforming round
///
/// The transform phase runs to fixpoint before the pipeline checks for
/// global stability.
#[allow(clippy::struct_field_names)]
pub struct PassScheduler {
    /// Maximum iterations for the entire pipeline.
    max_iterations: usize,
    /// Number of stable iterations before stopping.
    stable_iterations: usize,
    /// Maximum iterations for a single phase before moving on.
    max_phase_iterations: usize,
    /// Transforming passes (general inlining, class inlining).
    pub transform: Vec<Box<dyn SsaPass>>,
    /// Normalization passes run after each transforming round.
    pub normalize: Vec<Box<dyn SsaPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(10, 1, 8)
    }
}

impl PassScheduler {
    /// Creates a new scheduler with the specified iteration limits.
    ///
    /// # Arguments
    ///
    /// * `max_iterations` - Maximum iterations for the entire pipeline before stopping.
    /// * `stable_iterations` - Stop early if no changes for this many iterations.
    /// * `max_phase_iterations` - Maximum iterations for a single phase before moving on.
    #[must_use]
    pub fn new(
        max_iterations: usize,
        stable_iterations: usize,
        max_phase_iterations: usize,
    ) -> Self {
        Self {
            max_iterations,
            stable_iterations: stable_iterations.max(1),
            max_phase_iterations,
            transform: Vec::new(),
            normalize: Vec::new(),
        }
    }

    /// Adds a transforming pass.
    pub fn add_transform(&mut self, pass: Box<dyn SsaPass>) {
        self.transform.push(pass);
    }

    /// Adds a normalization pass.
    pub fn add_normalize(&mut self, pass: Box<dyn SsaPass>) {
        self.normalize.push(pass);
    }

    /// Runs normalization passes until no more changes occur.
    fn normalize_to_fixpoint(
        ctx: &CompilerContext,
        passes: &mut [Box<dyn SsaPass>],
        max_phase_iterations: usize,
        program: &Arc<Program>,
    ) -> Result<bool> {
        let mut any_changed = false;

        for _ in 0..max_phase_iterations {
            if !Self::run_passes_once(ctx, passes, program)? {
                break;
            }
            any_changed = true;
        }

        Ok(any_changed)
    }

    /// Runs a phase to fixpoint: execute phase passes, then normalize until stable.
    fn phase_to_fixpoint(
        ctx: &CompilerContext,
        phase_passes: &mut [Box<dyn SsaPass>],
        normalize_passes: &mut [Box<dyn SsaPass>],
        max_phase_iterations: usize,
        program: &Arc<Program>,
    ) -> Result<bool> {
        if phase_passes.is_empty() {
            return Ok(false);
        }

        let mut phase_changed = false;

        for _ in 0..max_phase_iterations {
            if !Self::run_passes_once(ctx, phase_passes, program)? {
                break;
            }

            phase_changed = true;

            // Cleanup can expose new candidates for the next round
            if !normalize_passes.is_empty() {
                Self::normalize_to_fixpoint(ctx, normalize_passes, max_phase_iterations, program)?;
            }
        }

        Ok(phase_changed)
    }

    /// Runs all passes once over all methods.
    ///
    /// Methods are processed in parallel. Each body is taken out of the
    /// context while a pass works on it, so no lock is held during the pass.
    /// A pass error is recorded as an event and the body is put back.
    fn run_passes_once(
        ctx: &CompilerContext,
        passes: &mut [Box<dyn SsaPass>],
        program: &Arc<Program>,
    ) -> Result<bool> {
        let any_changed = AtomicBool::new(false);

        for pass in passes.iter_mut() {
            pass.initialize(ctx)?;
        }

        let methods = ctx.all_methods();

        for pass in passes.iter() {
            methods.par_iter().for_each(|&method_token| {
                if !pass.should_run(method_token, ctx) {
                    return;
                }

                let Some(mut ssa) = ctx.take_ssa(method_token) else {
                    return;
                };

                let result = pass.run_on_method(&mut ssa, method_token, ctx, program);

                match result {
                    Ok(true) => {
                        ssa.recompute_uses();
                        any_changed.store(true, Ordering::Relaxed);
                        ctx.processed_methods.insert(method_token);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        ctx.events
                            .record(EventKind::Error)
                            .method(method_token)
                            .pass(pass.name())
                            .message(e.to_string());
                    }
                }

                ctx.set_ssa(method_token, ssa);
            });
        }

        for pass in passes.iter_mut() {
            pass.finalize(ctx)?;
        }

        Ok(any_changed.load(Ordering::Relaxed))
    }

    /// Runs the complete pipeline.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The compiler context.
    /// * `program` - Shared reference to the original program.
    ///
    /// # Returns
    ///
    /// The number of iterations completed. Events are accumulated in `ctx.events`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass fails to initialize or finalize.
    pub fn run_pipeline(&mut self, ctx: &CompilerContext, program: &Arc<Program>) -> Result<usize> {
        let mut stable_count = 0;
        let mut iterations = 0;
        let max_phase = self.max_phase_iterations;

        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;

            let mut iteration_changed = Self::phase_to_fixpoint(
                ctx,
                &mut self.transform,
                &mut self.normalize,
                max_phase,
                program,
            )?;

            // Normalization runs at least once even if nothing was transformed
            if iteration == 0 && !iteration_changed && !self.normalize.is_empty() {
                iteration_changed =
                    Self::normalize_to_fixpoint(ctx, &mut self.normalize, max_phase, program)?;
            }

            if iteration_changed {
                stable_count = 0;
            } else {
                stable_count += 1;
                if stable_count >= self.stable_iterations {
                    break;
                }
            }
        }

        Ok(iterations)
    }
}
