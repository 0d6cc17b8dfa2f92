//! Compiler infrastructure for SSA-based code transformations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler Pipeline                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  Compiler                    Facade: Program in, bodies out      │
//! │                                                                  │
//! │  CompilerContext             Shared interprocedural state        │
//! │    ├─ SSA functions          (working copy of every body)        │
//! │    ├─ Method summaries       (computed from the original bodies) │
//! │    ├─ Class/field facts      (static initialization, singletons) │
//! │    ├─ Policy sets            (no_inline, no_class_inline, ...)   │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  PassScheduler               Fixpoint execution over rayon       │
//! │    ├─ Transform              (class inlining, general inlining)  │
//! │    └─ Normalize              (dead code elimination)             │
//! │                                                                  │
//! │  SsaPass trait               Interface for all passes            │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dotinline::prelude::*;
//!
//! # fn example(program: Program) -> dotinline::Result<()> {
//! let program = Arc::new(program);
//! let result = Compiler::new(CompilerConfig::default()).compile(&program)?;
//! println!("{}", result.events().summary());
//! # Ok(())
//! # }
//! ```

mod config;
mod context;
mod events;
mod pass;
pub mod passes;
mod scheduler;
mod summary;

use std::{collections::BTreeMap, sync::Arc};

pub use config::{ClassInliningConfig, CompilerConfig};
pub use context::CompilerContext;
pub use events::{DerivedStats, Event, EventKind, EventLog};
pub use pass::SsaPass;
pub use passes::{ClassInliningPass, DeadCodeEliminationPass, InliningPass};
pub use scheduler::PassScheduler;
pub use summary::{
    analyze_parameter, ClassInitializerInfo, FieldFacts, MethodPurity, MethodSummary,
    ParameterUsage, ReturnInfo, TrivialInitializer, UsageCategory, UsageDetails,
};

use crate::{
    analysis::ssa::SsaFunction,
    metadata::{program::Program, token::Token},
    Result,
};

/// Runs the configured pipeline over a whole program.
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: CompilerConfig,
}

impl Compiler {
    /// Creates a compiler with `config`.
    #[must_use]
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Builds the scheduler for the configured passes.
    #[must_use]
    pub fn scheduler(&self) -> PassScheduler {
        let mut scheduler = PassScheduler::new(
            self.config.max_iterations,
            self.config.stable_iterations,
            self.config.class_inlining.max_rounds,
        );
        if self.config.enable_class_inlining {
            scheduler.add_transform(Box::new(ClassInliningPass::with_config(
                self.config.class_inlining.clone(),
            )));
        }
        if self.config.enable_inlining {
            scheduler.add_transform(Box::new(InliningPass::with_threshold(
                self.config.inline_threshold,
            )));
        }
        if self.config.enable_cleanup {
            scheduler.add_normalize(Box::new(DeadCodeEliminationPass::new()));
        }
        scheduler
    }

    /// Optimizes every method body of `program`.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass fails to initialize or finalize. Errors
    /// in individual methods are recorded as events instead.
    pub fn compile(&self, program: &Arc<Program>) -> Result<CompilationResult> {
        self.compile_with(CompilerContext::from_program(program), program)
    }

    /// Like [`compile`](Self::compile), with a context prepared by the
    /// caller, for example with policy sets filled in.
    ///
    /// # Errors
    ///
    /// Returns an error if a pass fails to initialize or finalize.
    pub fn compile_with(
        &self,
        ctx: CompilerContext,
        program: &Arc<Program>,
    ) -> Result<CompilationResult> {
        if ctx.method_count() == 0 {
            ctx.load_program(program);
        }
        let mut scheduler = self.scheduler();
        let iterations = scheduler.run_pipeline(&ctx, program)?;

        log::info!(
            "compiled {} methods in {} iterations ({:?}): {}",
            ctx.method_count(),
            iterations,
            ctx.elapsed(),
            ctx.events.summary()
        );
        Ok(CompilationResult {
            context: ctx,
            iterations,
        })
    }
}

/// Output of [`Compiler::compile`].
pub struct CompilationResult {
    context: CompilerContext,
    iterations: usize,
}

impl CompilationResult {
    /// Returns the number of pipeline iterations run.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Returns the optimized body of `method`.
    #[must_use]
    pub fn body(&self, method: Token) -> Option<SsaFunction> {
        self.context.with_ssa(method, SsaFunction::clone)
    }

    /// Returns the event log of the whole run.
    #[must_use]
    pub fn events(&self) -> &EventLog {
        &self.context.events
    }

    /// Returns aggregate statistics of the run.
    #[must_use]
    pub fn stats(&self) -> DerivedStats {
        self.context.events.stats()
    }

    /// Returns the context, for inspecting summaries and facts.
    #[must_use]
    pub fn context(&self) -> &CompilerContext {
        &self.context
    }

    /// Takes every optimized body, keyed by method.
    #[must_use]
    pub fn into_bodies(self) -> BTreeMap<Token, SsaFunction> {
        self.context.ssa_functions.into_iter().collect()
    }
}
