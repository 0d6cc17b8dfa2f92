//! Class inlining: scalar replacement of non-escaping instances.
//!
//! An instance qualifies when every use of it can be made to disappear: its
//! constructor chain and the methods called on it are inlined into the
//! method, its fields become plain SSA values, and the allocation goes away.
//! Two kinds of instance are handled:
//!
//! - **Allocations** created in the method (`new C(..)`)
//! - **Singletons** read from a static final field whose class initializer
//!   stores a constructed instance with known constant state
//!
//! # Pipeline
//!
//! ```text
//! find_roots ─> CandidateProcessor ─> Committer::prevalidate ─> Committer::commit
//!                 (read-only checks)     (plan still matches)     (rolls back on abort)
//! ```
//!
//! Every root is evaluated against the body as it is right before its
//! commit, so a commit never acts on a stale analysis. Rounds repeat until
//! one commits nothing; a root that aborted is not retried in that method.
//!
//! # Example
//!
//! ```rust,ignore
//! // Before                          // After
//! let p = new Point(x, y);           let sum = x + y;
//! let sum = p.x + p.y;               return sum;
//! return sum;
//! ```

mod aliases;
mod commit;
mod cost;
mod eligibility;
mod fieldvalue;
mod plan;
mod processor;
mod root;

use std::sync::Arc;

use rustc_hash::FxHashSet;

pub use aliases::{AliasSet, DeferredCheck};
pub use commit::{alias_closure, AbortedCommit, CommitStep, Committed, Committer};
pub use cost::{non_materializing, receiver_values, CostAnalyzer};
pub use eligibility::{Eligibility, EligibilityCache};
pub use fieldvalue::FieldValueHelper;
pub use plan::{CallSite, InlineeKind, InliningPlan, PlannedCall};
pub use processor::{Candidate, CandidateProcessor, ProcessorState, Rejection};
pub use root::{find_roots, Root, RootKind};

use crate::{
    analysis::ssa::{InstrId, SsaFunction},
    compiler::{
        config::ClassInliningConfig,
        context::CompilerContext,
        events::{EventKind, EventLog},
        pass::SsaPass,
        passes::deadcode::DeadCodeEliminationPass,
    },
    metadata::{program::Program, token::Token},
    Result,
};

/// What became of one root in one round.
#[derive(Debug)]
pub enum Outcome {
    /// The instance was scalar-replaced.
    Committed(Committed),
    /// The instance was left alone.
    Rejected(Rejection),
    /// The commit failed and was rolled back.
    Aborted(AbortedCommit),
}

/// Scalar replacement of non-escaping instances.
///
/// Eligibility decisions are cached per class and shared between the
/// scheduler's worker threads through an [`Arc`].
#[derive(Debug, Default)]
pub struct ClassInliningPass {
    config: ClassInliningConfig,
    eligibility: Arc<EligibilityCache>,
}

impl ClassInliningPass {
    /// Creates the pass with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the pass with `config`.
    #[must_use]
    pub fn with_config(config: ClassInliningConfig) -> Self {
        Self {
            config,
            eligibility: Arc::new(EligibilityCache::new()),
        }
    }

    /// Shares an existing eligibility cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<EligibilityCache>) -> Self {
        self.eligibility = cache;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ClassInliningConfig {
        &self.config
    }

    /// Returns the eligibility cache.
    #[must_use]
    pub fn eligibility(&self) -> &Arc<EligibilityCache> {
        &self.eligibility
    }

    /// Evaluates and, if possible, commits one root.
    pub fn process_root(
        &self,
        ssa: &mut SsaFunction,
        method: Token,
        root: Root,
        ctx: &CompilerContext,
        program: &Program,
        events: &EventLog,
    ) -> Outcome {
        let mut processor =
            CandidateProcessor::new(program, ctx, &self.eligibility, &self.config, method, root);
        let candidate = match processor.evaluate(ssa) {
            Ok(candidate) => candidate,
            Err(rejection) => return Outcome::Rejected(rejection),
        };

        let committer = Committer::new(program, ctx, &self.config, method);
        if let Err(rejection) = committer.prevalidate(ssa, &candidate) {
            return Outcome::Rejected(rejection);
        }
        match committer.commit(ssa, &candidate, events) {
            Ok(committed) => {
                processor.mark_committed();
                Outcome::Committed(committed)
            }
            Err(aborted) => Outcome::Aborted(aborted),
        }
    }
}

impl SsaPass for ClassInliningPass {
    fn name(&self) -> &'static str {
        "ClassInliningPass"
    }

    fn description(&self) -> &'static str {
        "Scalar-replaces instances that never escape their method"
    }

    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: Token,
        ctx: &CompilerContext,
        program: &Arc<Program>,
    ) -> Result<bool> {
        let events = EventLog::new();
        let mut aborted: FxHashSet<InstrId> = FxHashSet::default();
        let mut reported: FxHashSet<InstrId> = FxHashSet::default();
        let mut committed = 0;

        for _ in 0..self.config.max_rounds {
            let mut progress = false;

            for root in find_roots(ssa, program, ctx) {
                if aborted.contains(&root.instr) || !root.is_live(ssa) {
                    continue;
                }
                let instr = root.instr;
                let block = root.block;
                let label = root.to_string();

                match self.process_root(ssa, method, root, ctx, program, &events) {
                    Outcome::Committed(done) => {
                        log::debug!(
                            "class-inlined {} in {method}: {} methods, {} field reads",
                            done.class,
                            done.inlined.len(),
                            done.fields_replaced
                        );
                        events
                            .record(EventKind::ClassInlined)
                            .at(method, block)
                            .pass(self.name())
                            .message(format!("{label} of {}", done.class));
                        committed += 1;
                        progress = true;
                    }
                    Outcome::Rejected(rejection) => {
                        if reported.insert(instr) {
                            log::debug!("kept {label} in {method}: {rejection}");
                            events
                                .record(EventKind::ClassInlineRejected)
                                .at(method, block)
                                .pass(self.name())
                                .message(format!("{label}: {rejection}"));
                        }
                    }
                    Outcome::Aborted(abort) => {
                        log::warn!("{label} in {method}: {abort}");
                        events
                            .record(EventKind::ClassInlineAborted)
                            .at(method, block)
                            .pass(self.name())
                            .message(format!("{label}: {abort}"));
                        aborted.insert(instr);
                    }
                }
            }

            if !progress {
                break;
            }
        }

        if committed > 0 {
            DeadCodeEliminationPass::eliminate(ssa, method, program, &events);
        }
        ctx.events.merge(&events);
        Ok(committed > 0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        analysis::ssa::{CallKind, SsaFunctionBuilder, SsaOp, ValueType},
        compiler::{context::CompilerContext, events::EventKind, pass::SsaPass},
        metadata::{
            program::{ClassFlags, FieldFlags, MethodFlags, Program},
            token::Token,
        },
    };

    use super::*;

    struct Fixture {
        program: Program,
        class: Token,
        ctor: Token,
        field: Token,
    }

    /// `class Box { int v; Box(int v) { super(); this.v = v; } }`
    fn fixture() -> Fixture {
        let mut program = Program::new();
        let object_ctor = program.root_constructor();
        let class = program.add_class("Box", ClassFlags::empty(), None);
        let field = program
            .add_field(class, "v", FieldFlags::empty(), ValueType::Int)
            .unwrap();
        let ctor = program
            .add_method(class, ".ctor", MethodFlags::CONSTRUCTOR, 1)
            .unwrap();
        program
            .set_body(
                ctor,
                SsaFunctionBuilder::new(2).build_with(|f| {
                    let this = f.arg(0);
                    let v = f.arg(1);
                    f.block(0, |b| {
                        b.call_void(CallKind::Direct, object_ctor, &[this]);
                        b.store_field(this, field, v);
                        b.ret();
                    });
                }),
            )
            .unwrap();
        Fixture {
            program,
            class,
            ctor,
            field,
        }
    }

    fn caller(program: &mut Program, body: SsaFunction) -> Token {
        let owner = program.add_class("Main", ClassFlags::empty(), None);
        let method = program
            .add_method(owner, "run", MethodFlags::STATIC, 1)
            .unwrap();
        program.set_body(method, body.clone()).unwrap();
        method
    }

    #[test]
    fn test_box_is_scalarized() {
        let mut fx = fixture();
        let (class, ctor, field) = (fx.class, fx.ctor, fx.field);
        let body = SsaFunctionBuilder::new(1).build_with(|f| {
            let x = f.arg(0);
            f.block(0, |b| {
                let obj = b.new_object(class, ctor, &[x]);
                let v = b.load_field(obj, field);
                b.ret_val(v);
            });
        });
        let method = caller(&mut fx.program, body.clone());
        let program = Arc::new(fx.program);
        let ctx = CompilerContext::from_program(&program);

        let mut ssa = body;
        let pass = ClassInliningPass::new();
        assert!(pass.run_on_method(&mut ssa, method, &ctx, &program).unwrap());

        assert!(!ssa.iter_instructions().any(|(_, _, i)| matches!(
            i.op(),
            SsaOp::NewInstance { .. } | SsaOp::LoadField { .. } | SsaOp::Call { .. }
        )));
        let returned = ssa.iter_instructions().find_map(|(_, _, i)| match i.op() {
            SsaOp::Return { value } => *value,
            _ => None,
        });
        assert_eq!(returned, ssa.argument(0));
        assert_eq!(ctx.events.count_kind(EventKind::ClassInlined), 1);
        assert!(ctx.was_inlined(ctor));
        ssa.validate().unwrap();
    }

    #[test]
    fn test_escaping_box_is_kept() {
        let mut fx = fixture();
        let (class, ctor) = (fx.class, fx.ctor);
        let sink = fx
            .program
            .add_field(class, "last", FieldFlags::STATIC, ValueType::Reference)
            .unwrap();
        let body = SsaFunctionBuilder::new(1).build_with(|f| {
            let x = f.arg(0);
            f.block(0, |b| {
                let obj = b.new_object(class, ctor, &[x]);
                b.store_static(sink, obj);
                b.ret();
            });
        });
        let method = caller(&mut fx.program, body.clone());
        let program = Arc::new(fx.program);
        let ctx = CompilerContext::from_program(&program);

        let mut ssa = body;
        let before = ssa.instruction_count();
        let pass = ClassInliningPass::new();
        assert!(!pass.run_on_method(&mut ssa, method, &ctx, &program).unwrap());
        assert_eq!(ssa.instruction_count(), before);
        assert_eq!(ctx.events.count_kind(EventKind::ClassInlineRejected), 1);
    }

    #[test]
    fn test_excluded_class_is_kept() {
        let mut fx = fixture();
        let (class, ctor, field) = (fx.class, fx.ctor, fx.field);
        let body = SsaFunctionBuilder::new(1).build_with(|f| {
            let x = f.arg(0);
            f.block(0, |b| {
                let obj = b.new_object(class, ctor, &[x]);
                let v = b.load_field(obj, field);
                b.ret_val(v);
            });
        });
        let method = caller(&mut fx.program, body.clone());
        let program = Arc::new(fx.program);
        let ctx = CompilerContext::from_program(&program);
        ctx.no_class_inline.insert(class);

        let mut ssa = body;
        let pass = ClassInliningPass::new();
        assert!(!pass.run_on_method(&mut ssa, method, &ctx, &program).unwrap());
        assert_eq!(pass.eligibility().cached(class), Some(Eligibility::NotEligible));
    }
}
