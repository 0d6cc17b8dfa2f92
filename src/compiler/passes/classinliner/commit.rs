//! Applying a candidate's plan to the method body.
//!
//! A commit runs in fixed steps (see [`CommitStep`]). Each step leaves the
//! body valid SSA, so the only way a commit can fail half-way is a use the
//! evaluation did not foresee; the body is then restored to the snapshot
//! taken before the first step.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::{
    analysis::ssa::{ConstValue, InstrId, SsaFunction, SsaOp, SsaVarId},
    compiler::{
        config::ClassInliningConfig,
        context::CompilerContext,
        events::{EventKind, EventLog},
        passes::{
            classinliner::{
                fieldvalue::FieldValueHelper,
                plan::InlineeKind,
                processor::{Candidate, Rejection},
                root::RootKind,
            },
            inlining::inline_call_site,
        },
    },
    metadata::{program::Program, token::Token},
};

/// Steps of a commit, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CommitStep {
    /// Inlining the constructor chain and the calls on the instance.
    #[strum(serialize = "direct inlining")]
    DirectInlining,
    /// Inlining the calls that take the instance as an argument.
    #[strum(serialize = "indirect inlining")]
    IndirectInlining,
    /// Collapsing copies, casts and phis of the instance onto the root.
    #[strum(serialize = "phi resolution")]
    PhiResolution,
    /// Folding type tests, null tests, monitors and unused arguments.
    #[strum(serialize = "misc uses")]
    MiscUses,
    /// Replacing field reads by the values they observe.
    #[strum(serialize = "field reads")]
    FieldReads,
    /// Dropping stores and the root.
    #[strum(serialize = "cleanup")]
    Cleanup,
    /// Final structural check.
    #[strum(serialize = "validation")]
    Validation,
}

/// A commit that failed and was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortedCommit {
    /// The step that failed.
    pub step: CommitStep,
    /// What went wrong.
    pub reason: String,
}

impl AbortedCommit {
    fn new(step: CommitStep, reason: impl Into<String>) -> Self {
        Self {
            step,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for AbortedCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "commit aborted during {}: {}", self.step, self.reason)
    }
}

/// Result of a successful commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// The removed root instruction.
    pub root: InstrId,
    /// Class of the scalarized instance.
    pub class: Token,
    /// Methods inlined, in order.
    pub inlined: Vec<Token>,
    /// Field reads replaced by SSA values.
    pub fields_replaced: usize,
    /// Phis created for field values.
    pub phis_inserted: usize,
}

type Step<T> = std::result::Result<T, AbortedCommit>;

/// Values equal to `root`: copies and casts of it, and phis merging only
/// such values.
#[must_use]
pub fn alias_closure(ssa: &SsaFunction, root: SsaVarId) -> FxHashSet<SsaVarId> {
    let mut aliases = FxHashSet::default();
    aliases.insert(root);
    loop {
        let before = aliases.len();
        for (_, _, instr) in ssa.iter_instructions() {
            match instr.op() {
                SsaOp::Copy { dest, src } if aliases.contains(src) => {
                    aliases.insert(*dest);
                }
                SsaOp::CastClass { dest, object, .. } if aliases.contains(object) => {
                    aliases.insert(*dest);
                }
                _ => {}
            }
        }
        for block in ssa.blocks() {
            for phi in block.phi_nodes() {
                let result = phi.result();
                if phi.operand_count() > 0
                    && phi
                        .used_variables()
                        .all(|v| v == result || aliases.contains(&v))
                {
                    aliases.insert(result);
                }
            }
        }
        if aliases.len() == before {
            return aliases;
        }
    }
}

/// Applies candidate plans to one method.
pub struct Committer<'a> {
    program: &'a Program,
    ctx: &'a CompilerContext,
    config: &'a ClassInliningConfig,
    method: Token,
}

impl fmt::Debug for Committer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Committer")
            .field("method", &self.method)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Committer<'a> {
    /// Creates a committer for `method`.
    #[must_use]
    pub fn new(
        program: &'a Program,
        ctx: &'a CompilerContext,
        config: &'a ClassInliningConfig,
        method: Token,
    ) -> Self {
        Self {
            program,
            ctx,
            config,
            method,
        }
    }

    /// Re-checks a candidate against the current body right before commit.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::StalePlan`] if the root or a planned call no
    /// longer matches the body.
    pub fn prevalidate(&self, ssa: &SsaFunction, candidate: &Candidate) -> Result<(), Rejection> {
        if !candidate.root.is_live(ssa) {
            return Err(Rejection::StalePlan(candidate.root.instr));
        }
        let existing = candidate
            .plan
            .existing(InlineeKind::Direct)
            .chain(candidate.plan.existing(InlineeKind::Indirect));
        for (id, target) in existing {
            let Some(SsaOp::Call { args, .. }) = ssa.instruction(id).map(|i| i.op()) else {
                return Err(Rejection::StalePlan(id));
            };
            if target == self.program.root_constructor() {
                continue;
            }
            let body = self.program.method(target).and_then(|m| m.body.as_ref());
            if body.is_none_or(|b| b.num_args() != args.len()) {
                return Err(Rejection::StalePlan(id));
            }
        }
        Ok(())
    }

    /// Scalar-replaces the candidate's instance.
    ///
    /// Events are only added to `events`, and inlined methods only marked in
    /// the context, when the commit succeeds.
    ///
    /// # Errors
    ///
    /// Returns an [`AbortedCommit`] naming the failed step; `ssa` is then
    /// exactly as it was before the call.
    pub fn commit(
        &self,
        ssa: &mut SsaFunction,
        candidate: &Candidate,
        events: &EventLog,
    ) -> Step<Committed> {
        let snapshot = ssa.clone();
        let local = EventLog::new();

        let result = self.apply(ssa, candidate, &local).and_then(|committed| {
            if self.config.verify_ir {
                ssa.validate()
                    .map_err(|e| AbortedCommit::new(CommitStep::Validation, e.to_string()))?;
            }
            Ok(committed)
        });

        match result {
            Ok(committed) => {
                for &target in &committed.inlined {
                    self.ctx.mark_inlined(target);
                }
                events.merge(&local);
                Ok(committed)
            }
            Err(aborted) => {
                *ssa = snapshot;
                Err(aborted)
            }
        }
    }

    fn apply(
        &self,
        ssa: &mut SsaFunction,
        candidate: &Candidate,
        events: &EventLog,
    ) -> Step<Committed> {
        let mut inlined = Vec::new();
        let root = candidate.root.value;

        if let Some(ctor) = candidate.plan.constructor() {
            self.inline_receiver_call(ssa, candidate, ctor, &mut inlined, events)?;
        }
        self.inline_receiver_calls(ssa, candidate, CommitStep::DirectInlining, &mut inlined, events)?;

        for (call, target) in candidate.plan.existing(InlineeKind::Indirect) {
            self.inline_target(ssa, call, target, CommitStep::IndirectInlining, events)?;
            inlined.push(target);
        }
        self.inline_receiver_calls(
            ssa,
            candidate,
            CommitStep::IndirectInlining,
            &mut inlined,
            events,
        )?;

        self.collapse_aliases(ssa, candidate, events)?;
        self.fold_misc_uses(ssa, candidate, events)?;

        let (fields_replaced, phis_inserted) = match &candidate.root.kind {
            RootKind::Allocation { .. } => self.replace_field_reads(ssa, candidate, events)?,
            RootKind::Singleton { facts, .. } => {
                let mut replaced = 0;
                for id in Self::field_accesses(ssa, root, false) {
                    let Some(SsaOp::LoadField { dest, field, .. }) =
                        ssa.instruction(id).map(|i| i.op().clone())
                    else {
                        continue;
                    };
                    let Some(value) = facts.value_of(field.token()).cloned() else {
                        return Err(AbortedCommit::new(
                            CommitStep::FieldReads,
                            format!("no known value for {}", field.token()),
                        ));
                    };
                    events
                        .record(EventKind::FieldReadReplaced)
                        .method(self.method)
                        .message(format!("read of {} at {id} is {value}", field.token()));
                    ssa.replace_instruction_op(id, SsaOp::Const { dest, value });
                    replaced += 1;
                }
                ssa.recompute_uses();
                (replaced, 0)
            }
        };

        self.cleanup(ssa, candidate, events)?;

        Ok(Committed {
            root: candidate.root.instr,
            class: candidate.class,
            inlined,
            fields_replaced,
            phis_inserted,
        })
    }

    /// Inlines calls on the instance until none is left.
    ///
    /// Each round inlines every call present at its start, so the rounds
    /// only bound how deeply inlined bodies call back into the instance.
    fn inline_receiver_calls(
        &self,
        ssa: &mut SsaFunction,
        candidate: &Candidate,
        step: CommitStep,
        inlined: &mut Vec<Token>,
        events: &EventLog,
    ) -> Step<()> {
        for _ in 0..self.config.max_commit_rounds {
            let calls = Self::receiver_calls(ssa, candidate.root.value);
            if calls.is_empty() {
                return Ok(());
            }
            for call in calls {
                self.inline_receiver_call(ssa, candidate, call, inlined, events)
                    .map_err(|e| AbortedCommit { step, ..e })?;
            }
        }
        if Self::receiver_calls(ssa, candidate.root.value).is_empty() {
            return Ok(());
        }
        Err(AbortedCommit::new(
            step,
            format!(
                "calls on the instance still nest after {} rounds",
                self.config.max_commit_rounds
            ),
        ))
    }

    /// Calls whose receiver is the instance or one of its aliases.
    fn receiver_calls(ssa: &SsaFunction, root: SsaVarId) -> Vec<InstrId> {
        let aliases = alias_closure(ssa, root);
        ssa.iter_instructions()
            .filter_map(|(_, _, instr)| match instr.op() {
                SsaOp::Call { kind, args, .. }
                    if kind.has_receiver() && args.first().is_some_and(|a| aliases.contains(a)) =>
                {
                    Some(instr.id())
                }
                _ => None,
            })
            .collect()
    }

    fn inline_receiver_call(
        &self,
        ssa: &mut SsaFunction,
        candidate: &Candidate,
        call: InstrId,
        inlined: &mut Vec<Token>,
        events: &EventLog,
    ) -> Step<()> {
        let step = CommitStep::DirectInlining;
        let Some(SsaOp::Call { dest, method, .. }) = ssa.instruction(call).map(|i| i.op().clone())
        else {
            return Err(AbortedCommit::new(step, format!("{call} is not a call")));
        };
        let target = self
            .program
            .resolve_virtual(candidate.class, method.token())
            .ok_or_else(|| {
                AbortedCommit::new(step, format!("{} has no single target", method.token()))
            })?;
        if !candidate.plan.allows(target) {
            return Err(AbortedCommit::new(
                step,
                format!("call to {target} on the instance was not planned"),
            ));
        }

        let result_unused = dest.is_none_or(|d| ssa.uses_of(d).is_empty());
        let eliminable = self
            .ctx
            .with_summary(target, |s| s.purity.can_eliminate_if_unused())
            .unwrap_or(false);
        if target == self.program.root_constructor() || (result_unused && eliminable) {
            ssa.remove_instruction(call);
            ssa.recompute_uses();
            events
                .record(EventKind::InstructionRemoved)
                .method(self.method)
                .message(format!("dropped call to {target} at {call}"));
            return Ok(());
        }

        self.inline_target(ssa, call, target, step, events)?;
        inlined.push(target);
        Ok(())
    }

    fn inline_target(
        &self,
        ssa: &mut SsaFunction,
        call: InstrId,
        target: Token,
        step: CommitStep,
        events: &EventLog,
    ) -> Step<()> {
        let Some(body) = self.program.method(target).and_then(|m| m.body.as_ref()) else {
            return Err(AbortedCommit::new(step, format!("{target} has no body")));
        };
        let site = inline_call_site(ssa, call, body)
            .map_err(|e| AbortedCommit::new(step, e.to_string()))?;
        events
            .record(EventKind::MethodInlined)
            .at(self.method, site.entry)
            .message(format!("inlined {target} at {call}"));
        Ok(())
    }

    /// Rewrites copies, casts and phis of the instance to the root itself.
    fn collapse_aliases(
        &self,
        ssa: &mut SsaFunction,
        candidate: &Candidate,
        events: &EventLog,
    ) -> Step<()> {
        let step = CommitStep::PhiResolution;
        let root = candidate.root.value;
        let aliases = alias_closure(ssa, root);

        let copies: Vec<(InstrId, SsaVarId, Option<Token>)> = ssa
            .iter_instructions()
            .filter_map(|(_, _, instr)| match instr.op() {
                SsaOp::Copy { dest, src } if aliases.contains(src) => {
                    Some((instr.id(), *dest, None))
                }
                SsaOp::CastClass {
                    dest,
                    object,
                    target_type,
                } if aliases.contains(object) => {
                    Some((instr.id(), *dest, Some(target_type.token())))
                }
                _ => None,
            })
            .collect();
        for (id, dest, cast) in copies {
            if let Some(target) = cast {
                if !self.program.is_subtype(candidate.class, target) {
                    return Err(AbortedCommit::new(
                        step,
                        format!("cast of the instance to unrelated {target}"),
                    ));
                }
                events
                    .record(EventKind::CastRemoved)
                    .method(self.method)
                    .message(format!("cast at {id}"));
            }
            ssa.replace_uses_including_phis(dest, root);
            ssa.remove_instruction(id);
        }

        let mut phis: Vec<(usize, usize)> = Vec::new();
        for (b, block) in ssa.blocks().iter().enumerate() {
            for (p, phi) in block.phi_nodes().iter().enumerate() {
                if phi.result() != root && aliases.contains(&phi.result()) {
                    phis.push((b, p));
                }
            }
        }
        let results: Vec<SsaVarId> = phis
            .iter()
            .filter_map(|&(b, p)| ssa.block(b).and_then(|block| block.phi(p)))
            .map(|phi| phi.result())
            .collect();
        for result in results {
            ssa.replace_uses_including_phis(result, root);
        }
        for &(b, p) in phis.iter().rev() {
            ssa.remove_phi(b, p);
            events
                .record(EventKind::PhiSimplified)
                .at(self.method, b)
                .message(format!("phi of the instance in B{b}"));
        }
        ssa.recompute_uses();

        let mixed = ssa.blocks().iter().enumerate().find_map(|(b, block)| {
            block
                .phi_nodes()
                .iter()
                .any(|phi| phi.used_variables().any(|v| v == root))
                .then_some(b)
        });
        if let Some(b) = mixed {
            return Err(AbortedCommit::new(
                step,
                format!("phi in B{b} merges the instance with another value"),
            ));
        }
        Ok(())
    }

    /// Folds uses of the root that do not depend on its identity.
    fn fold_misc_uses(
        &self,
        ssa: &mut SsaFunction,
        candidate: &Candidate,
        events: &EventLog,
    ) -> Step<()> {
        let step = CommitStep::MiscUses;
        let root = candidate.root.value;
        let users: Vec<InstrId> = ssa
            .iter_instructions()
            .filter(|(_, _, instr)| instr.op().uses().contains(&root))
            .map(|(_, _, instr)| instr.id())
            .collect();

        for id in users {
            let Some(op) = ssa.instruction(id).map(|i| i.op().clone()) else {
                continue;
            };
            match op {
                SsaOp::InstanceOf {
                    dest, target_type, ..
                } => {
                    let holds = self.program.is_subtype(candidate.class, target_type.token());
                    ssa.replace_instruction_op(
                        id,
                        SsaOp::Const {
                            dest,
                            value: ConstValue::Bool(holds),
                        },
                    );
                }
                SsaOp::BranchNull {
                    test,
                    true_target,
                    false_target,
                    ..
                } => {
                    let target = if test.evaluate(false) {
                        true_target
                    } else {
                        false_target
                    };
                    ssa.replace_instruction_op(id, SsaOp::Jump { target });
                    if let Some((block, _)) = ssa.locate(id) {
                        events
                            .record(EventKind::BranchFolded)
                            .at(self.method, block)
                            .message(format!("null test of the instance at {id}"));
                    }
                }
                SsaOp::MonitorEnter { .. } | SsaOp::MonitorExit { .. } => {
                    ssa.remove_instruction(id);
                    events
                        .record(EventKind::MonitorRemoved)
                        .method(self.method)
                        .message(format!("monitor on the instance at {id}"));
                }
                SsaOp::Call { args, .. } => {
                    for (k, arg) in args.iter().enumerate() {
                        if *arg != root {
                            continue;
                        }
                        if !candidate.plan.nulls_argument(id, k) {
                            return Err(AbortedCommit::new(
                                step,
                                format!("instance passed to unplanned call {id}"),
                            ));
                        }
                        self.null_argument(ssa, id, k)
                            .map_err(|e| AbortedCommit::new(step, e.to_string()))?;
                        events
                            .record(EventKind::ArgumentNulled)
                            .method(self.method)
                            .message(format!("argument {k} of {id}"));
                    }
                }
                SsaOp::LoadField { object, .. } if object == root => {}
                SsaOp::StoreField { object, value, .. } if object == root && value != root => {}
                other => {
                    return Err(AbortedCommit::new(
                        step,
                        format!("unexpected use of the instance: {other:?}"),
                    ));
                }
            }
        }
        // Reads in blocks the folds cut off have no reaching store
        let cleared = ssa.clear_unreachable_blocks();
        if cleared > 0 {
            events
                .record(EventKind::BlockRemoved)
                .method(self.method)
                .message(format!("cleared {cleared} unreachable blocks"));
        }
        ssa.recompute_uses();
        Ok(())
    }

    fn null_argument(&self, ssa: &mut SsaFunction, call: InstrId, index: usize) -> crate::Result<()> {
        let (block, position) = ssa
            .locate(call)
            .ok_or_else(|| malformed_error!("Call {} not found", call))?;
        let null = ssa.new_temporary();
        ssa.insert_instruction(
            block,
            position,
            SsaOp::Const {
                dest: null,
                value: ConstValue::Null,
            },
        )?;
        let Some(SsaOp::Call {
            dest,
            kind,
            method,
            mut args,
        }) = ssa.instruction(call).map(|i| i.op().clone())
        else {
            return Err(malformed_error!("Instruction {} is not a call", call));
        };
        if let Some(arg) = args.get_mut(index) {
            *arg = null;
        }
        ssa.replace_instruction_op(
            call,
            SsaOp::Call {
                dest,
                kind,
                method,
                args,
            },
        );
        Ok(())
    }

    /// Loads (or stores, with `stores`) of fields of `object`, in block order.
    fn field_accesses(ssa: &SsaFunction, object: SsaVarId, stores: bool) -> Vec<InstrId> {
        ssa.iter_instructions()
            .filter(|(_, _, instr)| match instr.op() {
                SsaOp::LoadField { object: o, .. } => !stores && *o == object,
                SsaOp::StoreField { object: o, .. } => stores && *o == object,
                _ => false,
            })
            .map(|(_, _, instr)| instr.id())
            .collect()
    }

    /// Replaces every field read of an allocation with the value stored
    /// last on each path, creating phis at joins.
    fn replace_field_reads(
        &self,
        ssa: &mut SsaFunction,
        candidate: &Candidate,
        events: &EventLog,
    ) -> Step<(usize, usize)> {
        let step = CommitStep::FieldReads;
        let root = candidate.root.value;

        let mut reads: Vec<(Token, InstrId, SsaVarId)> = Self::field_accesses(ssa, root, false)
            .into_iter()
            .filter_map(|id| match ssa.instruction(id).map(|i| i.op()) {
                Some(SsaOp::LoadField { dest, field, .. }) => Some((field.token(), id, *dest)),
                _ => None,
            })
            .collect();
        reads.sort_by_key(|(field, _, _)| *field);

        let mut replaced = 0;
        let mut phis = 0;
        for chunk in reads.chunk_by(|a, b| a.0 == b.0) {
            let field = chunk[0].0;
            let value_type = self
                .program
                .field(field)
                .map(|f| f.value_type)
                .ok_or_else(|| AbortedCommit::new(step, format!("unknown field {field}")))?;
            let mut helper = FieldValueHelper::new(
                ssa,
                root,
                candidate.root.instr,
                field,
                ConstValue::default_for(value_type),
            );
            for &(_, read, dest) in chunk {
                let value = helper
                    .value_before(ssa, read)
                    .map_err(|e| AbortedCommit::new(step, e.to_string()))?;
                ssa.replace_uses_including_phis(dest, value);
                helper.replaced(dest, value);
                ssa.remove_instruction(read);
                replaced += 1;
                events
                    .record(EventKind::FieldReadReplaced)
                    .method(self.method)
                    .message(format!("read of {field} at {read} is {value}"));
            }
            for &(block, phi) in helper.phis_inserted() {
                events
                    .record(EventKind::PhiInserted)
                    .at(self.method, block)
                    .message(format!("{phi} for {field}"));
            }
            phis += helper.phis_inserted().len();
        }
        ssa.recompute_uses();
        Ok((replaced, phis))
    }

    /// Drops the stores into the instance and the root itself.
    fn cleanup(&self, ssa: &mut SsaFunction, candidate: &Candidate, events: &EventLog) -> Step<()> {
        let root = candidate.root.value;
        for id in Self::field_accesses(ssa, root, true) {
            ssa.remove_instruction(id);
        }
        ssa.recompute_uses();

        if let Some(site) = ssa.uses_of(root).first() {
            return Err(AbortedCommit::new(
                CommitStep::Cleanup,
                format!("instance still used in B{}", site.block),
            ));
        }
        ssa.remove_instruction(candidate.root.instr);
        ssa.recompute_uses();
        events
            .record(EventKind::InstructionRemoved)
            .at(self.method, candidate.root.block)
            .message(format!("root {}", candidate.root));
        Ok(())
    }
}
