//! Evaluation of one candidate root.
//!
//! A [`CandidateProcessor`] moves through the states of [`ProcessorState`]:
//!
//! ```text
//! Init -> InstanceChecked -> ClassChecked -> UsesWalked -> CostChecked
//!   \___________\_______________\______________\___________\-> Rejected
//! ```
//!
//! Every step only reads the method body. A candidate that reaches
//! `CostChecked` is turned into a [`Candidate`] for
//! [`Committer`](super::commit::Committer); any earlier failure is a
//! [`Rejection`] and leaves the body untouched.

use std::{collections::VecDeque, fmt};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    analysis::ssa::{
        CallKind, DefSite, InstrId, SsaFunction, SsaInstruction, SsaOp, SsaVarId,
    },
    compiler::{
        config::ClassInliningConfig,
        context::CompilerContext,
        passes::{
            classinliner::{
                aliases::AliasSet,
                cost::{receiver_values, CostAnalyzer},
                eligibility::EligibilityCache,
                plan::{CallSite, InlineeKind, InliningPlan},
                root::{Root, RootKind},
            },
            inlining::check_admissible,
        },
        summary::{ClassInitializerInfo, ParameterUsage, UsageDetails},
    },
    metadata::{
        program::{FieldFlags, Program},
        token::Token,
    },
};

/// Progress of a [`CandidateProcessor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ProcessorState {
    /// Nothing checked yet.
    Init,
    /// The root yields an instance of a known concrete class.
    InstanceChecked,
    /// The class is eligible in this context.
    ClassChecked,
    /// Every use of every alias is accounted for.
    UsesWalked,
    /// The forced inlining fits the budget.
    CostChecked,
    /// The candidate was scalar-replaced.
    Committed,
    /// The candidate was found ineligible.
    Rejected,
}

/// Why a candidate was not scalar-replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The root value is never used.
    Unused,
    /// The class of the instance is unknown or not instantiable.
    UnknownClass(Token),
    /// The method allocates an instance of its own class.
    SelfAllocation(Token),
    /// The class is structurally ineligible.
    NotEligible(Token),
    /// Initializing the class may be observed.
    ClassInitializer(Token),
    /// The state of a singleton instance cannot be reconstructed.
    SingletonState(Token),
    /// A use the transformation cannot model.
    IneligibleUse {
        /// The using instruction, or the root for uses found in callee summaries.
        instr: InstrId,
        /// What the use does.
        reason: &'static str,
    },
    /// A value that must stay distinct would become an alias.
    IllegalAlias(SsaVarId),
    /// A call on the instance has no single target.
    UnresolvedCall(Token),
    /// A target breaks the general inlining rules.
    Inadmissible {
        /// The target.
        callee: Token,
        /// The rule it breaks.
        reason: String,
    },
    /// Constructor or call chains nest deeper than allowed.
    ChainTooDeep(Token),
    /// An allocation is constructed more than once, or never.
    Construction(&'static str),
    /// The forced inlining is too large.
    OverBudget {
        /// Estimated cost.
        cost: usize,
        /// Configured allowance.
        allowance: usize,
    },
    /// A planned call changed between evaluation and commit.
    StalePlan(InstrId),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unused => write!(f, "instance is never used"),
            Self::UnknownClass(class) => write!(f, "class {class} is unknown or abstract"),
            Self::SelfAllocation(class) => {
                write!(f, "{class} is allocated inside its own method")
            }
            Self::NotEligible(class) => write!(f, "class {class} is not eligible"),
            Self::ClassInitializer(class) => {
                write!(f, "initializing {class} may have side effects")
            }
            Self::SingletonState(field) => {
                write!(f, "instance held by {field} cannot be reconstructed")
            }
            Self::IneligibleUse { instr, reason } => write!(f, "{reason} at {instr}"),
            Self::IllegalAlias(var) => write!(f, "{var} cannot alias the instance"),
            Self::UnresolvedCall(method) => write!(f, "call to {method} has no single target"),
            Self::Inadmissible { callee, reason } => write!(f, "cannot inline {callee}: {reason}"),
            Self::ChainTooDeep(method) => write!(f, "call chain through {method} is too deep"),
            Self::Construction(reason) => write!(f, "{reason}"),
            Self::OverBudget { cost, allowance } => {
                write!(f, "estimated cost {cost} exceeds allowance {allowance}")
            }
            Self::StalePlan(instr) => write!(f, "planned call {instr} changed"),
        }
    }
}

/// A candidate that passed every check, ready to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// The root.
    pub root: Root,
    /// Exact class of the instance.
    pub class: Token,
    /// Calls to force inline and arguments to null.
    pub plan: InliningPlan,
    /// Final cost estimate.
    pub estimated_cost: usize,
}

/// Evaluates one root against the current method body.
pub struct CandidateProcessor<'a> {
    program: &'a Program,
    ctx: &'a CompilerContext,
    eligibility: &'a EligibilityCache,
    config: &'a ClassInliningConfig,
    method: Token,
    caller_class: Option<Token>,
    root: Root,
    class: Option<Token>,
    state: ProcessorState,
    aliases: AliasSet<'a>,
    plan: InliningPlan,
    cost: CostAnalyzer,
}

impl<'a> CandidateProcessor<'a> {
    /// Creates a processor for `root` in `method`.
    #[must_use]
    pub fn new(
        program: &'a Program,
        ctx: &'a CompilerContext,
        eligibility: &'a EligibilityCache,
        config: &'a ClassInliningConfig,
        method: Token,
        root: Root,
    ) -> Self {
        let bypass = root
            .class()
            .is_some_and(|class| ctx.is_always_inline(program, class));
        Self {
            program,
            ctx,
            eligibility,
            config,
            method,
            caller_class: program.method(method).map(|m| m.owner),
            aliases: AliasSet::new(root.value),
            root,
            class: None,
            state: ProcessorState::Init,
            plan: InliningPlan::new(),
            cost: CostAnalyzer::new(config.instruction_allowance, bypass),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ProcessorState {
        self.state
    }

    /// Returns the plan gathered so far.
    #[must_use]
    pub fn plan(&self) -> &InliningPlan {
        &self.plan
    }

    /// Returns the alias set of the instance.
    #[must_use]
    pub fn aliases(&self) -> &AliasSet<'a> {
        &self.aliases
    }

    /// Returns the cost estimate so far.
    #[must_use]
    pub fn estimated_cost(&self) -> usize {
        self.cost.estimated_cost()
    }

    /// Runs every check in order.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`]; the processor is then `Rejected`.
    pub fn evaluate(&mut self, ssa: &SsaFunction) -> Result<Candidate, Rejection> {
        self.check_instance()?;
        self.check_class()?;
        self.walk_uses(ssa)?;
        self.check_cost()?;
        let class = self.class.ok_or(Rejection::Unused)?;
        Ok(Candidate {
            root: self.root.clone(),
            class,
            plan: self.plan.clone(),
            estimated_cost: self.cost.estimated_cost(),
        })
    }

    /// Marks the candidate committed.
    pub fn mark_committed(&mut self) {
        self.state = ProcessorState::Committed;
    }

    fn reject<T>(&mut self, rejection: Rejection) -> Result<T, Rejection> {
        self.state = ProcessorState::Rejected;
        Err(rejection)
    }

    fn class(&self) -> Token {
        self.class.unwrap_or_else(|| self.program.object_class())
    }

    /// Resolves the class of the instance.
    ///
    /// # Errors
    ///
    /// Rejects unknown or abstract classes, singleton instances whose
    /// fields are not all known constants, and self-allocation.
    pub fn check_instance(&mut self) -> Result<(), Rejection> {
        let class = match &self.root.kind {
            RootKind::Allocation { class } => *class,
            RootKind::Singleton { field, facts } => {
                let Some(class) = facts.exact_type else {
                    return self.reject(Rejection::SingletonState(*field));
                };
                let known = self
                    .program
                    .instance_fields(class)
                    .iter()
                    .all(|f| facts.value_of(*f).is_some());
                if !known {
                    return self.reject(Rejection::SingletonState(*field));
                }
                class
            }
        };

        if !self.program.class(class).is_some_and(|c| c.is_concrete()) {
            return self.reject(Rejection::UnknownClass(class));
        }
        if self.caller_class == Some(class) {
            return self.reject(Rejection::SelfAllocation(class));
        }

        self.class = Some(class);
        self.state = ProcessorState::InstanceChecked;
        Ok(())
    }

    /// Checks class eligibility and initialization effects.
    ///
    /// # Errors
    ///
    /// Rejects ineligible classes, allocations whose class initialization
    /// may be observed, and singleton fields not assigned by a trivial
    /// class initializer.
    pub fn check_class(&mut self) -> Result<(), Rejection> {
        let class = self.class();
        if !self
            .eligibility
            .classify(self.program, self.ctx, class)
            .is_eligible()
        {
            return self.reject(Rejection::NotEligible(class));
        }

        match &self.root.kind {
            RootKind::Allocation { .. } => {
                if self
                    .ctx
                    .class_initializer(self.program, class)
                    .has_side_effects()
                {
                    return self.reject(Rejection::ClassInitializer(class));
                }
            }
            RootKind::Singleton { field, .. } => {
                let field = *field;
                let Some(def) = self.program.field(field) else {
                    return self.reject(Rejection::SingletonState(field));
                };
                if !def.flags.contains(FieldFlags::STATIC | FieldFlags::FINAL)
                    || def.flags.contains(FieldFlags::PINNED)
                {
                    return self.reject(Rejection::SingletonState(field));
                }
                let holder = def.owner;
                let assigned = matches!(
                    self.ctx.class_initializer(self.program, holder),
                    ClassInitializerInfo::Trivial { assigned_fields }
                        if assigned_fields.contains(&field)
                );
                if !assigned {
                    return self.reject(Rejection::ClassInitializer(holder));
                }
            }
        }

        self.state = ProcessorState::ClassChecked;
        Ok(())
    }

    /// Walks the uses of the instance and its aliases breadth-first,
    /// building the inlining plan.
    ///
    /// # Errors
    ///
    /// Rejects on the first use that cannot be modeled.
    pub fn walk_uses(&mut self, ssa: &SsaFunction) -> Result<(), Rejection> {
        let mut result = self.walk(ssa);
        if result.is_ok()
            && !self.root.is_singleton()
            && self.plan.constructor().is_none()
        {
            result = Err(Rejection::Construction("instance is never constructed"));
        }
        match result {
            Ok(()) => {
                self.state = ProcessorState::UsesWalked;
                Ok(())
            }
            Err(rejection) => self.reject(rejection),
        }
    }

    /// Charges the plan against the budget.
    ///
    /// # Errors
    ///
    /// Rejects when the estimated cost exceeds the allowance.
    pub fn check_cost(&mut self) -> Result<(), Rejection> {
        if self.cost.exceeds_budget(&self.plan, self.program, self.ctx) {
            let rejection = Rejection::OverBudget {
                cost: self.cost.estimated_cost(),
                allowance: self.cost.allowance(),
            };
            return self.reject(rejection);
        }
        self.state = ProcessorState::CostChecked;
        Ok(())
    }

    fn ineligible(&self, instr: InstrId, reason: &'static str) -> Rejection {
        Rejection::IneligibleUse { instr, reason }
    }

    fn walk(&mut self, ssa: &SsaFunction) -> Result<(), Rejection> {
        let root = self.root.value;
        if ssa.uses_of(root).is_empty() {
            return Err(Rejection::Unused);
        }

        let mut queue = VecDeque::from([root]);
        let mut visited: FxHashSet<SsaVarId> = FxHashSet::default();
        let mut pending_phis: Vec<(usize, usize)> = Vec::new();
        let mut calls_seen: FxHashMap<InstrId, SsaVarId> = FxHashMap::default();

        loop {
            while let Some(value) = queue.pop_front() {
                if !visited.insert(value) {
                    continue;
                }
                if !self.aliases.add_definite_alias(value) {
                    return Err(Rejection::IllegalAlias(value));
                }
                for site in ssa.uses_of(value).to_vec() {
                    if site.is_phi_operand {
                        if !pending_phis.contains(&(site.block, site.index)) {
                            pending_phis.push((site.block, site.index));
                        }
                        continue;
                    }
                    let Some(instr) = ssa
                        .block(site.block)
                        .and_then(|b| b.instruction(site.index))
                    else {
                        continue;
                    };
                    if matches!(instr.op(), SsaOp::Call { .. }) {
                        match calls_seen.get(&instr.id()) {
                            Some(seen) if *seen == value => continue,
                            Some(_) => {
                                return Err(self.ineligible(
                                    instr.id(),
                                    "two aliases of the instance passed to one call",
                                ));
                            }
                            None => {
                                calls_seen.insert(instr.id(), value);
                            }
                        }
                    }
                    self.visit_use(ssa, value, instr, &mut queue)?;
                }
            }

            if pending_phis.is_empty() {
                return Ok(());
            }
            let accepted = self.resolve_phis(ssa, &mut pending_phis)?;
            if accepted.is_empty() {
                return Ok(());
            }
            queue.extend(accepted);
        }
    }

    /// Accepts the pending phis whose operands are all aliases. When none
    /// qualifies on its own, phis that only merge aliases and each other
    /// (loop-carried copies of the instance) are accepted together.
    fn resolve_phis(
        &mut self,
        ssa: &SsaFunction,
        pending: &mut Vec<(usize, usize)>,
    ) -> Result<Vec<SsaVarId>, Rejection> {
        let phi_at = |b: usize, p: usize| ssa.block(b).and_then(|block| block.phi(p));

        let mut accepted = Vec::new();
        pending.retain(|&(b, p)| {
            let Some(phi) = phi_at(b, p) else {
                return false;
            };
            let result = phi.result();
            let all_aliases = phi
                .operands()
                .iter()
                .all(|op| op.value() == result || self.aliases.is_alias(op.value()));
            if all_aliases {
                accepted.push(result);
            }
            !all_aliases
        });
        if !accepted.is_empty() || pending.is_empty() {
            return Ok(accepted);
        }

        let results: FxHashSet<SsaVarId> = pending
            .iter()
            .filter_map(|&(b, p)| phi_at(b, p).map(|phi| phi.result()))
            .collect();
        for &(b, p) in pending.iter() {
            let Some(phi) = phi_at(b, p) else {
                continue;
            };
            let closed = phi
                .operands()
                .iter()
                .all(|op| results.contains(&op.value()) || self.aliases.is_alias(op.value()));
            if !closed {
                return Err(self.ineligible(
                    self.root.instr,
                    "phi merges the instance with another value",
                ));
            }
        }
        pending.clear();
        Ok(results.into_iter().collect())
    }

    fn visit_use(
        &mut self,
        ssa: &SsaFunction,
        value: SsaVarId,
        instr: &SsaInstruction,
        queue: &mut VecDeque<SsaVarId>,
    ) -> Result<(), Rejection> {
        let id = instr.id();
        match instr.op() {
            SsaOp::Copy { dest, .. } => {
                queue.push_back(*dest);
                Ok(())
            }
            SsaOp::CastClass {
                dest, target_type, ..
            } => {
                if !self.program.is_subtype(self.class(), target_type.token()) {
                    return Err(self.ineligible(id, "cast to an unrelated type"));
                }
                queue.push_back(*dest);
                Ok(())
            }
            SsaOp::InstanceOf { .. } | SsaOp::BranchNull { .. } => Ok(()),
            SsaOp::MonitorEnter { .. } | SsaOp::MonitorExit { .. } => {
                if self.root.is_singleton() {
                    return Err(self.ineligible(id, "monitor on a shared instance"));
                }
                Ok(())
            }
            SsaOp::LoadField { object, field, .. } if *object == value => {
                self.check_field(field.token(), false, Some(id))
            }
            SsaOp::StoreField {
                object,
                field,
                value: stored,
            } => {
                if *object != value || *stored == value || self.aliases.is_alias(*stored) {
                    return Err(self.ineligible(id, "instance stored into a field"));
                }
                self.check_field(field.token(), true, Some(id))
            }
            SsaOp::Call {
                dest,
                kind,
                method,
                args,
            } => self.visit_call(ssa, value, id, *dest, *kind, method.token(), args, queue),
            SsaOp::Return { .. } => Err(self.ineligible(id, "instance returned")),
            SsaOp::Throw { .. } => Err(self.ineligible(id, "instance thrown")),
            SsaOp::StoreStaticField { .. } => {
                Err(self.ineligible(id, "instance stored into a static field"))
            }
            _ => Err(self.ineligible(id, "unsupported use of the instance")),
        }
    }

    /// Checks an access to `field` of the instance. `site` is the accessing
    /// instruction for uses in the method itself.
    fn check_field(
        &self,
        field: Token,
        write: bool,
        site: Option<InstrId>,
    ) -> Result<(), Rejection> {
        let at = site.unwrap_or(self.root.instr);
        let Some(def) = self.program.field(field) else {
            return Err(self.ineligible(at, "field does not resolve"));
        };
        if def.is_static() {
            return Err(self.ineligible(at, "static field accessed through the instance"));
        }
        if !self.program.instance_fields(self.class()).contains(&field) {
            return Err(self.ineligible(at, "field of another class"));
        }
        if let (Some(_), Some(caller)) = (site, self.caller_class) {
            if !self.program.is_field_accessible(field, caller) {
                return Err(self.ineligible(at, "inaccessible field"));
            }
        }
        if let RootKind::Singleton { facts, .. } = &self.root.kind {
            if write {
                return Err(self.ineligible(at, "write to a shared instance"));
            }
            if facts.value_of(field).is_none() {
                return Err(Rejection::SingletonState(field));
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_call(
        &mut self,
        ssa: &SsaFunction,
        value: SsaVarId,
        id: InstrId,
        dest: Option<SsaVarId>,
        kind: CallKind,
        method: Token,
        args: &[SsaVarId],
        queue: &mut VecDeque<SsaVarId>,
    ) -> Result<(), Rejection> {
        let positions: Vec<usize> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| **a == value || self.aliases.is_alias(**a))
            .map(|(i, _)| i)
            .collect();
        let as_receiver = kind.has_receiver() && positions.first() == Some(&0);

        if as_receiver && positions.len() > 1 {
            return Err(self.ineligible(id, "instance passed as receiver and argument"));
        }
        let result_used = dest.is_some_and(|d| !ssa.uses_of(d).is_empty());

        if as_receiver {
            self.visit_receiver_call(id, dest, result_used, method, queue)
        } else {
            self.visit_argument_call(ssa, id, dest, kind, method, args, &positions)
        }
    }

    fn visit_receiver_call(
        &mut self,
        id: InstrId,
        dest: Option<SsaVarId>,
        result_used: bool,
        method: Token,
        queue: &mut VecDeque<SsaVarId>,
    ) -> Result<(), Rejection> {
        let class = self.class();
        let target = self
            .program
            .resolve_virtual(class, method)
            .ok_or(Rejection::UnresolvedCall(method))?;
        if let Some(caller) = self.caller_class {
            if !self.program.is_method_accessible(target, caller) {
                return Err(self.ineligible(id, "inaccessible method"));
            }
        }
        let Some(def) = self.program.method(target) else {
            return Err(Rejection::UnresolvedCall(target));
        };

        if def.is_constructor() {
            if self.root.is_singleton() {
                return Err(self.ineligible(id, "constructor called on a shared instance"));
            }
            if def.owner != class {
                return Err(self.ineligible(id, "constructor of another class"));
            }
            if !self.plan.set_constructor(id) {
                return Err(Rejection::Construction("instance constructed twice"));
            }
            return self.check_constructor_chain(target, CallSite::Existing(id));
        }

        self.check_receiver_method(
            target,
            CallSite::Existing(id),
            InlineeKind::Direct,
            result_used,
            0,
        )?;

        let Some(dest) = dest.filter(|_| result_used) else {
            return Ok(());
        };
        let returns_receiver = self
            .ctx
            .with_summary(target, |s| s.returns_receiver)
            .unwrap_or(false);
        if returns_receiver {
            let ctx = self.ctx;
            self.aliases.add_deferred_check(
                dest,
                Box::new(move || {
                    ctx.with_summary(target, |s| s.returns_receiver)
                        .unwrap_or(false)
                }),
            );
            queue.push_back(dest);
        } else if !self.aliases.add_illegal_alias(dest) {
            return Err(Rejection::IllegalAlias(dest));
        }
        Ok(())
    }

    /// Whether `var` is proven non-null: an allocation, a non-null constant,
    /// the receiver of an instance method, or copies, casts and phis of those.
    fn is_never_null(&self, ssa: &SsaFunction, var: SsaVarId) -> bool {
        let instance_method = self.program.method(self.method).is_some_and(|m| !m.is_static());
        let mut seen = FxHashSet::default();
        let mut pending = vec![var];
        while let Some(v) = pending.pop() {
            if !seen.insert(v) {
                continue;
            }
            match ssa.definition(v) {
                Some(DefSite::Entry) => {
                    if !(instance_method && ssa.argument(0) == Some(v)) {
                        return false;
                    }
                }
                Some(DefSite::Phi { block, index }) => {
                    let Some(phi) = ssa.block(block).and_then(|b| b.phi(index)) else {
                        return false;
                    };
                    pending.extend(phi.used_variables());
                }
                Some(DefSite::Instruction { .. }) => match ssa.defining_op(v) {
                    Some(SsaOp::NewInstance { .. }) => {}
                    Some(SsaOp::Const { value, .. }) if !value.is_null() => {}
                    Some(SsaOp::Copy { src, .. }) => pending.push(*src),
                    Some(SsaOp::CastClass { object, .. }) => pending.push(*object),
                    _ => return false,
                },
                None => return false,
            }
        }
        true
    }

    #[allow(clippy::too_many_arguments)]
    fn visit_argument_call(
        &mut self,
        ssa: &SsaFunction,
        id: InstrId,
        dest: Option<SsaVarId>,
        kind: CallKind,
        method: Token,
        args: &[SsaVarId],
        positions: &[usize],
    ) -> Result<(), Rejection> {
        let target = self
            .program
            .resolve_single_target(kind, method)
            .ok_or(Rejection::UnresolvedCall(method))?;
        if self.program.method(target).is_some_and(|m| m.is_constructor()) {
            return Err(self.ineligible(id, "instance passed to a constructor"));
        }
        let summary = self
            .ctx
            .summary(target)
            .ok_or(Rejection::UnresolvedCall(target))?;

        let usages: Vec<&ParameterUsage> =
            positions.iter().map(|&k| summary.parameter(k)).collect();
        if usages.iter().all(|u| matches!(u, ParameterUsage::Unused)) {
            for &k in positions {
                self.plan.add_null_argument(id, k);
            }
            return Ok(());
        }

        // The inlined body drops the null check the call made on its receiver
        if kind.has_receiver()
            && !args
                .first()
                .is_some_and(|&receiver| self.is_never_null(ssa, receiver))
        {
            return Err(self.ineligible(id, "receiver of the call may be null"));
        }
        self.check_inlinable(target)?;
        for usage in usages {
            match usage {
                ParameterUsage::Unused => {}
                ParameterUsage::Unknown => {
                    return Err(self.ineligible(id, "callee lets the instance escape"));
                }
                ParameterUsage::Used(details) => {
                    if details.returned {
                        return Err(self.ineligible(id, "callee returns the instance"));
                    }
                    self.check_details(details, target, InlineeKind::Indirect, 1)?;
                }
            }
        }
        self.plan
            .add(CallSite::Existing(id), target, InlineeKind::Indirect);

        if let Some(dest) = dest {
            if !self.aliases.add_illegal_alias(dest) {
                return Err(Rejection::IllegalAlias(dest));
            }
        }
        Ok(())
    }

    /// Follows a constructor chain down to the root constructor.
    fn check_constructor_chain(&mut self, ctor: Token, site: CallSite) -> Result<(), Rejection> {
        let class = self.class();
        let mut current = ctor;
        let mut site = site;

        for depth in 0..=self.config.max_chain_depth {
            if current == self.program.root_constructor() {
                self.plan.add(site, current, InlineeKind::Direct);
                return Ok(());
            }
            self.check_inlinable(current)?;
            let summary = self
                .ctx
                .summary(current)
                .ok_or(Rejection::UnresolvedCall(current))?;

            let mut next = None;
            match summary.parameter(0) {
                ParameterUsage::Unknown => {
                    return Err(
                        self.ineligible(self.root.instr, "constructor lets the instance escape")
                    );
                }
                ParameterUsage::Unused => {}
                ParameterUsage::Used(details) => {
                    for &(_, m) in &details.receiver_calls {
                        let resolved = self
                            .program
                            .resolve_virtual(class, m)
                            .ok_or(Rejection::UnresolvedCall(m))?;
                        let is_ctor = self
                            .program
                            .method(resolved)
                            .is_some_and(|def| def.is_constructor());
                        if is_ctor {
                            if next.replace(resolved).is_some() {
                                return Err(Rejection::Construction(
                                    "constructor delegates more than once",
                                ));
                            }
                        } else {
                            self.check_receiver_method(
                                resolved,
                                CallSite::Nested(current),
                                InlineeKind::Direct,
                                true,
                                depth + 1,
                            )?;
                        }
                    }
                    for &f in &details.field_reads {
                        self.check_field(f, false, None)?;
                    }
                    for &f in &details.field_writes {
                        self.check_field(f, true, None)?;
                    }
                }
            }

            self.plan.add(site, current, InlineeKind::Direct);
            let Some(next) = next else {
                return Err(Rejection::Construction(
                    "constructor chain does not reach the root constructor",
                ));
            };
            site = CallSite::Nested(current);
            current = next;
        }
        Err(Rejection::ChainTooDeep(current))
    }

    /// Checks a non-constructor method invoked on the instance.
    fn check_receiver_method(
        &mut self,
        target: Token,
        site: CallSite,
        kind: InlineeKind,
        result_used: bool,
        depth: usize,
    ) -> Result<(), Rejection> {
        if depth > self.config.max_chain_depth {
            return Err(Rejection::ChainTooDeep(target));
        }
        if self.program.method(target).is_some_and(|m| m.is_constructor()) {
            return Err(self.ineligible(self.root.instr, "constructor called on a built instance"));
        }
        self.check_inlinable(target)?;
        let summary = self
            .ctx
            .summary(target)
            .ok_or(Rejection::UnresolvedCall(target))?;

        match summary.parameter(0) {
            ParameterUsage::Unused => {}
            ParameterUsage::Unknown => {
                return Err(self.ineligible(self.root.instr, "method lets the instance escape"));
            }
            ParameterUsage::Used(details) => {
                if details.returned && result_used && !summary.returns_receiver {
                    return Err(self.ineligible(self.root.instr, "method may return the instance"));
                }
                self.check_details(details, target, kind, depth + 1)?;
            }
        }
        self.plan.add(site, target, kind);
        Ok(())
    }

    /// Checks the uses a callee makes of the instance, recursing into the
    /// calls it makes on it.
    fn check_details(
        &mut self,
        details: &UsageDetails,
        holder: Token,
        kind: InlineeKind,
        depth: usize,
    ) -> Result<(), Rejection> {
        if self.root.is_singleton() && details.used_as_lock {
            return Err(self.ineligible(self.root.instr, "monitor on a shared instance"));
        }
        for &f in &details.field_reads {
            self.check_field(f, false, None)?;
        }
        for &f in &details.field_writes {
            self.check_field(f, true, None)?;
        }
        for &(_, m) in &details.receiver_calls {
            let resolved = self
                .program
                .resolve_virtual(self.class(), m)
                .ok_or(Rejection::UnresolvedCall(m))?;
            self.check_receiver_method(resolved, CallSite::Nested(holder), kind, true, depth)?;
        }
        Ok(())
    }

    /// Applies the general inlining rules, and checks that the body only
    /// reaches members the calling class may access once it is inlined.
    fn check_inlinable(&self, target: Token) -> Result<(), Rejection> {
        check_admissible(self.program, self.ctx, self.method, target).map_err(|e| {
            Rejection::Inadmissible {
                callee: target,
                reason: e.to_string(),
            }
        })?;

        let Some(caller) = self.caller_class else {
            return Ok(());
        };
        let Some(body) = self.program.method(target).and_then(|m| m.body.as_ref()) else {
            return Ok(());
        };
        let receiver = receiver_values(body);
        let inaccessible = body.iter_instructions().any(|(_, _, instr)| match instr.op() {
            SsaOp::Call { method, args, .. } => {
                !args.first().is_some_and(|a| receiver.contains(a))
                    && !self.program.is_method_accessible(method.token(), caller)
            }
            SsaOp::LoadStaticField { field, .. } | SsaOp::StoreStaticField { field, .. } => {
                !self.program.is_field_accessible(field.token(), caller)
            }
            SsaOp::LoadField { object, field, .. } | SsaOp::StoreField { object, field, .. } => {
                !receiver.contains(object)
                    && !self.program.is_field_accessible(field.token(), caller)
            }
            _ => false,
        });
        if inaccessible {
            return Err(Rejection::Inadmissible {
                callee: target,
                reason: "body reaches members the caller cannot access".to_string(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for CandidateProcessor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateProcessor")
            .field("method", &self.method)
            .field("root", &self.root)
            .field("state", &self.state)
            .field("aliases", &self.aliases)
            .field("plan", &self.plan)
            .finish_non_exhaustive()
    }
}
