//! Size budget for the methods a candidate forces inline.
//!
//! Inlining a direct callee into a scalarized object costs less than its
//! size: reads and writes of the receiver's fields turn into plain SSA
//! values and the returns turn into jumps that later cleanup folds away.
//! An indirect callee is charged in full, since the call site it lands in
//! does not exist yet when the budget is checked.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::{
    analysis::ssa::{SsaFunction, SsaOp, SsaVarId},
    compiler::{
        context::CompilerContext,
        passes::classinliner::plan::{InlineeKind, InliningPlan, PlannedCall},
    },
    metadata::program::Program,
};

/// Values in `body` holding its receiver: argument 0 and its copies and casts.
#[must_use]
pub fn receiver_values(body: &SsaFunction) -> FxHashSet<SsaVarId> {
    let mut values = FxHashSet::default();
    let Some(this) = body.argument(0) else {
        return values;
    };
    values.insert(this);
    let mut queue = VecDeque::from([this]);
    while let Some(value) = queue.pop_front() {
        for site in body.uses_of(value) {
            if site.is_phi_operand {
                continue;
            }
            let Some(instr) = body.block(site.block).and_then(|b| b.instruction(site.index)) else {
                continue;
            };
            match instr.op() {
                SsaOp::Copy { dest, src } if *src == value => {
                    if values.insert(*dest) {
                        queue.push_back(*dest);
                    }
                }
                SsaOp::CastClass { dest, object, .. } if *object == value => {
                    if values.insert(*dest) {
                        queue.push_back(*dest);
                    }
                }
                _ => {}
            }
        }
    }
    values
}

/// Counts the instructions of `body` that vanish once its receiver is
/// scalarized: receiver field accesses and returns.
#[must_use]
pub fn non_materializing(body: &SsaFunction) -> usize {
    let receiver = receiver_values(body);
    body.iter_instructions()
        .filter(|(_, _, instr)| match instr.op() {
            SsaOp::LoadField { object, .. } | SsaOp::StoreField { object, .. } => {
                receiver.contains(object)
            }
            SsaOp::Return { .. } => true,
            _ => false,
        })
        .count()
}

/// Accumulating cost estimate for one candidate.
#[derive(Debug, Clone)]
pub struct CostAnalyzer {
    allowance: usize,
    bypass: bool,
    estimated_cost: usize,
    counted: usize,
}

impl CostAnalyzer {
    /// Creates an analyzer with the given instruction allowance.
    ///
    /// With `bypass` set the budget is never exceeded.
    #[must_use]
    pub fn new(allowance: usize, bypass: bool) -> Self {
        Self {
            allowance,
            bypass,
            estimated_cost: 0,
            counted: 0,
        }
    }

    /// Returns the cost accumulated so far.
    #[must_use]
    pub fn estimated_cost(&self) -> usize {
        self.estimated_cost
    }

    /// Returns the instruction allowance.
    #[must_use]
    pub fn allowance(&self) -> usize {
        self.allowance
    }

    /// Charges the calls added to `plan` since the previous check and
    /// reports whether the total is over the allowance.
    pub fn exceeds_budget(
        &mut self,
        plan: &InliningPlan,
        program: &Program,
        ctx: &CompilerContext,
    ) -> bool {
        for call in plan.calls().iter().skip(self.counted) {
            let cost = Self::inlinee_cost(call, program, ctx);
            self.estimated_cost = self.estimated_cost.saturating_add(cost);
        }
        self.counted = plan.len();
        !self.bypass && self.estimated_cost > self.allowance
    }

    fn inlinee_cost(call: &PlannedCall, program: &Program, ctx: &CompilerContext) -> usize {
        let size = ctx.estimated_size(call.target).unwrap_or(usize::MAX);
        match call.kind {
            InlineeKind::Indirect => size.max(1),
            InlineeKind::Direct => program
                .method(call.target)
                .and_then(|m| m.body.as_ref())
                .map_or(size, |body| {
                    body.instruction_count()
                        .saturating_sub(non_materializing(body))
                })
                .max(1),
        }
    }
}
