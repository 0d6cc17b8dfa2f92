//! General-purpose method inlining.
//!
//! This module provides the call-site substitution primitive every inlining
//! transformation in the crate builds on, plus a threshold-based pass that
//! inlines small methods on its own.
//!
//! # Substitution
//!
//! [`inline_call_site`] copies a callee's blocks into the caller:
//!
//! 1. The caller block is split after the call; the tail becomes the
//!    continuation block.
//! 2. Callee variables are renamed into fresh caller variables, callee
//!    arguments are bound to the call operands, and block targets are offset.
//! 3. Every `return` becomes a jump to the continuation.
//! 4. A single returned value replaces the call result. Several returns are
//!    merged by a phi in the continuation that defines the call result.
//!
//! # Admissibility
//!
//! [`check_admissible`] applies the generic safety rules: the callee needs a
//! body, must not be native, abstract or self-recursive, must not be the
//! caller, must not be excluded by policy or flagged `NEVER_INLINE`, and its
//! entry block must have no phis.

use std::{ops::Range, sync::Arc};

use rustc_hash::FxHashMap;

use crate::{
    analysis::ssa::{
        CallKind, InstrId, PhiNode, PhiOperand, SsaFunction, SsaOp, SsaVarId, VariableOrigin,
    },
    compiler::{context::CompilerContext, events::EventKind, pass::SsaPass},
    metadata::{
        program::{MethodFlags, Program},
        token::Token,
    },
    Error, Result,
};

/// Upper bound on call sites one run of [`InliningPass`] inlines in a method.
const MAX_INLINES_PER_RUN: usize = 32;

/// Where an inlined body landed in the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlinedCall {
    /// Caller block holding the copy of the callee's entry block.
    pub entry: usize,
    /// Block that continues after the former call.
    pub continuation: usize,
    /// Caller blocks holding the copied callee blocks.
    pub blocks: Range<usize>,
    /// Number of return sites turned into jumps.
    pub returns: usize,
}

fn rejected(callee: Token, reason: &str) -> Error {
    Error::InlineRejected {
        callee,
        reason: reason.to_string(),
    }
}

/// Checks the generic inlining safety rules for calling `callee` from `caller`.
///
/// # Errors
///
/// Returns [`Error::InlineRejected`] naming the first rule the callee breaks,
/// or [`Error::MethodNotFound`] if it does not resolve.
pub fn check_admissible(
    program: &Program,
    ctx: &CompilerContext,
    caller: Token,
    callee: Token,
) -> Result<()> {
    let def = program.resolve_method(callee)?;

    if callee == caller {
        return Err(rejected(callee, "callee is the caller"));
    }
    if def.flags.intersects(MethodFlags::NATIVE | MethodFlags::ABSTRACT) {
        return Err(rejected(callee, "callee is native or abstract"));
    }
    if def.flags.contains(MethodFlags::NEVER_INLINE) {
        return Err(rejected(callee, "callee is flagged never-inline"));
    }
    if ctx.no_inline.contains(&callee) {
        return Err(rejected(callee, "callee is excluded by policy"));
    }
    let Some(body) = def.body.as_ref() else {
        return Err(rejected(callee, "callee has no body"));
    };
    if ctx
        .with_summary(callee, |s| s.is_recursive)
        .unwrap_or(false)
    {
        return Err(rejected(callee, "callee is recursive"));
    }
    if body.block(0).is_some_and(|entry| entry.phi_count() > 0) {
        return Err(rejected(callee, "callee entry block has phis"));
    }
    Ok(())
}

/// Returns `true` if `callee` may be inlined into `caller`.
#[must_use]
pub fn is_admissible(program: &Program, ctx: &CompilerContext, caller: Token, callee: Token) -> bool {
    check_admissible(program, ctx, caller, callee).is_ok()
}

/// Replaces the call instruction `call` in `caller` with the body of `callee`.
///
/// Use lists of `caller` are recomputed before returning.
///
/// # Errors
///
/// Returns [`Error::Malformed`] if `call` is not a call in `caller`, the
/// argument count does not match, the callee has no blocks, or the call
/// result is used while a callee return carries no value. The caller is
/// not modified in those cases.
pub fn inline_call_site(
    caller: &mut SsaFunction,
    call: InstrId,
    callee: &SsaFunction,
) -> Result<InlinedCall> {
    let (block, index) = caller
        .locate(call)
        .ok_or_else(|| malformed_error!("Call {} not found in caller", call))?;
    let Some(SsaOp::Call { dest, args, .. }) = caller
        .block(block)
        .and_then(|b| b.instruction(index))
        .map(|i| i.op().clone())
    else {
        return Err(malformed_error!("Instruction {} is not a call", call));
    };

    if args.len() != callee.num_args() {
        return Err(malformed_error!(
            "Call passes {} arguments, callee takes {}",
            args.len(),
            callee.num_args()
        ));
    }
    if callee.block_count() == 0 {
        return Err(malformed_error!("Callee has no blocks"));
    }
    if dest.is_some()
        && callee
            .iter_instructions()
            .any(|(_, _, i)| matches!(i.op(), SsaOp::Return { value: None }))
    {
        return Err(malformed_error!("Call result is used but callee returns void"));
    }

    let continuation = caller.split_block(block, index + 1)?;
    let offset = caller.block_count();

    let mut var_map: FxHashMap<SsaVarId, SsaVarId> = callee
        .arguments()
        .iter()
        .copied()
        .zip(args.iter().copied())
        .collect();
    for variable in callee.variables() {
        if var_map.contains_key(&variable.id()) {
            continue;
        }
        let fresh = if variable.origin().is_phi() {
            caller.new_variable(VariableOrigin::Phi)
        } else {
            caller.new_temporary()
        };
        var_map.insert(variable.id(), fresh);
    }
    let rename = |v: SsaVarId| var_map.get(&v).copied().unwrap_or(v);

    let mut returns: Vec<(usize, Option<SsaVarId>)> = Vec::new();
    for (callee_index, callee_block) in callee.blocks().iter().enumerate() {
        let mut copy = callee_block.clone();
        for phi in copy.phi_nodes_mut() {
            phi.set_result(rename(phi.result()));
            let operands: Vec<PhiOperand> = phi
                .operands()
                .iter()
                .map(|op| PhiOperand::new(rename(op.value()), op.predecessor() + offset))
                .collect();
            *phi.operands_mut() = operands;
        }
        for instr in copy.instructions_mut() {
            let op = instr.op_mut();
            op.remap_variables(rename);
            op.remap_targets(|t| t + offset);
            if let SsaOp::Return { value } = op {
                returns.push((offset + callee_index, *value));
                *op = SsaOp::Jump {
                    target: continuation,
                };
            }
        }
        caller.add_block(copy);
    }

    // The call disappears and its block now enters the callee body
    if let Some(call_block) = caller.block_mut(block) {
        if let Some(instr) = call_block.instruction_mut(index) {
            instr.set_op(SsaOp::Nop);
        }
        if let Some(jump) = call_block.terminator_mut() {
            jump.set_op(SsaOp::Jump { target: offset });
        }
    }

    if let Some(result) = dest {
        let values: Vec<(usize, SsaVarId)> = returns
            .iter()
            .filter_map(|(b, v)| v.map(|v| (*b, v)))
            .collect();
        match values.as_slice() {
            [] => {}
            [(_, value)] => {
                caller.replace_uses_including_phis(result, *value);
            }
            _ => {
                let mut phi = PhiNode::new(result, VariableOrigin::Phi);
                for (pred, value) in &values {
                    phi.add_operand(PhiOperand::new(*value, *pred));
                }
                if let Some(cont) = caller.block_mut(continuation) {
                    cont.add_phi(phi);
                }
            }
        }
    }

    caller.recompute_uses();

    Ok(InlinedCall {
        entry: offset,
        continuation,
        blocks: offset..offset + callee.block_count(),
        returns: returns.len(),
    })
}

/// Pass that inlines small methods at their call sites.
///
/// Callees come from the original program, so the result does not depend on
/// the order in which the scheduler processes methods.
#[derive(Debug)]
pub struct InliningPass {
    /// Maximum instruction count for inlining candidates.
    inline_threshold: usize,
}

impl Default for InliningPass {
    fn default() -> Self {
        Self::new()
    }
}

impl InliningPass {
    /// Creates a new inlining pass with default threshold (20 instructions).
    #[must_use]
    pub fn new() -> Self {
        Self {
            inline_threshold: 20,
        }
    }

    /// Creates a new inlining pass with a custom threshold.
    #[must_use]
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            inline_threshold: threshold,
        }
    }

    /// Finds the next call site worth inlining.
    fn find_candidate(
        &self,
        ssa: &SsaFunction,
        caller: Token,
        ctx: &CompilerContext,
        program: &Program,
    ) -> Option<(InstrId, Token)> {
        ssa.iter_instructions().find_map(|(_, _, instr)| {
            let SsaOp::Call { kind, method, .. } = instr.op() else {
                return None;
            };
            let target = match kind {
                CallKind::Static | CallKind::Direct => Some(method.token()),
                CallKind::Virtual | CallKind::Interface => {
                    program.resolve_single_target(*kind, method.token())
                }
            }?;
            let small = ctx
                .estimated_size(target)
                .is_some_and(|size| size <= self.inline_threshold);
            (small && is_admissible(program, ctx, caller, target)).then_some((instr.id(), target))
        })
    }
}

impl SsaPass for InliningPass {
    fn name(&self) -> &'static str {
        "InliningPass"
    }

    fn description(&self) -> &'static str {
        "Inlines small methods at their call sites"
    }

    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: Token,
        ctx: &CompilerContext,
        program: &Arc<Program>,
    ) -> Result<bool> {
        let mut inlined = 0;
        while inlined < MAX_INLINES_PER_RUN {
            let Some((call, target)) = self.find_candidate(ssa, method, ctx, program) else {
                break;
            };
            let Some(body) = program.method(target).and_then(|m| m.body.as_ref()) else {
                break;
            };
            let placed = inline_call_site(ssa, call, body)?;
            ctx.mark_inlined(target);
            ctx.events
                .record(EventKind::MethodInlined)
                .at(method, placed.entry)
                .pass(self.name())
                .message(format!("inlined {target}"));
            inlined += 1;
        }
        Ok(inlined > 0)
    }
}
