//! Dead code elimination pass.
//!
//! This pass performs the cleanup that follows inlining:
//!
//! 1. **Branch folding**: Branches on constants and null tests of fresh
//!    allocations or `null` become jumps
//! 2. **Unreachable block elimination**: Blocks the entry cannot reach are cleared
//! 3. **Phi operand pruning**: Operands from blocks that are no longer
//!    predecessors are dropped
//! 4. **Trampoline skipping**: Edges into blocks that only jump are pointed at
//!    the jump's target, and the emptied blocks are cleared
//! 5. **Trivial phi elimination**: Phis merging a single value are replaced by it
//! 6. **Redundant cast removal**: Casts statically known to succeed become copies
//! 7. **Dead definition elimination**: Unused pure instructions and phis are removed
//!
//! The steps repeat until nothing changes. `Nop`s are compacted at the end.

use std::sync::Arc;

use crate::{
    analysis::ssa::{ConstValue, SsaBlock, SsaCfg, SsaFunction, SsaOp, SsaVarId},
    compiler::{context::CompilerContext, events::EventKind, pass::SsaPass, EventLog},
    metadata::{program::Program, token::Token},
    Result,
};

/// Maximum iterations for the fixed-point loop.
const MAX_ITERATIONS: usize = 100;

/// Dead code elimination pass.
///
/// Removes unreachable blocks and unused definitions to simplify the SSA graph.
/// Uses an iterative algorithm to handle cascading dead code.
#[derive(Debug, Default)]
pub struct DeadCodeEliminationPass;

impl DeadCodeEliminationPass {
    /// Creates a new dead code elimination pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs the cleanup on one body, recording what it did in `changes`.
    ///
    /// Returns the number of changes made.
    pub fn eliminate(
        ssa: &mut SsaFunction,
        method: Token,
        program: &Program,
        changes: &EventLog,
    ) -> usize {
        ssa.recompute_uses();
        let mut total = 0;
        for _ in 0..MAX_ITERATIONS {
            let count = Self::run_iteration(ssa, method, program, changes);
            if count == 0 {
                break;
            }
            total += count;
        }
        if ssa.compact_nops() > 0 && total == 0 {
            total += 1;
        }
        total
    }

    fn run_iteration(
        ssa: &mut SsaFunction,
        method: Token,
        program: &Program,
        changes: &EventLog,
    ) -> usize {
        let mut count = Self::fold_branches(ssa, method, changes);

        let cleared = ssa.clear_unreachable_blocks();
        if cleared > 0 {
            changes
                .record(EventKind::BlockRemoved)
                .method(method)
                .message(format!("cleared {cleared} unreachable blocks"));
        }
        count += cleared + ssa.prune_phi_operands();
        ssa.recompute_uses();

        count += Self::skip_trampolines(ssa, method, changes);
        count += Self::simplify_trivial_phis(ssa, method, changes);
        count += Self::remove_redundant_casts(ssa, method, program, changes);
        count += Self::remove_dead_definitions(ssa, method, changes);
        count
    }

    /// Follows copies back to the value they forward.
    fn resolve(ssa: &SsaFunction, mut var: SsaVarId) -> SsaVarId {
        for _ in 0..ssa.variable_count() {
            match ssa.defining_op(var) {
                Some(SsaOp::Copy { src, .. }) => var = *src,
                _ => break,
            }
        }
        var
    }

    /// Returns the statically known nullness of `var`.
    fn known_null(ssa: &SsaFunction, var: SsaVarId) -> Option<bool> {
        match ssa.defining_op(Self::resolve(ssa, var))? {
            SsaOp::Const { value, .. } => Some(value.is_null()),
            SsaOp::NewInstance { .. } => Some(false),
            _ => None,
        }
    }

    fn fold_branches(ssa: &mut SsaFunction, method: Token, changes: &EventLog) -> usize {
        let mut folds: Vec<(usize, usize)> = Vec::new();
        for (b, block) in ssa.blocks().iter().enumerate() {
            let Some(term) = block.terminator() else {
                continue;
            };
            let taken = match term.op() {
                SsaOp::Branch {
                    condition,
                    true_target,
                    false_target,
                } => match ssa.constant(*condition) {
                    Some(ConstValue::Bool(c)) => Some(if *c { *true_target } else { *false_target }),
                    Some(ConstValue::I32(v)) => Some(if *v != 0 { *true_target } else { *false_target }),
                    _ => None,
                },
                SsaOp::BranchNull {
                    value,
                    test,
                    true_target,
                    false_target,
                } => Self::known_null(ssa, *value).map(|is_null| {
                    if test.evaluate(is_null) {
                        *true_target
                    } else {
                        *false_target
                    }
                }),
                _ => None,
            };
            if let Some(target) = taken {
                folds.push((b, target));
            }
        }

        for &(b, target) in &folds {
            let Some(term) = ssa.block_mut(b).and_then(|blk| blk.terminator_mut()) else {
                continue;
            };
            let dropped: Vec<usize> = term
                .op()
                .successors()
                .into_iter()
                .filter(|s| *s != target)
                .collect();
            term.set_op(SsaOp::Jump { target });
            for succ in dropped {
                if let Some(succ_block) = ssa.block_mut(succ) {
                    for phi in succ_block.phi_nodes_mut() {
                        phi.remove_operand_from(b);
                    }
                }
            }
            changes
                .record(EventKind::BranchFolded)
                .at(method, b)
                .message(format!("B{b} always jumps to B{target}"));
        }
        if !folds.is_empty() {
            ssa.recompute_uses();
        }
        folds.len()
    }

    /// The target of `block` if it holds nothing but a jump.
    fn trampoline_target(block: &SsaBlock) -> Option<usize> {
        if !block.phi_nodes().is_empty() {
            return None;
        }
        let mut live = block.instructions().iter().filter(|i| !i.is_nop());
        match (live.next().map(|i| i.op()), live.next()) {
            (Some(SsaOp::Jump { target }), None) => Some(*target),
            _ => None,
        }
    }

    /// Finds one trampoline whose predecessors can jump straight to its
    /// target. Phis in the target pin the edge, so those are only bypassed
    /// for a single predecessor not already jumping there.
    fn find_trampoline(ssa: &SsaFunction, cfg: &SsaCfg) -> Option<(usize, usize, Vec<usize>)> {
        (1..ssa.block_count()).find_map(|t| {
            if !cfg.is_reachable(t) {
                return None;
            }
            let target = ssa.block(t).and_then(Self::trampoline_target)?;
            if target == t {
                return None;
            }
            let preds = cfg.predecessors(t).to_vec();
            let has_phis = ssa.block(target).is_some_and(|b| b.phi_count() > 0);
            if has_phis {
                let [pred] = preds.as_slice() else {
                    return None;
                };
                if cfg.predecessors(target).contains(pred) {
                    return None;
                }
            }
            Some((t, target, preds))
        })
    }

    fn skip_trampolines(ssa: &mut SsaFunction, method: Token, changes: &EventLog) -> usize {
        let mut count = 0;
        for _ in 0..ssa.block_count() {
            let cfg = SsaCfg::from_ssa(ssa);
            let Some((trampoline, target, preds)) = Self::find_trampoline(ssa, &cfg) else {
                break;
            };
            for &pred in &preds {
                if let Some(block) = ssa.block_mut(pred) {
                    block.redirect_target(trampoline, target);
                }
            }
            if let (Some(block), [pred]) = (ssa.block_mut(target), preds.as_slice()) {
                for phi in block.phi_nodes_mut() {
                    phi.rename_predecessor(trampoline, *pred);
                }
            }
            if let Some(block) = ssa.block_mut(trampoline) {
                block.clear();
            }
            changes
                .record(EventKind::BlockRemoved)
                .at(method, trampoline)
                .message(format!("B{trampoline} only jumped to B{target}"));
            count += 1;
        }
        if count > 0 {
            ssa.recompute_uses();
        }
        count
    }

    fn simplify_trivial_phis(ssa: &mut SsaFunction, method: Token, changes: &EventLog) -> usize {
        let mut count = 0;
        loop {
            let found = ssa.blocks().iter().enumerate().find_map(|(b, block)| {
                block
                    .phi_nodes()
                    .iter()
                    .enumerate()
                    .find_map(|(p, phi)| phi.trivial_value().map(|v| (b, p, phi.result(), v)))
            });
            let Some((block, index, result, value)) = found else {
                break;
            };
            ssa.remove_phi(block, index);
            ssa.replace_uses_including_phis(result, value);
            ssa.recompute_uses();
            changes
                .record(EventKind::PhiSimplified)
                .at(method, block)
                .message(format!("{result} = {value}"));
            count += 1;
        }
        count
    }

    fn remove_redundant_casts(
        ssa: &mut SsaFunction,
        method: Token,
        program: &Program,
        changes: &EventLog,
    ) -> usize {
        let redundant: Vec<_> = ssa
            .iter_instructions()
            .filter_map(|(b, _, instr)| {
                let SsaOp::CastClass {
                    dest,
                    object,
                    target_type,
                } = instr.op()
                else {
                    return None;
                };
                let source = Self::resolve(ssa, *object);
                let known = match ssa.defining_op(source) {
                    Some(SsaOp::NewInstance { class, .. }) => {
                        program.is_subtype(class.token(), target_type.token())
                    }
                    Some(SsaOp::CastClass { target_type: t, .. }) => {
                        program.is_subtype(t.token(), target_type.token())
                    }
                    Some(SsaOp::Const { value, .. }) => value.is_null(),
                    _ => false,
                };
                known.then_some((b, instr.id(), *dest, *object))
            })
            .collect();

        for (b, id, dest, src) in &redundant {
            ssa.replace_instruction_op(*id, SsaOp::Copy {
                dest: *dest,
                src: *src,
            });
            changes
                .record(EventKind::CastRemoved)
                .at(method, *b)
                .message(format!("{dest} = {src}"));
        }
        if !redundant.is_empty() {
            ssa.recompute_uses();
        }
        redundant.len()
    }

    fn remove_dead_definitions(ssa: &mut SsaFunction, method: Token, changes: &EventLog) -> usize {
        let mut count = 0;
        loop {
            let dead_instrs: Vec<_> = ssa
                .iter_instructions()
                .filter(|(_, _, instr)| {
                    instr.op().is_pure()
                        && !instr.is_nop()
                        && instr.def().is_some_and(|d| ssa.uses_of(d).is_empty())
                })
                .map(|(_, _, instr)| instr.id())
                .collect();

            let dead_phi = ssa.blocks().iter().enumerate().find_map(|(b, block)| {
                block.phi_nodes().iter().enumerate().find_map(|(p, phi)| {
                    let only_self = ssa
                        .uses_of(phi.result())
                        .iter()
                        .all(|u| u.is_phi_operand && u.block == b && u.index == p);
                    only_self.then_some((b, p))
                })
            });

            if dead_instrs.is_empty() && dead_phi.is_none() {
                break;
            }
            for id in &dead_instrs {
                ssa.remove_instruction(*id);
            }
            if let Some((b, p)) = dead_phi {
                ssa.remove_phi(b, p);
                count += 1;
            }
            count += dead_instrs.len();
            ssa.recompute_uses();
        }
        if count > 0 {
            changes
                .record(EventKind::InstructionRemoved)
                .method(method)
                .message(format!("removed {count} dead definitions"));
        }
        count
    }
}

impl SsaPass for DeadCodeEliminationPass {
    fn name(&self) -> &'static str {
        "DeadCodeEliminationPass"
    }

    fn description(&self) -> &'static str {
        "Removes unreachable blocks, trivial phis, redundant casts and unused definitions"
    }

    fn run_on_method(
        &self,
        ssa: &mut SsaFunction,
        method: Token,
        ctx: &CompilerContext,
        program: &Arc<Program>,
    ) -> Result<bool> {
        let changes = EventLog::new();
        let count = Self::eliminate(ssa, method, program, &changes);
        if count > 0 {
            ctx.events.merge(&changes);
        }
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        analysis::ssa::{ConstValue, NullTest, SsaFunctionBuilder, SsaOp},
        compiler::{events::EventKind, EventLog},
        metadata::{
            program::{ClassFlags, Program},
            token::Token,
        },
    };

    use super::DeadCodeEliminationPass;

    #[test]
    fn test_folds_constant_branch_and_clears_dead_block() {
        let program = Program::new();
        let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let c = b.const_bool(true);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| {
                let x = b.const_i32(1);
                b.copy(x);
                b.jump(3);
            });
            f.block(2, |b| b.jump(3));
            f.block(3, |b| {
                b.const_i32(1);
                b.const_i32(2);
                b.ret();
            });
        });

        let log = EventLog::new();
        let changes = DeadCodeEliminationPass::eliminate(&mut ssa, Token::method(1), &program, &log);
        assert!(changes > 0);
        assert!(log.has(EventKind::BranchFolded));
        assert!(log.has(EventKind::BlockRemoved));
        assert!(ssa.block(2).unwrap().is_empty());
        assert!(ssa.validate().is_ok(), "{ssa}");
        // B1 only jumps once its dead copy is gone, so B0 jumps to B3
        assert!(ssa.block(1).unwrap().is_empty());
        assert_eq!(ssa.instruction_count(), 2);
    }

    #[test]
    fn test_trivial_phi_after_pruning() {
        let program = Program::new();
        let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            let (x, y, merged) = (f.var(), f.var(), f.var());
            f.block(0, |b| {
                let c = b.const_bool(false);
                b.branch(c, 1, 2);
            });
            f.block(1, |b| {
                b.op(SsaOp::Const {
                    dest: x,
                    value: ConstValue::I32(1),
                });
                b.jump(3);
            });
            f.block(2, |b| {
                b.op(SsaOp::Const {
                    dest: y,
                    value: ConstValue::I32(2),
                });
                b.jump(3);
            });
            f.block(3, |b| {
                b.phi(merged, &[(1, x), (2, y)]);
                b.ret_val(merged);
            });
        });

        let log = EventLog::new();
        DeadCodeEliminationPass::eliminate(&mut ssa, Token::method(1), &program, &log);
        assert!(log.has(EventKind::PhiSimplified));
        assert_eq!(ssa.phi_count(), 0);
        assert!(ssa.validate().is_ok(), "{ssa}");
        let ret = ssa.block(3).unwrap().terminator().unwrap();
        let SsaOp::Return { value: Some(v) } = ret.op() else {
            panic!("expected return");
        };
        assert_eq!(ssa.constant(*v), Some(&ConstValue::I32(2)));
    }

    #[test]
    fn test_null_test_of_allocation_folds_and_cast_removed() {
        let mut program = Program::new();
        let class = program.add_class("Point", ClassFlags::empty(), None);
        let object = program.object_class();
        let mut ssa = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |b| {
                let p = b.new_instance(class);
                let c = b.cast(p, object);
                b.branch_null(c, NullTest::IsNull, 1, 2);
            });
            f.block(1, |b| b.ret());
            f.block(2, |b| b.ret());
        });

        let log = EventLog::new();
        DeadCodeEliminationPass::eliminate(&mut ssa, Token::method(1), &program, &log);
        assert!(log.has(EventKind::CastRemoved));
        assert!(log.has(EventKind::BranchFolded));
        assert!(ssa.block(1).unwrap().is_empty());
        // The allocation itself may throw and is kept
        assert!(ssa
            .iter_instructions()
            .any(|(_, _, i)| matches!(i.op(), SsaOp::NewInstance { .. })));
        assert!(ssa.validate().is_ok(), "{ssa}");
    }
}
