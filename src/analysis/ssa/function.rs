//! SSA function representation - a complete method in SSA form.
//!
//! An `SsaFunction` is the top-level container for a method's SSA
//! representation. It owns the blocks, the variable table and the argument
//! variables, and hands out the stable [`InstrId`]s transformations use to
//! refer to instructions across structural edits.
//!
//! # Structure
//!
//! ```text
//! SsaFunction
//! ├── blocks: Vec<SsaBlock>       // block 0 is the entry
//! ├── variables: Vec<SsaVariable> // all SSA variables, indexed by SsaVarId
//! ├── arguments: Vec<SsaVarId>    // argument i is defined at entry
//! └── next_instr_id: u32          // id counter for new instructions
//! ```
//!
//! # Editing Model
//!
//! Deleting an instruction turns it into `Nop`, and an unreachable block is
//! cleared rather than removed, so block indices and instruction positions
//! only move on [`SsaFunction::split_block`], [`SsaFunction::insert_instruction`]
//! and [`SsaFunction::compact_nops`]. The def/use lists on [`SsaVariable`] are
//! derived data and are brought up to date by [`SsaFunction::recompute_uses`].

use std::{collections::HashSet, fmt};

use crate::{
    analysis::ssa::{
        ConstValue, DefSite, DominatorTree, InstrId, PhiNode, SsaBlock, SsaCfg, SsaInstruction,
        SsaOp, SsaVarId, SsaVariable, UseSite, VariableOrigin,
    },
    Result,
};

/// A method body in SSA form.
///
/// # Examples
///
/// ```rust
/// use dotinline::analysis::ssa::{SsaBlock, SsaFunction, SsaInstruction, SsaOp};
///
/// let mut func = SsaFunction::new(1);
/// let this = func.argument(0).unwrap();
///
/// let mut entry = SsaBlock::new(0);
/// entry.add_instruction(SsaInstruction::synthetic(SsaOp::Return { value: Some(this) }));
/// func.add_block(entry);
/// func.recompute_uses();
///
/// assert!(func.validate().is_ok());
/// assert_eq!(func.instruction_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SsaFunction {
    blocks: Vec<SsaBlock>,
    variables: Vec<SsaVariable>,
    arguments: Vec<SsaVarId>,
    next_instr_id: u32,
}

impl SsaFunction {
    /// Creates an empty function taking `num_args` arguments.
    ///
    /// The argument variables are allocated first, so argument `i` is `v{i}`.
    #[must_use]
    pub fn new(num_args: usize) -> Self {
        let mut func = Self {
            blocks: Vec::new(),
            variables: Vec::with_capacity(num_args),
            arguments: Vec::with_capacity(num_args),
            next_instr_id: 0,
        };
        for index in 0..num_args {
            let origin = VariableOrigin::Argument(u16::try_from(index).unwrap_or(u16::MAX));
            let var = func.new_variable(origin);
            if let Some(variable) = func.variables.get_mut(var.index()) {
                variable.set_def_site(Some(DefSite::Entry));
            }
            func.arguments.push(var);
        }
        func
    }

    /// Returns the number of arguments, receiver included.
    #[must_use]
    pub fn num_args(&self) -> usize {
        self.arguments.len()
    }

    /// Returns the variable bound to argument `index`.
    #[must_use]
    pub fn argument(&self, index: usize) -> Option<SsaVarId> {
        self.arguments.get(index).copied()
    }

    /// Returns the argument variables in order.
    #[must_use]
    pub fn arguments(&self) -> &[SsaVarId] {
        &self.arguments
    }

    /// Returns all blocks.
    #[must_use]
    pub fn blocks(&self) -> &[SsaBlock] {
        &self.blocks
    }

    /// Returns the number of blocks, cleared ones included.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Returns the block at `index`.
    #[must_use]
    pub fn block(&self, index: usize) -> Option<&SsaBlock> {
        self.blocks.get(index)
    }

    /// Returns the block at `index` mutably.
    pub fn block_mut(&mut self, index: usize) -> Option<&mut SsaBlock> {
        self.blocks.get_mut(index)
    }

    /// Returns the variable table.
    #[must_use]
    pub fn variables(&self) -> &[SsaVariable] {
        &self.variables
    }

    /// Returns the number of variables.
    #[must_use]
    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    /// Returns the metadata of `var`.
    #[must_use]
    pub fn variable(&self, var: SsaVarId) -> Option<&SsaVariable> {
        self.variables.get(var.index())
    }

    /// Allocates a fresh variable.
    pub fn new_variable(&mut self, origin: VariableOrigin) -> SsaVarId {
        let id = SsaVarId::new(self.variables.len());
        self.variables.push(SsaVariable::new(id, origin));
        id
    }

    /// Allocates a fresh temporary, numbered after the existing variables.
    pub fn new_temporary(&mut self) -> SsaVarId {
        let slot = u32::try_from(self.variables.len()).unwrap_or(u32::MAX);
        self.new_variable(VariableOrigin::Stack(slot))
    }

    fn next_id(&mut self) -> InstrId {
        let id = InstrId::new(self.next_instr_id);
        self.next_instr_id += 1;
        id
    }

    /// Appends `block`, returning its index.
    ///
    /// The block is renumbered to its position and every instruction in it
    /// receives a fresh id, which makes it safe to append blocks copied out
    /// of another function.
    pub fn add_block(&mut self, mut block: SsaBlock) -> usize {
        let index = self.blocks.len();
        block.set_id(index);
        for instr in block.instructions_mut() {
            let id = InstrId::new(self.next_instr_id);
            self.next_instr_id += 1;
            instr.set_id(id);
        }
        self.blocks.push(block);
        index
    }

    /// Iterates `(block, index, instruction)` over every instruction.
    pub fn iter_instructions(&self) -> impl Iterator<Item = (usize, usize, &SsaInstruction)> {
        self.blocks.iter().enumerate().flat_map(|(b, block)| {
            block
                .instructions()
                .iter()
                .enumerate()
                .map(move |(i, instr)| (b, i, instr))
        })
    }

    /// Finds the `(block, index)` position of the instruction with `id`.
    #[must_use]
    pub fn locate(&self, id: InstrId) -> Option<(usize, usize)> {
        if id.is_unassigned() {
            return None;
        }
        self.iter_instructions()
            .find(|(_, _, instr)| instr.id() == id)
            .map(|(b, i, _)| (b, i))
    }

    /// Returns the instruction with `id`.
    #[must_use]
    pub fn instruction(&self, id: InstrId) -> Option<&SsaInstruction> {
        let (block, index) = self.locate(id)?;
        self.blocks.get(block)?.instruction(index)
    }

    /// Inserts `op` at `index` in `block`, shifting later instructions.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the position is out of range.
    pub fn insert_instruction(&mut self, block: usize, index: usize, op: SsaOp) -> Result<InstrId> {
        let id = self.next_id();
        let Some(target) = self.blocks.get_mut(block) else {
            return Err(malformed_error!("Block B{} does not exist", block));
        };
        if index > target.instruction_count() {
            return Err(malformed_error!(
                "Instruction index {} out of range for B{}",
                index,
                block
            ));
        }
        target
            .instructions_mut()
            .insert(index, SsaInstruction::with_id(id, op));
        Ok(id)
    }

    /// Appends `op` to the end of `block`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if `block` does not exist.
    pub fn push_instruction(&mut self, block: usize, op: SsaOp) -> Result<InstrId> {
        let index = self
            .blocks
            .get(block)
            .map(SsaBlock::instruction_count)
            .ok_or_else(|| malformed_error!("Block B{} does not exist", block))?;
        self.insert_instruction(block, index, op)
    }

    /// Turns the instruction with `id` into a `Nop`.
    ///
    /// Returns `false` if no such instruction exists.
    pub fn remove_instruction(&mut self, id: InstrId) -> bool {
        self.replace_instruction_op(id, SsaOp::Nop)
    }

    /// Replaces the operation of the instruction with `id`, keeping its id.
    pub fn replace_instruction_op(&mut self, id: InstrId, op: SsaOp) -> bool {
        let Some((block, index)) = self.locate(id) else {
            return false;
        };
        match self
            .blocks
            .get_mut(block)
            .and_then(|b| b.instruction_mut(index))
        {
            Some(instr) => {
                instr.set_op(op);
                true
            }
            None => false,
        }
    }

    /// Rewrites every instruction operand reading `old` to read `new`.
    ///
    /// Phi operands are left alone. Returns the number of operands rewritten.
    /// Use lists are stale until [`recompute_uses`](Self::recompute_uses) runs.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        if old == new {
            return 0;
        }
        let mut count = 0;
        for block in &mut self.blocks {
            for instr in block.instructions_mut() {
                count += instr.op_mut().replace_uses(old, new);
            }
        }
        count
    }

    /// Like [`replace_uses`](Self::replace_uses), but also rewrites phi operands.
    pub fn replace_uses_including_phis(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        if old == new {
            return 0;
        }
        self.blocks
            .iter_mut()
            .map(|block| block.replace_uses(old, new))
            .sum()
    }

    /// Rebuilds every variable's definition site and use list.
    ///
    /// Also numbers instructions that were pushed into blocks directly.
    pub fn recompute_uses(&mut self) {
        for variable in &mut self.variables {
            variable.clear_uses();
            let entry = variable.origin().is_argument()
                && variable.def_site() == Some(DefSite::Entry);
            if !entry {
                variable.set_def_site(None);
            }
        }

        let mut next = self.next_instr_id;
        for (b, block) in self.blocks.iter_mut().enumerate() {
            for instr in block.instructions_mut() {
                if instr.id().is_unassigned() {
                    instr.set_id(InstrId::new(next));
                    next += 1;
                }
            }

            for (p, phi) in block.phi_nodes().iter().enumerate() {
                if let Some(var) = self.variables.get_mut(phi.result().index()) {
                    var.set_def_site(Some(DefSite::phi(b, p)));
                }
                for value in phi.used_variables() {
                    if let Some(var) = self.variables.get_mut(value.index()) {
                        var.add_use(UseSite::phi_operand(b, p));
                    }
                }
            }

            for (i, instr) in block.instructions().iter().enumerate() {
                if let Some(dest) = instr.def() {
                    if let Some(var) = self.variables.get_mut(dest.index()) {
                        var.set_def_site(Some(DefSite::instruction(b, i)));
                    }
                }
                for used in instr.uses() {
                    if let Some(var) = self.variables.get_mut(used.index()) {
                        var.add_use(UseSite::instruction(b, i));
                    }
                }
            }
        }
        self.next_instr_id = next;
    }

    /// Returns the recorded definition site of `var`.
    #[must_use]
    pub fn definition(&self, var: SsaVarId) -> Option<DefSite> {
        self.variable(var).and_then(SsaVariable::def_site)
    }

    /// Returns the operation defining `var`, if an instruction defines it.
    #[must_use]
    pub fn defining_op(&self, var: SsaVarId) -> Option<&SsaOp> {
        match self.definition(var)? {
            DefSite::Instruction { block, index } => {
                let instr = self.blocks.get(block)?.instruction(index)?;
                (instr.def() == Some(var)).then(|| instr.op())
            }
            _ => None,
        }
    }

    /// Returns the constant `var` is bound to, if it is defined by `Const`.
    #[must_use]
    pub fn constant(&self, var: SsaVarId) -> Option<&ConstValue> {
        match self.defining_op(var)? {
            SsaOp::Const { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Returns the recorded use sites of `var`.
    #[must_use]
    pub fn uses_of(&self, var: SsaVarId) -> &[UseSite] {
        self.variable(var).map_or(&[], SsaVariable::uses)
    }

    /// Returns the blocks whose terminator branches to `block`.
    #[must_use]
    pub fn predecessors(&self, block: usize) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter(|(_, b)| b.successors().contains(&block))
            .map(|(p, _)| p)
            .collect()
    }

    /// Splits `block` before instruction `at`.
    ///
    /// Instructions from `at` onwards move to a new block appended at the end;
    /// the original block falls through to it with a `Jump`. Successor phis
    /// that named `block` as predecessor are renamed to the new block.
    /// Returns the new block's index.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] if the position is out of range.
    pub fn split_block(&mut self, block: usize, at: usize) -> Result<usize> {
        let new_index = self.blocks.len();
        let Some(source) = self.blocks.get_mut(block) else {
            return Err(malformed_error!("Block B{} does not exist", block));
        };
        if at > source.instruction_count() {
            return Err(malformed_error!(
                "Split point {} out of range for B{}",
                at,
                block
            ));
        }

        let tail: Vec<SsaInstruction> = source.instructions_mut().split_off(at);
        let jump_id = InstrId::new(self.next_instr_id);
        self.next_instr_id += 1;
        source.add_instruction(SsaInstruction::with_id(
            jump_id,
            SsaOp::Jump { target: new_index },
        ));

        let mut continuation = SsaBlock::new(new_index);
        for instr in tail {
            continuation.add_instruction(instr);
        }
        let successors = continuation.successors();
        self.blocks.push(continuation);

        for succ in successors {
            if let Some(succ_block) = self.blocks.get_mut(succ) {
                for phi in succ_block.phi_nodes_mut() {
                    phi.rename_predecessor(block, new_index);
                }
            }
        }
        Ok(new_index)
    }

    /// Computes the dominator tree of the current CFG.
    #[must_use]
    pub fn dominators(&self) -> DominatorTree {
        DominatorTree::compute(&SsaCfg::from_ssa(self))
    }

    /// Returns the reachability of every block from the entry.
    #[must_use]
    pub fn reachable_blocks(&self) -> Vec<bool> {
        let cfg = SsaCfg::from_ssa(self);
        (0..self.blocks.len()).map(|b| cfg.is_reachable(b)).collect()
    }

    /// Drops phi operands whose predecessor no longer branches to the phi's block.
    ///
    /// Returns the number of operands removed.
    pub fn prune_phi_operands(&mut self) -> usize {
        let cfg = SsaCfg::from_ssa(self);
        let mut removed = 0;
        for (b, block) in self.blocks.iter_mut().enumerate() {
            let preds = cfg.predecessors(b);
            for phi in block.phi_nodes_mut() {
                let before = phi.operand_count();
                phi.operands_mut()
                    .retain(|op| preds.contains(&op.predecessor()));
                removed += before - phi.operand_count();
            }
        }
        removed
    }

    /// Clears every block the entry can no longer reach and prunes the phi
    /// operands flowing in from them.
    ///
    /// Returns the number of blocks cleared.
    pub fn clear_unreachable_blocks(&mut self) -> usize {
        let reachable = self.reachable_blocks();
        let mut cleared = 0;
        for (block, live) in self.blocks.iter_mut().zip(&reachable) {
            if !live && !block.is_empty() {
                block.clear();
                cleared += 1;
            }
        }
        self.prune_phi_operands();
        cleared
    }

    /// Removes the phi at `index` in `block`.
    pub fn remove_phi(&mut self, block: usize, index: usize) -> Option<PhiNode> {
        let phis = self.blocks.get_mut(block)?.phi_nodes_mut();
        (index < phis.len()).then(|| phis.remove(index))
    }

    /// Drops all `Nop` instructions, returning how many were removed.
    ///
    /// Invalidates recorded positions; use lists are refreshed.
    pub fn compact_nops(&mut self) -> usize {
        let removed = self.blocks.iter_mut().map(SsaBlock::remove_nops).sum();
        if removed > 0 {
            self.recompute_uses();
        }
        removed
    }

    /// Returns the number of non-`Nop` instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.iter_instructions()
            .filter(|(_, _, instr)| !instr.is_nop())
            .count()
    }

    /// Returns the number of phi nodes.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.blocks.iter().map(SsaBlock::phi_count).sum()
    }

    /// Checks the structural invariants of the reachable part of the function.
    ///
    /// - every reachable block ends in exactly one terminator
    /// - branch targets name existing blocks
    /// - each variable is defined once and every read variable is defined
    /// - phi operands match the block's predecessors one to one
    /// - every definition dominates its uses
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Malformed`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.blocks.is_empty() {
            return Err(malformed_error!("Function has no blocks"));
        }

        let cfg = SsaCfg::from_ssa(self);
        let dom = DominatorTree::compute(&cfg);

        // Definition positions: (block, Some(index)) for instructions, (block, None) for phis
        let mut defs: Vec<Option<(usize, Option<usize>)>> = vec![None; self.variables.len()];
        let mut is_arg = vec![false; self.variables.len()];
        for arg in &self.arguments {
            if let Some(slot) = is_arg.get_mut(arg.index()) {
                *slot = true;
            }
        }

        let mut record_def = |var: SsaVarId, site: (usize, Option<usize>)| -> Result<()> {
            let index = var.index();
            if index >= defs.len() {
                return Err(malformed_error!("{} is not a known variable", var));
            }
            if is_arg[index] || defs[index].is_some() {
                return Err(malformed_error!("{} is defined more than once", var));
            }
            defs[index] = Some(site);
            Ok(())
        };

        for (b, block) in self.blocks.iter().enumerate() {
            if !cfg.is_reachable(b) {
                continue;
            }

            let live: Vec<&SsaInstruction> =
                block.instructions().iter().filter(|i| !i.is_nop()).collect();
            match live.last() {
                Some(last) if last.is_terminator() => {}
                _ => return Err(malformed_error!("B{} does not end in a terminator", b)),
            }
            if live[..live.len() - 1].iter().any(|i| i.is_terminator()) {
                return Err(malformed_error!("B{} has a terminator before its end", b));
            }
            for target in live.last().map(|t| t.op().successors()).unwrap_or_default() {
                if target >= self.blocks.len() {
                    return Err(malformed_error!("B{} branches to missing B{}", b, target));
                }
            }

            for phi in block.phi_nodes() {
                record_def(phi.result(), (b, None))?;
            }
            for (i, instr) in block.instructions().iter().enumerate() {
                if let Some(dest) = instr.def() {
                    record_def(dest, (b, Some(i)))?;
                }
            }
        }

        let dominated = |var: SsaVarId, block: usize, index: Option<usize>| -> Result<()> {
            let idx = var.index();
            if is_arg.get(idx).copied().unwrap_or(false) {
                return Ok(());
            }
            let Some((def_block, def_index)) = defs.get(idx).copied().flatten() else {
                return Err(malformed_error!("{} is used in B{} but never defined", var, block));
            };
            let ok = if def_block == block {
                match (def_index, index) {
                    (None, _) => true,
                    (Some(_), None) => true,
                    (Some(d), Some(u)) => d < u,
                }
            } else {
                dom.dominates(def_block, block)
            };
            if ok {
                Ok(())
            } else {
                Err(malformed_error!(
                    "Definition of {} does not dominate its use in B{}",
                    var,
                    block
                ))
            }
        };

        for (b, block) in self.blocks.iter().enumerate() {
            if !cfg.is_reachable(b) {
                continue;
            }

            let preds: HashSet<usize> = cfg.predecessors(b).iter().copied().collect();
            for phi in block.phi_nodes() {
                let mut seen = HashSet::new();
                for operand in phi.operands() {
                    let pred = operand.predecessor();
                    if !preds.contains(&pred) {
                        return Err(malformed_error!(
                            "Phi {} in B{} has an operand from non-predecessor B{}",
                            phi.result(),
                            b,
                            pred
                        ));
                    }
                    if !seen.insert(pred) {
                        return Err(malformed_error!(
                            "Phi {} in B{} has two operands from B{}",
                            phi.result(),
                            b,
                            pred
                        ));
                    }
                    // Operand must be available at the end of the predecessor
                    dominated(operand.value(), pred, None)?;
                }
                if seen.len() != preds.len() {
                    return Err(malformed_error!(
                        "Phi {} in B{} is missing operands",
                        phi.result(),
                        b
                    ));
                }
            }

            for (i, instr) in block.instructions().iter().enumerate() {
                for used in instr.uses() {
                    dominated(used, b, Some(i))?;
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for SsaFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn(")?;
        for (i, arg) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        writeln!(f, ")")?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analysis::ssa::SsaFunctionBuilder, Error};

    #[test]
    fn test_new_allocates_arguments() {
        let func = SsaFunction::new(3);
        assert_eq!(func.num_args(), 3);
        assert_eq!(func.argument(2), Some(SsaVarId::new(2)));
        assert_eq!(func.definition(SsaVarId::new(0)), Some(DefSite::Entry));
        assert_eq!(func.argument(3), None);
    }

    #[test]
    fn test_add_block_assigns_fresh_ids() {
        let mut func = SsaFunction::new(0);
        let mut block = SsaBlock::new(9);
        block.add_instruction(SsaInstruction::with_id(
            InstrId::new(42),
            SsaOp::Return { value: None },
        ));
        assert_eq!(func.add_block(block), 0);
        assert_eq!(func.block(0).map(SsaBlock::id), Some(0));
        assert!(func.locate(InstrId::new(0)).is_some());
        assert!(func.locate(InstrId::new(42)).is_none());
    }

    #[test]
    fn test_split_block_renames_phi_predecessors() {
        let mut func = SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            let merged = f.var();
            f.block(0, |blk| {
                blk.copy(a);
                blk.jump(2);
            });
            f.block(1, |blk| blk.jump(2));
            f.block(2, |blk| {
                blk.phi(merged, &[(0, a), (1, b)]);
                blk.ret_val(merged);
            });
        });

        let new_block = func.split_block(0, 1).unwrap();
        func.recompute_uses();
        assert_eq!(new_block, 3);
        assert_eq!(func.block(0).unwrap().successors(), vec![3]);
        let phi = &func.block(2).unwrap().phi_nodes()[0];
        assert!(phi.operand_from(3).is_some());
        assert!(phi.operand_from(0).is_none());
        assert!(func.validate().is_ok());
    }

    #[test]
    fn test_clear_unreachable_blocks_prunes_phis() {
        let mut func = SsaFunctionBuilder::new(2).build_with(|f| {
            let (a, b) = (f.arg(0), f.arg(1));
            let merged = f.var();
            f.block(0, |blk| blk.jump(2));
            f.block(1, |blk| blk.jump(2));
            f.block(2, |blk| {
                blk.phi(merged, &[(0, a), (1, b)]);
                blk.ret_val(merged);
            });
        });

        assert_eq!(func.clear_unreachable_blocks(), 1);
        assert!(func.block(1).unwrap().is_empty());
        assert_eq!(func.block(2).unwrap().phi_nodes()[0].operand_count(), 1);
    }

    #[test]
    fn test_validate_rejects_use_before_def() {
        let mut func = SsaFunction::new(0);
        let v = func.new_variable(VariableOrigin::Stack(0));
        let mut block = SsaBlock::new(0);
        block.add_instruction(SsaInstruction::synthetic(SsaOp::Return { value: Some(v) }));
        block.add_instruction(SsaInstruction::synthetic(SsaOp::Const {
            dest: v,
            value: ConstValue::I32(1),
        }));
        func.add_block(block);

        assert!(matches!(func.validate(), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_validate_rejects_missing_phi_operand() {
        let func = SsaFunctionBuilder::new(2).build_with(|f| {
            let (cond, a) = (f.arg(0), f.arg(1));
            let merged = f.var();
            f.block(0, |blk| blk.branch(cond, 1, 2));
            f.block(1, |blk| blk.jump(2));
            f.block(2, |blk| {
                blk.phi(merged, &[(1, a)]);
                blk.ret_val(merged);
            });
        });
        assert!(func.validate().is_err());
    }

    #[test]
    fn test_insert_remove_and_compact() {
        let mut func = SsaFunctionBuilder::new(0).build_with(|f| {
            f.block(0, |blk| blk.ret());
        });
        let dest = func.new_variable(VariableOrigin::Stack(0));
        let id = func
            .insert_instruction(
                0,
                0,
                SsaOp::Const {
                    dest,
                    value: ConstValue::I32(4),
                },
            )
            .unwrap();
        func.recompute_uses();
        assert_eq!(func.locate(id), Some((0, 0)));
        assert_eq!(func.constant(dest), Some(&ConstValue::I32(4)));

        assert!(func.remove_instruction(id));
        assert_eq!(func.instruction_count(), 1);
        assert_eq!(func.compact_nops(), 1);
        assert!(func.locate(id).is_none());
        assert!(func.insert_instruction(5, 0, SsaOp::Nop).is_err());
    }
}
