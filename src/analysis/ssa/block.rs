//! Basic blocks: a run of phis followed by a run of instructions.
//!
//! # Block Structure
//!
//! ```text
//! B3:
//!   // Phis read their operands on the edge that entered the block
//!   v3 = phi(v1 from B1, v2 from B2)
//!
//!   // Then the instructions, in order
//!   v4 = v0.0x04000001
//!   v5 = add v3, v4
//!   ret v5
//! ```
//!
//! A well-formed block ends with exactly one terminator. Transformations that
//! delete instructions replace them with `Nop` instead of shifting the list,
//! so indices recorded by an analysis stay valid until the next
//! [`SsaFunction::compact_nops`](crate::analysis::ssa::SsaFunction::compact_nops).

use std::fmt;

use crate::analysis::ssa::{PhiNode, SsaInstruction, SsaOp, SsaVarId};

/// An SSA basic block with phi nodes and instructions.
#[derive(Debug, Clone)]
pub struct SsaBlock {
    id: usize,
    phi_nodes: Vec<PhiNode>,
    instructions: Vec<SsaInstruction>,
}

impl SsaBlock {
    /// Creates a new empty SSA block.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            phi_nodes: Vec::new(),
            instructions: Vec::new(),
        }
    }

    /// Returns the block index.
    #[must_use]
    pub const fn id(&self) -> usize {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: usize) {
        self.id = id;
    }

    /// Returns the phi nodes.
    #[must_use]
    pub fn phi_nodes(&self) -> &[PhiNode] {
        &self.phi_nodes
    }

    /// Returns the phi nodes mutably.
    pub fn phi_nodes_mut(&mut self) -> &mut Vec<PhiNode> {
        &mut self.phi_nodes
    }

    /// Returns the instructions in execution order.
    #[must_use]
    pub fn instructions(&self) -> &[SsaInstruction] {
        &self.instructions
    }

    /// Returns the instructions mutably.
    pub fn instructions_mut(&mut self) -> &mut Vec<SsaInstruction> {
        &mut self.instructions
    }

    /// Returns the number of phi nodes.
    #[must_use]
    pub fn phi_count(&self) -> usize {
        self.phi_nodes.len()
    }

    /// Returns the number of instructions, `Nop`s included.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Returns `true` if the block has neither phis nor instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.phi_nodes.is_empty() && self.instructions.is_empty()
    }

    /// Appends a phi node.
    pub fn add_phi(&mut self, phi: PhiNode) {
        self.phi_nodes.push(phi);
    }

    /// Appends an instruction.
    pub fn add_instruction(&mut self, instr: SsaInstruction) {
        self.instructions.push(instr);
    }

    /// Returns the phi at `index`.
    #[must_use]
    pub fn phi(&self, index: usize) -> Option<&PhiNode> {
        self.phi_nodes.get(index)
    }

    /// Returns the phi at `index` mutably.
    pub fn phi_mut(&mut self, index: usize) -> Option<&mut PhiNode> {
        self.phi_nodes.get_mut(index)
    }

    /// Returns the instruction at `index`.
    #[must_use]
    pub fn instruction(&self, index: usize) -> Option<&SsaInstruction> {
        self.instructions.get(index)
    }

    /// Returns the instruction at `index` mutably.
    pub fn instruction_mut(&mut self, index: usize) -> Option<&mut SsaInstruction> {
        self.instructions.get_mut(index)
    }

    /// Returns the last non-`Nop` instruction if it is a terminator.
    #[must_use]
    pub fn terminator(&self) -> Option<&SsaInstruction> {
        self.instructions
            .iter()
            .rev()
            .find(|i| !i.is_nop())
            .filter(|i| i.is_terminator())
    }

    /// Returns the mutable terminator, if any.
    pub fn terminator_mut(&mut self) -> Option<&mut SsaInstruction> {
        self.instructions
            .iter_mut()
            .rev()
            .find(|i| !i.is_nop())
            .filter(|i| i.is_terminator())
    }

    /// Returns the successor block indices.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        self.terminator()
            .map(|t| t.op().successors())
            .unwrap_or_default()
    }

    /// Finds the phi defining `var`.
    #[must_use]
    pub fn find_phi_defining(&self, var: SsaVarId) -> Option<&PhiNode> {
        self.phi_nodes.iter().find(|p| p.result() == var)
    }

    /// Drops every phi and instruction.
    ///
    /// Used for unreachable blocks, which stay in place so block indices held
    /// by branch targets and phi operands remain valid.
    pub fn clear(&mut self) {
        self.phi_nodes.clear();
        self.instructions.clear();
    }

    /// Rewrites operand `old` to `new` in phis and instructions.
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let mut count = 0;
        for phi in &mut self.phi_nodes {
            count += phi.replace_value(old, new);
        }
        for instr in &mut self.instructions {
            count += instr.op_mut().replace_uses(old, new);
        }
        count
    }

    /// Points every branch edge to `old` at `new` instead.
    pub fn redirect_target(&mut self, old: usize, new: usize) {
        if let Some(term) = self.terminator_mut() {
            term.op_mut()
                .remap_targets(|t| if t == old { new } else { t });
        }
    }

    /// Drops `Nop` instructions.
    ///
    /// Returns the number removed.
    pub fn remove_nops(&mut self) -> usize {
        let before = self.instructions.len();
        self.instructions
            .retain(|i| !matches!(i.op(), SsaOp::Nop));
        before - self.instructions.len()
    }
}

impl fmt::Display for SsaBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "B{}:", self.id)?;

        for phi in &self.phi_nodes {
            writeln!(f, "  {phi}")?;
        }

        for instr in &self.instructions {
            writeln!(f, "  {instr}")?;
        }

        Ok(())
    }
}
