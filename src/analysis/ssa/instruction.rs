//! SSA-form instructions with explicit def/use information.
//!
//! An [`SsaInstruction`] pairs an [`SsaOp`] with an [`InstrId`]. The id is
//! assigned by the owning [`SsaFunction`](crate::analysis::ssa::SsaFunction)
//! and never changes afterwards, so analyses can remember "that call" across
//! block splits, insertions and inlining, where `(block, index)` positions
//! shift. Use [`SsaFunction::locate`](crate::analysis::ssa::SsaFunction::locate)
//! to turn an id back into a position.

use std::fmt;

use crate::analysis::ssa::{SsaOp, SsaVarId};

/// Stable, function-unique handle of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(u32);

impl InstrId {
    /// Placeholder carried by instructions not yet owned by a function.
    pub const UNASSIGNED: InstrId = InstrId(u32::MAX);

    /// Creates an id from its raw value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Returns `true` if no function has numbered this instruction yet.
    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An instruction in SSA form.
///
/// # Examples
///
/// ```rust
/// use dotinline::analysis::ssa::{SsaInstruction, SsaOp, SsaVarId};
///
/// let instr = SsaInstruction::synthetic(SsaOp::Copy {
///     dest: SsaVarId::new(1),
///     src: SsaVarId::new(0),
/// });
/// assert_eq!(instr.def(), Some(SsaVarId::new(1)));
/// assert_eq!(instr.uses(), vec![SsaVarId::new(0)]);
/// ```
#[derive(Debug, Clone)]
pub struct SsaInstruction {
    id: InstrId,
    op: SsaOp,
}

impl SsaInstruction {
    /// Creates an instruction that a function has not numbered yet.
    #[must_use]
    pub fn synthetic(op: SsaOp) -> Self {
        Self {
            id: InstrId::UNASSIGNED,
            op,
        }
    }

    /// Creates an instruction with a known id.
    #[must_use]
    pub fn with_id(id: InstrId, op: SsaOp) -> Self {
        Self { id, op }
    }

    /// Returns the instruction's stable id.
    #[must_use]
    pub const fn id(&self) -> InstrId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: InstrId) {
        self.id = id;
    }

    /// Returns the operation.
    #[must_use]
    pub const fn op(&self) -> &SsaOp {
        &self.op
    }

    /// Returns the operation mutably.
    pub fn op_mut(&mut self) -> &mut SsaOp {
        &mut self.op
    }

    /// Replaces the operation, keeping the id.
    pub fn set_op(&mut self, op: SsaOp) {
        self.op = op;
    }

    /// Returns the variable this instruction defines.
    #[must_use]
    pub fn def(&self) -> Option<SsaVarId> {
        self.op.dest()
    }

    /// Returns the variables this instruction reads.
    #[must_use]
    pub fn uses(&self) -> Vec<SsaVarId> {
        self.op.uses()
    }

    /// Returns `true` if this instruction ends its block.
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        self.op.is_terminator()
    }

    /// Returns `true` if this instruction is a `Nop` placeholder.
    #[must_use]
    pub fn is_nop(&self) -> bool {
        self.op.is_nop()
    }
}

impl fmt::Display for SsaInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instr_id() {
        assert!(InstrId::UNASSIGNED.is_unassigned());
        assert!(!InstrId::new(0).is_unassigned());
        assert_eq!(InstrId::new(4).to_string(), "#4");
    }

    #[test]
    fn test_set_op_keeps_id() {
        let mut instr = SsaInstruction::with_id(
            InstrId::new(3),
            SsaOp::Copy {
                dest: SsaVarId::new(1),
                src: SsaVarId::new(0),
            },
        );
        instr.set_op(SsaOp::Nop);
        assert_eq!(instr.id(), InstrId::new(3));
        assert!(instr.is_nop());
        assert_eq!(instr.def(), None);
    }
}
