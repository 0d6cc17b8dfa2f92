//! Phi nodes merge values where control flow joins.
//!
//! `v3 = phi(v1 from B1, v2 from B2)` takes `v1` when the block was entered
//! from `B1` and `v2` when it was entered from `B2`. All phis of a block read
//! their operands at once, before the block's first instruction.
//!
//! Transformations in this crate create phis in two places: the general
//! inliner merges several callee returns into one, and the class inliner's
//! field value tracking merges competing field writes at join points.

use std::fmt;

use crate::analysis::ssa::{SsaVarId, VariableOrigin};

/// One incoming value of a phi node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhiOperand {
    value: SsaVarId,
    predecessor: usize,
}

impl PhiOperand {
    /// Creates an operand taking `value` when control arrives from `predecessor`.
    #[must_use]
    pub const fn new(value: SsaVarId, predecessor: usize) -> Self {
        Self { value, predecessor }
    }

    /// Returns the incoming value.
    #[must_use]
    pub const fn value(&self) -> SsaVarId {
        self.value
    }

    /// Returns the predecessor block index.
    #[must_use]
    pub const fn predecessor(&self) -> usize {
        self.predecessor
    }
}

impl fmt::Display for PhiOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from B{}", self.value, self.predecessor)
    }
}

/// A phi node merging one value per predecessor block.
///
/// # Examples
///
/// ```rust
/// use dotinline::analysis::ssa::{PhiNode, PhiOperand, SsaVarId, VariableOrigin};
///
/// let mut phi = PhiNode::new(SsaVarId::new(3), VariableOrigin::Phi);
/// phi.add_operand(PhiOperand::new(SsaVarId::new(1), 1));
/// phi.add_operand(PhiOperand::new(SsaVarId::new(2), 2));
/// assert_eq!(phi.to_string(), "v3 = phi(v1 from B1, v2 from B2)");
/// ```
#[derive(Debug, Clone)]
pub struct PhiNode {
    result: SsaVarId,
    origin: VariableOrigin,
    operands: Vec<PhiOperand>,
}

impl PhiNode {
    /// Creates a phi node with no operands.
    #[must_use]
    pub fn new(result: SsaVarId, origin: VariableOrigin) -> Self {
        Self {
            result,
            origin,
            operands: Vec::new(),
        }
    }

    /// Returns the SSA variable defined by this phi node.
    #[must_use]
    pub const fn result(&self) -> SsaVarId {
        self.result
    }

    /// Returns the origin of the merged variable.
    #[must_use]
    pub const fn origin(&self) -> VariableOrigin {
        self.origin
    }

    /// Sets the SSA variable defined by this phi node.
    pub fn set_result(&mut self, var: SsaVarId) {
        self.result = var;
    }

    /// Returns the operands of this phi node.
    #[must_use]
    pub fn operands(&self) -> &[PhiOperand] {
        &self.operands
    }

    /// Returns a mutable reference to the operands.
    pub fn operands_mut(&mut self) -> &mut Vec<PhiOperand> {
        &mut self.operands
    }

    /// Adds an operand to this phi node.
    pub fn add_operand(&mut self, operand: PhiOperand) {
        self.operands.push(operand);
    }

    /// Returns the number of operands.
    #[must_use]
    pub fn operand_count(&self) -> usize {
        self.operands.len()
    }

    /// Finds the operand coming from the specified predecessor block.
    #[must_use]
    pub fn operand_from(&self, predecessor: usize) -> Option<&PhiOperand> {
        self.operands
            .iter()
            .find(|op| op.predecessor == predecessor)
    }

    /// Returns all the SSA variables used by this phi node.
    pub fn used_variables(&self) -> impl Iterator<Item = SsaVarId> + '_ {
        self.operands.iter().map(|op| op.value)
    }

    /// Sets the operand value for a specific predecessor, adding it if absent.
    pub fn set_operand(&mut self, predecessor: usize, value: SsaVarId) {
        if let Some(existing) = self
            .operands
            .iter_mut()
            .find(|op| op.predecessor == predecessor)
        {
            existing.value = value;
        } else {
            self.operands.push(PhiOperand::new(value, predecessor));
        }
    }

    /// Removes the operand flowing in from `predecessor`.
    ///
    /// Returns `true` if an operand was removed.
    pub fn remove_operand_from(&mut self, predecessor: usize) -> bool {
        let before = self.operands.len();
        self.operands.retain(|op| op.predecessor != predecessor);
        self.operands.len() != before
    }

    /// Rewrites every operand that names `old` as its predecessor to name `new`.
    pub fn rename_predecessor(&mut self, old: usize, new: usize) {
        for operand in &mut self.operands {
            if operand.predecessor == old {
                operand.predecessor = new;
            }
        }
    }

    /// Replaces every operand value equal to `old` with `new`.
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_value(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let mut count = 0;
        for operand in &mut self.operands {
            if operand.value == old {
                operand.value = new;
                count += 1;
            }
        }
        count
    }

    /// Returns the single value this phi merges, ignoring self references.
    ///
    /// `None` if the operands disagree or the phi only references itself.
    #[must_use]
    pub fn trivial_value(&self) -> Option<SsaVarId> {
        let mut unique = None;
        for value in self.used_variables() {
            if value == self.result {
                continue;
            }
            match unique {
                None => unique = Some(value),
                Some(existing) if existing == value => {}
                Some(_) => return None,
            }
        }
        unique
    }
}

impl fmt::Display for PhiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = phi(", self.result)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{operand}")?;
        }
        write!(f, ")")
    }
}
