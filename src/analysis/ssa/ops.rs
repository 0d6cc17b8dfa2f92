//! SSA operations.
//!
//! `SsaOp` is the `result = op(operands)` form every instruction is expressed
//! in. The instruction set is the managed object model the optimizer reasons
//! about: allocation, instance and static field access, calls with explicit
//! dispatch kind, type tests and casts, monitors, and structured control flow.
//!
//! # Field Documentation
//!
//! The struct fields in this module follow a consistent naming convention:
//! - `dest`: The destination SSA variable for the operation result
//! - `left`, `right`: Binary operands (left and right hand side)
//! - `value`: A value being stored, returned or tested
//! - `object`: The object instance for field, cast and monitor operations
//! - `args`: Call arguments, receiver first for instance calls
//! - `target`, `true_target`, `false_target`: Branch targets (block indices)

#![allow(missing_docs)]

use std::fmt;

use super::types::{CallKind, FieldRef, MethodRef, NullTest, TypeRef};
use super::value::ConstValue;
use super::SsaVarId;

/// A decomposed SSA operation.
///
/// # Conventions
///
/// - For operations that produce a result, the first `SsaVarId` is the destination
/// - Optional results use `Option<SsaVarId>` (calls that return nothing or whose
///   result is discarded)
/// - Instance calls carry the receiver as `args[0]`
#[derive(Debug, Clone, PartialEq)]
pub enum SsaOp {
    // ========================================================================
    // Constants and copies
    // ========================================================================
    Const {
        dest: SsaVarId,
        value: ConstValue,
    },

    Copy {
        dest: SsaVarId,
        src: SsaVarId,
    },

    // ========================================================================
    // Arithmetic and comparison
    // ========================================================================
    Add {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    Sub {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    Mul {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    Ceq {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    Clt {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    Cgt {
        dest: SsaVarId,
        left: SsaVarId,
        right: SsaVarId,
    },

    // ========================================================================
    // Control flow
    // ========================================================================
    Jump {
        target: usize,
    },

    Branch {
        condition: SsaVarId,
        true_target: usize,
        false_target: usize,
    },

    /// Identity test against `null`.
    BranchNull {
        value: SsaVarId,
        test: NullTest,
        true_target: usize,
        false_target: usize,
    },

    Return {
        value: Option<SsaVarId>,
    },

    Throw {
        exception: SsaVarId,
    },

    // ========================================================================
    // Objects and fields
    // ========================================================================
    /// Allocates an uninitialized instance; the constructor runs as a separate call.
    NewInstance {
        dest: SsaVarId,
        class: TypeRef,
    },

    LoadField {
        dest: SsaVarId,
        object: SsaVarId,
        field: FieldRef,
    },

    StoreField {
        object: SsaVarId,
        field: FieldRef,
        value: SsaVarId,
    },

    LoadStaticField {
        dest: SsaVarId,
        field: FieldRef,
    },

    StoreStaticField {
        field: FieldRef,
        value: SsaVarId,
    },

    CastClass {
        dest: SsaVarId,
        object: SsaVarId,
        target_type: TypeRef,
    },

    InstanceOf {
        dest: SsaVarId,
        object: SsaVarId,
        target_type: TypeRef,
    },

    // ========================================================================
    // Calls
    // ========================================================================
    Call {
        dest: Option<SsaVarId>,
        kind: CallKind,
        method: MethodRef,
        args: Vec<SsaVarId>,
    },

    // ========================================================================
    // Synchronization
    // ========================================================================
    MonitorEnter {
        object: SsaVarId,
    },

    MonitorExit {
        object: SsaVarId,
    },

    Nop,
}

impl SsaOp {
    /// Returns the destination variable if this operation produces one.
    #[must_use]
    pub fn dest(&self) -> Option<SsaVarId> {
        match self {
            Self::Const { dest, .. }
            | Self::Copy { dest, .. }
            | Self::Add { dest, .. }
            | Self::Sub { dest, .. }
            | Self::Mul { dest, .. }
            | Self::Ceq { dest, .. }
            | Self::Clt { dest, .. }
            | Self::Cgt { dest, .. }
            | Self::NewInstance { dest, .. }
            | Self::LoadField { dest, .. }
            | Self::LoadStaticField { dest, .. }
            | Self::CastClass { dest, .. }
            | Self::InstanceOf { dest, .. } => Some(*dest),

            Self::Call { dest, .. } => *dest,

            Self::Jump { .. }
            | Self::Branch { .. }
            | Self::BranchNull { .. }
            | Self::Return { .. }
            | Self::Throw { .. }
            | Self::StoreField { .. }
            | Self::StoreStaticField { .. }
            | Self::MonitorEnter { .. }
            | Self::MonitorExit { .. }
            | Self::Nop => None,
        }
    }

    /// Returns all variables used by this operation, in operand order.
    #[must_use]
    pub fn uses(&self) -> Vec<SsaVarId> {
        match self {
            Self::Const { .. }
            | Self::NewInstance { .. }
            | Self::LoadStaticField { .. }
            | Self::Jump { .. }
            | Self::Nop => vec![],

            Self::Copy { src, .. } => vec![*src],

            Self::Add { left, right, .. }
            | Self::Sub { left, right, .. }
            | Self::Mul { left, right, .. }
            | Self::Ceq { left, right, .. }
            | Self::Clt { left, right, .. }
            | Self::Cgt { left, right, .. } => vec![*left, *right],

            Self::Branch { condition, .. } => vec![*condition],
            Self::BranchNull { value, .. } => vec![*value],
            Self::Return { value } => value.iter().copied().collect(),
            Self::Throw { exception } => vec![*exception],

            Self::LoadField { object, .. }
            | Self::CastClass { object, .. }
            | Self::InstanceOf { object, .. }
            | Self::MonitorEnter { object }
            | Self::MonitorExit { object } => vec![*object],

            Self::StoreField { object, value, .. } => vec![*object, *value],
            Self::StoreStaticField { value, .. } => vec![*value],

            Self::Call { args, .. } => args.clone(),
        }
    }

    /// Applies `f` to every variable slot (destination and operands).
    ///
    /// Used by the inliner to rename a callee's variables into the caller.
    pub fn remap_variables<F>(&mut self, mut f: F)
    where
        F: FnMut(SsaVarId) -> SsaVarId,
    {
        match self {
            Self::Const { dest, .. }
            | Self::NewInstance { dest, .. }
            | Self::LoadStaticField { dest, .. } => *dest = f(*dest),

            Self::Copy { dest, src } => {
                *dest = f(*dest);
                *src = f(*src);
            }

            Self::Add { dest, left, right }
            | Self::Sub { dest, left, right }
            | Self::Mul { dest, left, right }
            | Self::Ceq { dest, left, right }
            | Self::Clt { dest, left, right }
            | Self::Cgt { dest, left, right } => {
                *dest = f(*dest);
                *left = f(*left);
                *right = f(*right);
            }

            Self::Branch { condition, .. } => *condition = f(*condition),
            Self::BranchNull { value, .. } => *value = f(*value),
            Self::Return { value } => {
                if let Some(v) = value {
                    *v = f(*v);
                }
            }
            Self::Throw { exception } => *exception = f(*exception),

            Self::LoadField { dest, object, .. }
            | Self::CastClass { dest, object, .. }
            | Self::InstanceOf { dest, object, .. } => {
                *dest = f(*dest);
                *object = f(*object);
            }

            Self::StoreField { object, value, .. } => {
                *object = f(*object);
                *value = f(*value);
            }
            Self::StoreStaticField { value, .. } => *value = f(*value),

            Self::MonitorEnter { object } | Self::MonitorExit { object } => {
                *object = f(*object);
            }

            Self::Call { dest, args, .. } => {
                if let Some(d) = dest {
                    *d = f(*d);
                }
                for arg in args.iter_mut() {
                    *arg = f(*arg);
                }
            }

            Self::Jump { .. } | Self::Nop => {}
        }
    }

    /// Replaces every operand equal to `old` with `new`, leaving the destination alone.
    ///
    /// Returns the number of operands rewritten.
    pub fn replace_uses(&mut self, old: SsaVarId, new: SsaVarId) -> usize {
        let dest = self.dest();
        let mut count = 0;
        self.remap_variables(|v| {
            if v == old && Some(v) != dest {
                count += 1;
                new
            } else {
                v
            }
        });
        count
    }

    /// Returns the successor blocks of a terminator.
    #[must_use]
    pub fn successors(&self) -> Vec<usize> {
        match self {
            Self::Jump { target } => vec![*target],
            Self::Branch {
                true_target,
                false_target,
                ..
            }
            | Self::BranchNull {
                true_target,
                false_target,
                ..
            } => {
                if true_target == false_target {
                    vec![*true_target]
                } else {
                    vec![*true_target, *false_target]
                }
            }
            _ => vec![],
        }
    }

    /// Applies `f` to every branch target.
    pub fn remap_targets<F>(&mut self, mut f: F)
    where
        F: FnMut(usize) -> usize,
    {
        match self {
            Self::Jump { target } => *target = f(*target),
            Self::Branch {
                true_target,
                false_target,
                ..
            }
            | Self::BranchNull {
                true_target,
                false_target,
                ..
            } => {
                *true_target = f(*true_target);
                *false_target = f(*false_target);
            }
            _ => {}
        }
    }

    /// Returns `true` if this operation ends a block.
    #[must_use]
    pub const fn is_terminator(&self) -> bool {
        matches!(
            self,
            Self::Jump { .. }
                | Self::Branch { .. }
                | Self::BranchNull { .. }
                | Self::Return { .. }
                | Self::Throw { .. }
        )
    }

    /// Returns `true` if this operation may throw an exception.
    #[must_use]
    pub const fn may_throw(&self) -> bool {
        matches!(
            self,
            Self::LoadField { .. }
                | Self::StoreField { .. }
                | Self::NewInstance { .. }
                | Self::CastClass { .. }
                | Self::Call { .. }
                | Self::Throw { .. }
                | Self::MonitorEnter { .. }
                | Self::MonitorExit { .. }
        )
    }

    /// Returns `true` if this operation is pure (has no side effects).
    ///
    /// Pure operations can be eliminated if their result is unused.
    #[must_use]
    pub const fn is_pure(&self) -> bool {
        matches!(
            self,
            Self::Const { .. }
                | Self::Copy { .. }
                | Self::Add { .. }
                | Self::Sub { .. }
                | Self::Mul { .. }
                | Self::Ceq { .. }
                | Self::Clt { .. }
                | Self::Cgt { .. }
                | Self::InstanceOf { .. }
                | Self::Nop
        )
    }

    /// Returns `true` for a no-op placeholder.
    #[must_use]
    pub const fn is_nop(&self) -> bool {
        matches!(self, Self::Nop)
    }
}

impl fmt::Display for SsaOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const { dest, value } => write!(f, "{dest} = {value}"),
            Self::Copy { dest, src } => write!(f, "{dest} = {src}"),
            Self::Add { dest, left, right } => write!(f, "{dest} = add {left}, {right}"),
            Self::Sub { dest, left, right } => write!(f, "{dest} = sub {left}, {right}"),
            Self::Mul { dest, left, right } => write!(f, "{dest} = mul {left}, {right}"),
            Self::Ceq { dest, left, right } => write!(f, "{dest} = ceq {left}, {right}"),
            Self::Clt { dest, left, right } => write!(f, "{dest} = clt {left}, {right}"),
            Self::Cgt { dest, left, right } => write!(f, "{dest} = cgt {left}, {right}"),
            Self::Jump { target } => write!(f, "jump B{target}"),
            Self::Branch {
                condition,
                true_target,
                false_target,
            } => write!(f, "branch {condition}, B{true_target}, B{false_target}"),
            Self::BranchNull {
                value,
                test,
                true_target,
                false_target,
            } => write!(f, "if-{test}z {value}, B{true_target}, B{false_target}"),
            Self::Return { value: Some(v) } => write!(f, "ret {v}"),
            Self::Return { value: None } => write!(f, "ret"),
            Self::Throw { exception } => write!(f, "throw {exception}"),
            Self::NewInstance { dest, class } => write!(f, "{dest} = new {}", class.token()),
            Self::LoadField {
                dest,
                object,
                field,
            } => write!(f, "{dest} = {object}.{}", field.token()),
            Self::StoreField {
                object,
                field,
                value,
            } => write!(f, "{object}.{} = {value}", field.token()),
            Self::LoadStaticField { dest, field } => {
                write!(f, "{dest} = static {}", field.token())
            }
            Self::StoreStaticField { field, value } => {
                write!(f, "static {} = {value}", field.token())
            }
            Self::CastClass {
                dest,
                object,
                target_type,
            } => write!(f, "{dest} = cast {object} to {}", target_type.token()),
            Self::InstanceOf {
                dest,
                object,
                target_type,
            } => write!(f, "{dest} = {object} instanceof {}", target_type.token()),
            Self::Call {
                dest,
                kind,
                method,
                args,
            } => {
                if let Some(d) = dest {
                    write!(f, "{d} = ")?;
                }
                write!(f, "call.{kind} {}(", method.token())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Self::MonitorEnter { object } => write!(f, "monitor-enter {object}"),
            Self::MonitorExit { object } => write!(f, "monitor-exit {object}"),
            Self::Nop => write!(f, "nop"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::token::Token;

    fn v(i: usize) -> SsaVarId {
        SsaVarId::new(i)
    }

    #[test]
    fn test_call_uses_and_dest() {
        let op = SsaOp::Call {
            dest: Some(v(3)),
            kind: CallKind::Virtual,
            method: MethodRef::new(Token::method(2)),
            args: vec![v(0), v(1)],
        };
        assert_eq!(op.dest(), Some(v(3)));
        assert_eq!(op.uses(), vec![v(0), v(1)]);
        assert!(!op.is_pure());
        assert!(op.may_throw());
    }

    #[test]
    fn test_replace_uses_skips_dest() {
        let mut op = SsaOp::StoreField {
            object: v(1),
            field: FieldRef::new(Token::field(1)),
            value: v(1),
        };
        assert_eq!(op.replace_uses(v(1), v(7)), 2);
        assert_eq!(op.uses(), vec![v(7), v(7)]);

        let mut copy = SsaOp::Copy { dest: v(2), src: v(2) };
        assert_eq!(copy.replace_uses(v(2), v(9)), 0);
    }

    #[test]
    fn test_successors_and_targets() {
        let mut op = SsaOp::BranchNull {
            value: v(0),
            test: NullTest::IsNull,
            true_target: 1,
            false_target: 2,
        };
        assert!(op.is_terminator());
        assert_eq!(op.successors(), vec![1, 2]);

        op.remap_targets(|t| t + 10);
        assert_eq!(op.successors(), vec![11, 12]);

        let same = SsaOp::Branch {
            condition: v(0),
            true_target: 4,
            false_target: 4,
        };
        assert_eq!(same.successors(), vec![4]);
        assert!(SsaOp::Return { value: None }.successors().is_empty());
    }

    #[test]
    fn test_display() {
        let op = SsaOp::LoadField {
            dest: v(2),
            object: v(1),
            field: FieldRef::new(Token::field(1)),
        };
        assert_eq!(op.to_string(), "v2 = v1.0x04000001");

        let call = SsaOp::Call {
            dest: None,
            kind: CallKind::Direct,
            method: MethodRef::new(Token::method(1)),
            args: vec![v(1), v(2)],
        };
        assert_eq!(call.to_string(), "call.direct 0x06000001(v1, v2)");
    }
}
