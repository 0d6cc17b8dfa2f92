//! Constant values that can appear in SSA form.

use std::fmt;

use crate::analysis::ssa::ValueType;

/// Compile-time constant carried by [`SsaOp::Const`](crate::analysis::ssa::SsaOp::Const).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstValue {
    /// 32-bit signed integer.
    I32(i32),

    /// 64-bit signed integer.
    I64(i64),

    /// Boolean.
    Bool(bool),

    /// String literal.
    Str(String),

    /// Null reference.
    Null,
}

impl ConstValue {
    /// Returns the value a field of kind `ty` holds before its first write.
    #[must_use]
    pub fn default_for(ty: ValueType) -> Self {
        match ty {
            ValueType::Int => Self::I32(0),
            ValueType::Long => Self::I64(0),
            ValueType::Bool => Self::Bool(false),
            ValueType::Reference => Self::Null,
        }
    }

    /// Returns `true` if this is the null constant.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the integer payload, widening `I32`.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I32(v) => Some(*v as i64),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean payload.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}L"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Null => write!(f, "null"),
        }
    }
}
