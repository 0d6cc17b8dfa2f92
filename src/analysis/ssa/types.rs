//! Symbol references and value kinds used by SSA operations.
//!
//! Operations never embed resolved definitions. They carry lightweight
//! [`TypeRef`], [`MethodRef`] and [`FieldRef`] handles wrapping a metadata
//! [`Token`]; resolution against the
//! [`Program`](crate::metadata::program::Program) happens on demand.

use std::fmt;

use crate::metadata::token::Token;

/// Reference to a class in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeRef(pub Token);

impl TypeRef {
    /// Creates a new type reference from a metadata token.
    #[must_use]
    pub const fn new(token: Token) -> Self {
        Self(token)
    }

    /// Returns the underlying metadata token.
    #[must_use]
    pub const fn token(&self) -> Token {
        self.0
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeRef({})", self.0)
    }
}

/// Reference to a method in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodRef(pub Token);

impl MethodRef {
    /// Creates a new method reference from a metadata token.
    #[must_use]
    pub const fn new(token: Token) -> Self {
        Self(token)
    }

    /// Returns the underlying metadata token.
    #[must_use]
    pub const fn token(&self) -> Token {
        self.0
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MethodRef({})", self.0)
    }
}

/// Reference to a field in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldRef(pub Token);

impl FieldRef {
    /// Creates a new field reference from a metadata token.
    #[must_use]
    pub const fn new(token: Token) -> Self {
        Self(token)
    }

    /// Returns the underlying metadata token.
    #[must_use]
    pub const fn token(&self) -> Token {
        self.0
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldRef({})", self.0)
    }
}

/// Storage kind of a field or value.
///
/// Only used to pick the default a freshly allocated field starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum ValueType {
    /// 32-bit integer.
    #[strum(serialize = "int")]
    Int,
    /// 64-bit integer.
    #[strum(serialize = "long")]
    Long,
    /// Boolean.
    #[strum(serialize = "bool")]
    Bool,
    /// Object reference.
    #[strum(serialize = "ref")]
    Reference,
}

/// How a call instruction dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum CallKind {
    /// No receiver; the target is the named method.
    #[strum(serialize = "static")]
    Static,
    /// Receiver in `args[0]`, no dynamic dispatch (constructors, private methods).
    #[strum(serialize = "direct")]
    Direct,
    /// Receiver in `args[0]`, dispatched on the receiver's runtime class.
    #[strum(serialize = "virtual")]
    Virtual,
    /// Receiver in `args[0]`, dispatched through an interface.
    #[strum(serialize = "interface")]
    Interface,
}

impl CallKind {
    /// Returns `true` if `args[0]` is a receiver.
    #[must_use]
    pub const fn has_receiver(&self) -> bool {
        !matches!(self, Self::Static)
    }

    /// Returns `true` if the target depends on the receiver's runtime class.
    #[must_use]
    pub const fn is_dynamic(&self) -> bool {
        matches!(self, Self::Virtual | Self::Interface)
    }
}

/// Comparison performed by a null-test branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum NullTest {
    /// Branch to the true target if the value is null.
    #[strum(serialize = "eq")]
    IsNull,
    /// Branch to the true target if the value is not null.
    #[strum(serialize = "ne")]
    NotNull,
}

impl NullTest {
    /// Evaluates the test for a value whose nullness is known.
    #[must_use]
    pub const fn evaluate(&self, value_is_null: bool) -> bool {
        match self {
            Self::IsNull => value_is_null,
            Self::NotNull => !value_is_null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_kind_receiver() {
        assert!(!CallKind::Static.has_receiver());
        assert!(CallKind::Direct.has_receiver());
        assert!(CallKind::Interface.is_dynamic());
        assert!(!CallKind::Direct.is_dynamic());
        assert_eq!(CallKind::Virtual.to_string(), "virtual");
    }

    #[test]
    fn test_null_test_evaluate() {
        assert!(NullTest::IsNull.evaluate(true));
        assert!(!NullTest::IsNull.evaluate(false));
        assert!(NullTest::NotNull.evaluate(false));
    }

    #[test]
    fn test_refs_display() {
        assert_eq!(
            TypeRef::new(Token::type_def(2)).to_string(),
            "TypeRef(0x02000002)"
        );
        assert_eq!(FieldRef::new(Token::field(1)).token(), Token::field(1));
        assert_eq!(ValueType::Reference.to_string(), "ref");
    }
}
