//! Metadata tokens identifying program entities.
//!
//! A [`Token`] is a 32-bit handle whose upper byte selects the table the entity
//! lives in and whose lower 24 bits are the 1-based row within that table. The
//! [`Program`](crate::metadata::program::Program) hands out tokens when classes,
//! fields and methods are declared, and every IR operand that refers to a symbol
//! carries one.
//!
//! # Tables
//!
//! | Byte   | Entity  |
//! |--------|---------|
//! | `0x02` | class   |
//! | `0x04` | field   |
//! | `0x06` | method  |

use std::fmt;
use std::hash::{Hash, Hasher};

/// Table byte for class definitions.
pub const TABLE_TYPE: u8 = 0x02;

/// Table byte for field definitions.
pub const TABLE_FIELD: u8 = 0x04;

/// Table byte for method definitions.
pub const TABLE_METHOD: u8 = 0x06;

/// A metadata token: table byte plus 24-bit row.
///
/// Tokens are cheap to copy, totally ordered and hashable, which makes them the
/// key type for every cross-method map in the compiler context.
///
/// # Examples
///
/// ```rust
/// use dotinline::metadata::token::Token;
///
/// let token = Token::method(3);
/// assert_eq!(token.value(), 0x0600_0003);
/// assert!(token.is_method());
/// assert_eq!(token.row(), 3);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Creates a token from its raw value.
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Composes a token from a table byte and a row.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Token for the class definition at `row`.
    #[must_use]
    pub fn type_def(row: u32) -> Self {
        Self::from_parts(TABLE_TYPE, row)
    }

    /// Token for the field definition at `row`.
    #[must_use]
    pub fn field(row: u32) -> Self {
        Self::from_parts(TABLE_FIELD, row)
    }

    /// Token for the method definition at `row`.
    #[must_use]
    pub fn method(row: u32) -> Self {
        Self::from_parts(TABLE_METHOD, row)
    }

    /// Returns the raw 32-bit value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns the table byte.
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Returns the row within the table.
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for the null token.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this token names a class.
    #[must_use]
    pub fn is_type(&self) -> bool {
        self.table() == TABLE_TYPE
    }

    /// Returns `true` if this token names a field.
    #[must_use]
    pub fn is_field(&self) -> bool {
        self.table() == TABLE_FIELD
    }

    /// Returns `true` if this token names a method.
    #[must_use]
    pub fn is_method(&self) -> bool {
        self.table() == TABLE_METHOD
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
