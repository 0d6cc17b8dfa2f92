use thiserror::Error;

use crate::metadata::token::Token;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors are reserved for conditions the caller has to deal with: malformed IR handed to
/// the compiler, symbols that do not resolve, or a general-purpose inlining request the
/// inliner refuses. Class-inlining rejections and aborted commits are *not* errors; they
/// are typed outcomes of the pass and never cross the pass boundary.
///
/// # Error Categories
///
/// ## IR Errors
/// - [`Error::Malformed`] - IR violates a structural invariant (created by `malformed_error!`)
///
/// ## Resolution Errors
/// - [`Error::TypeNotFound`] - A class token does not resolve
/// - [`Error::MethodNotFound`] - A method token does not resolve
/// - [`Error::FieldNotFound`] - A field token does not resolve
///
/// ## Inlining Errors
/// - [`Error::InlineRejected`] - The general-purpose inliner refused a call site
#[derive(Error, Debug)]
pub enum Error {
    /// The IR is structurally invalid.
    ///
    /// Carries the source location that detected the problem, which makes
    /// internal-consistency failures much easier to trace.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// Description of the violated invariant
        message: String,
        /// Source file that raised the error
        file: &'static str,
        /// Source line that raised the error
        line: u32,
    },

    /// A class token could not be resolved.
    #[error("Failed to find type - {0}")]
    TypeNotFound(Token),

    /// A method token could not be resolved.
    #[error("Failed to find method - {0}")]
    MethodNotFound(Token),

    /// A field token could not be resolved.
    #[error("Failed to find field - {0}")]
    FieldNotFound(Token),

    /// The general-purpose inliner refused to substitute the callee.
    #[error("Inlining of {callee} rejected - {reason}")]
    InlineRejected {
        /// The callee that could not be inlined
        callee: Token,
        /// Why the inliner refused
        reason: String,
    },
}
