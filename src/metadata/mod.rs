//! Program metadata: tokens, class hierarchy and symbol resolution.
//!
//! # Key Components
//!
//! - [`token`] - Metadata tokens identifying classes, fields and methods
//! - [`program`] - Class, field and method definitions plus resolution and access checks

/// Metadata tokens
pub mod token;

/// Class hierarchy, members and symbol resolution
pub mod program;
