//! # dotinline Prelude
//!
//! The types needed to describe a program, build method bodies and run the
//! optimization pipeline over them.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotinline operations
pub use crate::Error;

/// The result type used throughout dotinline
pub use crate::Result;

// ================================================================================================
// Program Model
// ================================================================================================

/// Classes, fields, methods and the queries over them
pub use crate::metadata::program::{
    ClassDef, ClassFlags, FieldDef, FieldFlags, MethodDef, MethodFlags, Program,
};

/// Metadata tokens
pub use crate::metadata::token::Token;

// ================================================================================================
// SSA Intermediate Representation
// ================================================================================================

/// Functions, instructions and the builder
pub use crate::analysis::ssa::{
    CallKind, ConstValue, InstrId, NullTest, PhiNode, PhiOperand, SsaBlock, SsaFunction,
    SsaFunctionBuilder, SsaInstruction, SsaOp, SsaVarId, ValueType, VariableOrigin,
};

// ================================================================================================
// Compiler Pipeline
// ================================================================================================

/// Pipeline entry points and configuration
pub use crate::compiler::{
    ClassInliningConfig, CompilationResult, Compiler, CompilerConfig, CompilerContext,
    PassScheduler, SsaPass,
};

/// Events and statistics
pub use crate::compiler::{DerivedStats, Event, EventKind, EventLog};

/// Method summaries and class facts
pub use crate::compiler::{ClassInitializerInfo, FieldFacts, MethodSummary, ParameterUsage};

/// The passes
pub use crate::compiler::{ClassInliningPass, DeadCodeEliminationPass, InliningPass};
