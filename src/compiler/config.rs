//! Configuration for the optimization pipeline.
//!
//! [`CompilerConfig`] selects which passes the [`Compiler`](crate::compiler::Compiler)
//! schedules and bounds how long the scheduler iterates. Class inlining has
//! its own nested [`ClassInliningConfig`].

/// Configuration for the compiler pipeline.
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Maximum iterations of the whole pipeline (default: 10).
    pub max_iterations: usize,

    /// Number of unchanged iterations before stopping (default: 1).
    pub stable_iterations: usize,

    /// Enable the threshold-based general inliner (default: false).
    pub enable_inlining: bool,

    /// Maximum instruction count of a general inlining candidate (default: 20).
    pub inline_threshold: usize,

    /// Enable class inlining (default: true).
    pub enable_class_inlining: bool,

    /// Run dead code elimination in the pipeline (default: true).
    pub enable_cleanup: bool,

    /// Class inliner limits.
    pub class_inlining: ClassInliningConfig,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            stable_iterations: 1,
            enable_inlining: false,
            inline_threshold: 20,
            enable_class_inlining: true,
            enable_cleanup: true,
            class_inlining: ClassInliningConfig::default(),
        }
    }
}

impl CompilerConfig {
    /// Configuration with every optimization switched off.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enable_inlining: false,
            enable_class_inlining: false,
            enable_cleanup: false,
            ..Self::default()
        }
    }
}

/// Limits of the class inlining pass.
///
/// The allowance is a size heuristic only. The remaining bounds cap work on
/// pathological inputs; hitting one rejects or aborts a candidate and never
/// fails compilation.
#[derive(Debug, Clone)]
pub struct ClassInliningConfig {
    /// Maximum net instruction growth of one candidate (default: 50).
    pub instruction_allowance: usize,

    /// Maximum driver rounds per method (default: 8).
    pub max_rounds: usize,

    /// Depth bound for constructor chains and parameter usage recursion (default: 8).
    pub max_chain_depth: usize,

    /// Maximum forced inlining rounds in one commit step (default: 16).
    pub max_commit_rounds: usize,

    /// Validate the SSA form after every commit (default: true).
    pub verify_ir: bool,
}

impl Default for ClassInliningConfig {
    fn default() -> Self {
        Self {
            instruction_allowance: 50,
            max_rounds: 8,
            max_chain_depth: 8,
            max_commit_rounds: 16,
            verify_ir: true,
        }
    }
}
