//! Static Single Assignment (SSA) form for managed method bodies.
//!
//! Every variable is assigned exactly once, which turns "where does this
//! value flow" into a walk over explicit def/use lists. All transformations
//! in [`crate::compiler`] operate on this representation.
//!
//! # Architecture
//!
//! - [`variable`] - SSA variable identifiers, origins and def/use sites
//! - [`phi`] - Phi nodes for control flow merges
//! - [`instruction`] - Instructions with stable ids
//! - [`block`] - Basic blocks holding phis and instructions
//! - [`function`] - A complete method body plus its editing primitives
//! - [`builder`] - Closure-based construction API
//! - [`cfg`] - Successor/predecessor view and dominator tree
//! - [`types`] - Symbol references and value kinds
//! - [`value`] - Constant values
//! - [`ops`] - The operation set
//!
//! ## Variable Origins
//!
//! - **Arguments**: method parameters, defined at entry
//! - **Locals** and **stack slots**: values produced by instructions
//! - **Phi nodes**: merged values at control flow joins
//!
//! # References
//!
//! - Cytron et al., "Efficiently Computing Static Single Assignment Form and the
//!   Control Dependence Graph", ACM TOPLAS 1991
//! - Cooper, Harvey & Kennedy, "A Simple, Fast Dominance Algorithm", 2001

pub mod block;
pub mod builder;
pub mod cfg;
pub mod function;
pub mod instruction;
pub mod ops;
pub mod phi;
pub mod types;
pub mod value;
pub mod variable;

// Re-export primary types at module level
pub use block::SsaBlock;
pub use builder::{SsaBlockBuilder, SsaFunctionBuilder, SsaFunctionContext};
pub use cfg::{DominatorTree, SsaCfg};
pub use function::SsaFunction;
pub use instruction::{InstrId, SsaInstruction};
pub use ops::SsaOp;
pub use phi::{PhiNode, PhiOperand};
pub use types::{CallKind, FieldRef, MethodRef, NullTest, TypeRef, ValueType};
pub use value::ConstValue;
pub use variable::{DefSite, SsaVarId, SsaVariable, UseSite, VariableOrigin};
