//! SSA variable representation and identifiers.
//!
//! Each SSA variable has a unique identifier and is assigned exactly once,
//! enabling precise tracking of data flow through the method.
//!
//! # Variable Identification
//!
//! SSA variables are identified by a simple index ([`SsaVarId`]) into the
//! variable table of their [`SsaFunction`](crate::analysis::ssa::SsaFunction).
//! The ID encodes no semantic information - all metadata lives in
//! [`SsaVariable`].
//!
//! # Def/Use Bookkeeping
//!
//! Every variable records one [`DefSite`] and a list of [`UseSite`]s. The use
//! lists are derived data: passes that rewrite operands call
//! [`SsaFunction::recompute_uses`](crate::analysis::ssa::SsaFunction::recompute_uses)
//! afterwards instead of patching the lists by hand.

use std::fmt;

/// Unique identifier for an SSA variable.
///
/// A lightweight handle into the variable table. Unique within a single
/// function, not across functions.
///
/// # Examples
///
/// ```rust
/// use dotinline::analysis::ssa::SsaVarId;
///
/// let var_id = SsaVarId::new(0);
/// assert_eq!(var_id.index(), 0);
/// assert_eq!(var_id.to_string(), "v0");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SsaVarId(usize);

impl SsaVarId {
    /// Creates a new SSA variable ID from an index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for SsaVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where an SSA variable came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableOrigin {
    /// Method argument (index 0 is the receiver of instance methods).
    Argument(u16),

    /// Named local slot.
    Local(u16),

    /// Temporary produced by an instruction.
    Stack(u32),

    /// Result of a phi node introduced by a transformation.
    Phi,
}

impl VariableOrigin {
    /// Returns `true` if this is an argument.
    #[must_use]
    pub const fn is_argument(&self) -> bool {
        matches!(self, Self::Argument(_))
    }

    /// Returns `true` if this is a local.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    /// Returns `true` if this is a stack temporary.
    #[must_use]
    pub const fn is_stack(&self) -> bool {
        matches!(self, Self::Stack(_))
    }

    /// Returns `true` if this came from a synthesized phi.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self, Self::Phi)
    }

    /// Returns the argument index, if this is an argument.
    #[must_use]
    pub const fn argument_index(&self) -> Option<u16> {
        match self {
            Self::Argument(idx) => Some(*idx),
            _ => None,
        }
    }
}

impl fmt::Display for VariableOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(idx) => write!(f, "arg{idx}"),
            Self::Local(idx) => write!(f, "loc{idx}"),
            Self::Stack(idx) => write!(f, "stk{idx}"),
            Self::Phi => write!(f, "phi"),
        }
    }
}

/// Definition site of an SSA variable.
///
/// For most variables, this is a specific instruction within a block. Phi
/// results are defined at the block entry. Arguments are defined at function
/// entry, before block 0 executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefSite {
    /// Defined at function entry (arguments).
    Entry,
    /// Defined by the phi at `index` in `block`.
    Phi {
        /// Block holding the phi.
        block: usize,
        /// Index into the block's phi list.
        index: usize,
    },
    /// Defined by the instruction at `index` in `block`.
    Instruction {
        /// Block holding the instruction.
        block: usize,
        /// Index into the block's instruction list.
        index: usize,
    },
}

impl DefSite {
    /// Creates a definition site for a regular instruction.
    #[must_use]
    pub const fn instruction(block: usize, index: usize) -> Self {
        Self::Instruction { block, index }
    }

    /// Creates a definition site for a phi node.
    #[must_use]
    pub const fn phi(block: usize, index: usize) -> Self {
        Self::Phi { block, index }
    }

    /// Returns `true` if this is a phi node definition.
    #[must_use]
    pub const fn is_phi(&self) -> bool {
        matches!(self, Self::Phi { .. })
    }

    /// Returns the block of the definition, `None` for entry definitions.
    #[must_use]
    pub const fn block(&self) -> Option<usize> {
        match self {
            Self::Entry => None,
            Self::Phi { block, .. } | Self::Instruction { block, .. } => Some(*block),
        }
    }
}

/// Use site of an SSA variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UseSite {
    /// The block where this variable is used.
    pub block: usize,
    /// The instruction index within the block.
    ///
    /// For phi operands, this is the phi's index in the block's phi list.
    pub index: usize,
    /// Whether this use is in a phi node operand.
    pub is_phi_operand: bool,
}

impl UseSite {
    /// Creates a use site for a regular instruction.
    #[must_use]
    pub const fn instruction(block: usize, index: usize) -> Self {
        Self {
            block,
            index,
            is_phi_operand: false,
        }
    }

    /// Creates a use site for a phi node operand.
    #[must_use]
    pub const fn phi_operand(block: usize, index: usize) -> Self {
        Self {
            block,
            index,
            is_phi_operand: true,
        }
    }
}

/// Metadata for one SSA variable.
#[derive(Debug, Clone)]
pub struct SsaVariable {
    id: SsaVarId,
    origin: VariableOrigin,
    def_site: Option<DefSite>,
    uses: Vec<UseSite>,
}

impl SsaVariable {
    /// Creates a new variable with no recorded definition or uses.
    #[must_use]
    pub fn new(id: SsaVarId, origin: VariableOrigin) -> Self {
        Self {
            id,
            origin,
            def_site: None,
            uses: Vec::new(),
        }
    }

    /// Returns the variable's ID.
    #[must_use]
    pub const fn id(&self) -> SsaVarId {
        self.id
    }

    /// Returns where the variable originated.
    #[must_use]
    pub const fn origin(&self) -> VariableOrigin {
        self.origin
    }

    /// Returns the definition site, if one has been recorded.
    #[must_use]
    pub const fn def_site(&self) -> Option<DefSite> {
        self.def_site
    }

    /// Records the definition site.
    pub fn set_def_site(&mut self, site: Option<DefSite>) {
        self.def_site = site;
    }

    /// Returns all recorded uses.
    #[must_use]
    pub fn uses(&self) -> &[UseSite] {
        &self.uses
    }

    /// Returns `true` if nothing reads this variable.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.uses.is_empty()
    }

    /// Adds a use site.
    pub fn add_use(&mut self, site: UseSite) {
        self.uses.push(site);
    }

    /// Drops all recorded uses.
    pub fn clear_uses(&mut self) {
        self.uses.clear();
    }
}

impl fmt::Display for SsaVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.origin)
    }
}
