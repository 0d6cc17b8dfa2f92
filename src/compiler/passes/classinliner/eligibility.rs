//! Per-class structural eligibility for class inlining.

use dashmap::DashMap;

use crate::{
    compiler::context::CompilerContext,
    metadata::{program::Program, token::Token},
};

/// Whether instances of a class may be scalar-replaced at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Eligibility {
    /// Structurally eligible; individual uses still decide.
    Eligible,
    /// Never eligible.
    NotEligible,
}

impl Eligibility {
    /// Returns `true` for [`Eligibility::Eligible`].
    #[must_use]
    pub fn is_eligible(self) -> bool {
        self == Self::Eligible
    }
}

/// Memoized class eligibility, shared across methods and threads.
///
/// A decision depends only on the class, so two threads racing on the same
/// class compute the same answer and the first insert wins.
#[derive(Debug, Default)]
pub struct EligibilityCache {
    decisions: DashMap<Token, Eligibility>,
}

impl EligibilityCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `class`, computing the decision on first request.
    pub fn classify(&self, program: &Program, ctx: &CompilerContext, class: Token) -> Eligibility {
        if let Some(decision) = self.decisions.get(&class) {
            return *decision;
        }
        let decision = if Self::compute(program, ctx, class) {
            Eligibility::Eligible
        } else {
            Eligibility::NotEligible
        };
        *self.decisions.entry(class).or_insert(decision)
    }

    /// Returns the cached decision for `class`, if any.
    #[must_use]
    pub fn cached(&self, class: Token) -> Option<Eligibility> {
        self.decisions.get(&class).map(|d| *d)
    }

    /// Returns the number of classes decided so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// Returns `true` if nothing was decided yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    fn compute(program: &Program, ctx: &CompilerContext, class: Token) -> bool {
        let Some(def) = program.class(class) else {
            return false;
        };
        if !def.is_concrete() || ctx.is_class_inlining_excluded(program, class) {
            return false;
        }
        if program.finalizer_of(class).is_some() {
            return false;
        }

        // Allocating an instance initializes the class, its superclasses and
        // every interface it implements
        std::iter::once(class)
            .chain(program.superclass_chain(class))
            .chain(program.all_interfaces(class))
            .all(|c| !ctx.class_initializer(program, c).has_side_effects())
    }
}
