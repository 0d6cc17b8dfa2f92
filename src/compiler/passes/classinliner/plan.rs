//! The calls a candidate's commit will force-inline.

use std::fmt;

use crate::{analysis::ssa::InstrId, metadata::token::Token};

/// Why a method ends up inlined for a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum InlineeKind {
    /// Called on the instance, constructor chain included.
    #[strum(serialize = "direct")]
    Direct,
    /// Receives the instance as a plain argument, or is called on it from
    /// inside such a method.
    #[strum(serialize = "indirect")]
    Indirect,
}

/// Where a planned call lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    /// A call instruction already in the method.
    Existing(InstrId),
    /// A call in the body of the named inlinee; it only appears in the
    /// method once that inlinee is inlined.
    Nested(Token),
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Existing(id) => write!(f, "{id}"),
            Self::Nested(holder) => write!(f, "inside {holder}"),
        }
    }
}

/// One call and the single target it resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedCall {
    /// The call.
    pub site: CallSite,
    /// The resolved target.
    pub target: Token,
    /// Direct or indirect.
    pub kind: InlineeKind,
}

/// Everything a commit does besides scalarizing fields.
///
/// Calls are only ever appended, so a prefix of [`InliningPlan::calls`] is
/// stable while the plan grows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InliningPlan {
    calls: Vec<PlannedCall>,
    constructor: Option<InstrId>,
    null_arguments: Vec<(InstrId, usize)>,
}

impl InliningPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call.
    pub fn add(&mut self, site: CallSite, target: Token, kind: InlineeKind) {
        self.calls.push(PlannedCall { site, target, kind });
    }

    /// Records the constructor call of an allocation. Returns `false` if one
    /// was already recorded.
    pub fn set_constructor(&mut self, call: InstrId) -> bool {
        if self.constructor.is_some() {
            return false;
        }
        self.constructor = Some(call);
        true
    }

    /// Returns the constructor call on the allocation.
    #[must_use]
    pub fn constructor(&self) -> Option<InstrId> {
        self.constructor
    }

    /// Records that argument `index` of `call` becomes `null`.
    pub fn add_null_argument(&mut self, call: InstrId, index: usize) {
        if !self.null_arguments.contains(&(call, index)) {
            self.null_arguments.push((call, index));
        }
    }

    /// Returns the arguments to replace by `null`.
    #[must_use]
    pub fn null_arguments(&self) -> &[(InstrId, usize)] {
        &self.null_arguments
    }

    /// Returns `true` if argument `index` of `call` is planned to become `null`.
    #[must_use]
    pub fn nulls_argument(&self, call: InstrId, index: usize) -> bool {
        self.null_arguments.contains(&(call, index))
    }

    /// Returns every planned call in discovery order.
    #[must_use]
    pub fn calls(&self) -> &[PlannedCall] {
        &self.calls
    }

    /// Iterates the planned calls of one kind.
    pub fn of_kind(&self, kind: InlineeKind) -> impl Iterator<Item = &PlannedCall> + '_ {
        self.calls.iter().filter(move |c| c.kind == kind)
    }

    /// Iterates `(call, target)` for planned calls of `kind` already in the method.
    pub fn existing(&self, kind: InlineeKind) -> impl Iterator<Item = (InstrId, Token)> + '_ {
        self.of_kind(kind).filter_map(|c| match c.site {
            CallSite::Existing(id) => Some((id, c.target)),
            CallSite::Nested(_) => None,
        })
    }

    /// Returns `true` if some planned call targets `target`.
    #[must_use]
    pub fn allows(&self, target: Token) -> bool {
        self.calls.iter().any(|c| c.target == target)
    }

    /// Returns the number of planned calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Returns `true` if no call is planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_bookkeeping() {
        let ctor = Token::method(2);
        let getter = Token::method(3);
        let helper = Token::method(4);
        let call = InstrId::new(7);

        let mut plan = InliningPlan::new();
        assert!(plan.set_constructor(call));
        assert!(!plan.set_constructor(InstrId::new(8)));
        plan.add(CallSite::Existing(call), ctor, InlineeKind::Direct);
        plan.add(CallSite::Nested(ctor), getter, InlineeKind::Direct);
        plan.add(CallSite::Existing(InstrId::new(9)), helper, InlineeKind::Indirect);
        plan.add_null_argument(InstrId::new(10), 1);
        plan.add_null_argument(InstrId::new(10), 1);

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.of_kind(InlineeKind::Direct).count(), 2);
        assert_eq!(
            plan.existing(InlineeKind::Direct).collect::<Vec<_>>(),
            vec![(call, ctor)]
        );
        assert!(plan.allows(getter));
        assert!(!plan.allows(Token::method(5)));
        assert_eq!(plan.null_arguments().len(), 1);
        assert!(plan.nulls_argument(InstrId::new(10), 1));
        assert_eq!(CallSite::Nested(ctor).to_string(), "inside 0x06000002");
    }
}
