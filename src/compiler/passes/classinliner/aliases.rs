//! Receiver alias tracking for one candidate.
//!
//! An [`AliasSet`] partitions the values seen while walking a candidate's
//! uses into values that *are* the candidate (`definite`), values that must
//! never become the candidate (`illegal`), and values whose status hangs on
//! a check that has not run yet (`deferred`).
//!
//! A value is never both definite and illegal. Deferred checks are run at
//! most once, the first time the value is offered as a definite alias or
//! asked about, and the value leaves the deferred stage immediately.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::analysis::ssa::SsaVarId;

/// A pending alias check.
pub type DeferredCheck<'a> = Box<dyn FnOnce() -> bool + 'a>;

/// Values aliasing one candidate object.
pub struct AliasSet<'a> {
    root: SsaVarId,
    definite: FxHashSet<SsaVarId>,
    illegal: FxHashSet<SsaVarId>,
    deferred: FxHashMap<SsaVarId, Vec<DeferredCheck<'a>>>,
}

impl<'a> AliasSet<'a> {
    /// Creates a set containing only `root`.
    #[must_use]
    pub fn new(root: SsaVarId) -> Self {
        let mut definite = FxHashSet::default();
        definite.insert(root);
        Self {
            root,
            definite,
            illegal: FxHashSet::default(),
            deferred: FxHashMap::default(),
        }
    }

    /// Returns the root value.
    #[must_use]
    pub fn root(&self) -> SsaVarId {
        self.root
    }

    /// Runs and discards the pending checks of `value`.
    ///
    /// Returns `None` if there were none.
    fn resolve_deferred(&mut self, value: SsaVarId) -> Option<bool> {
        let checks = self.deferred.remove(&value)?;
        let mut passed = true;
        for check in checks {
            passed &= check();
        }
        Some(passed)
    }

    /// Adds `value` as a definite alias.
    ///
    /// Fails if `value` is illegal or a pending check on it fails; a failed
    /// check makes the value illegal.
    pub fn add_definite_alias(&mut self, value: SsaVarId) -> bool {
        if self.illegal.contains(&value) {
            return false;
        }
        if self.resolve_deferred(value) == Some(false) {
            self.illegal.insert(value);
            return false;
        }
        self.definite.insert(value);
        true
    }

    /// Marks `value` as never aliasing the candidate.
    ///
    /// Fails if `value` is already a definite alias.
    pub fn add_illegal_alias(&mut self, value: SsaVarId) -> bool {
        if self.definite.contains(&value) {
            return false;
        }
        self.deferred.remove(&value);
        self.illegal.insert(value);
        true
    }

    /// Queues `check` to run before `value` may become a definite alias.
    ///
    /// Ignored if `value` is already classified.
    pub fn add_deferred_check(&mut self, value: SsaVarId, check: DeferredCheck<'a>) {
        if self.illegal.contains(&value) || self.definite.contains(&value) {
            return;
        }
        self.deferred.entry(value).or_default().push(check);
    }

    /// Returns `true` if `value` is a definite alias.
    #[must_use]
    pub fn is_alias(&self, value: SsaVarId) -> bool {
        self.definite.contains(&value)
    }

    /// Returns `true` if `value` can never alias the candidate, resolving
    /// its pending checks first.
    pub fn is_illegal(&mut self, value: SsaVarId) -> bool {
        match self.resolve_deferred(value) {
            Some(true) => {
                self.definite.insert(value);
            }
            Some(false) => {
                self.illegal.insert(value);
            }
            None => {}
        }
        self.illegal.contains(&value)
    }

    /// Returns `true` if `value` has checks waiting.
    #[must_use]
    pub fn is_deferred(&self, value: SsaVarId) -> bool {
        self.deferred.contains_key(&value)
    }

    /// Restores the set to just the root.
    pub fn reset(&mut self) {
        self.definite.clear();
        self.definite.insert(self.root);
        self.illegal.clear();
        self.deferred.clear();
    }

    /// Iterates the definite aliases, root included.
    pub fn definite(&self) -> impl Iterator<Item = SsaVarId> + '_ {
        self.definite.iter().copied()
    }

    /// Returns the number of definite aliases.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definite.len()
    }

    /// Always `false`; the root is a member.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definite.is_empty()
    }
}

impl fmt::Debug for AliasSet<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliasSet")
            .field("root", &self.root)
            .field("definite", &self.definite)
            .field("illegal", &self.illegal)
            .field("deferred", &self.deferred.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn v(i: usize) -> SsaVarId {
        SsaVarId::new(i)
    }

    #[test]
    fn test_definite_and_illegal_are_exclusive() {
        let mut set = AliasSet::new(v(0));
        assert!(set.add_definite_alias(v(1)));
        assert!(!set.add_illegal_alias(v(1)));
        assert!(set.add_illegal_alias(v(2)));
        assert!(!set.add_definite_alias(v(2)));

        for i in 0..3 {
            assert!(!(set.is_alias(v(i)) && set.is_illegal(v(i))));
        }
    }

    #[test]
    fn test_deferred_check_runs_once() {
        let runs = Cell::new(0);
        let mut set = AliasSet::new(v(0));
        set.add_deferred_check(
            v(3),
            Box::new(|| {
                runs.set(runs.get() + 1);
                true
            }),
        );
        assert!(set.is_deferred(v(3)));
        assert!(!set.is_illegal(v(3)));
        assert!(!set.is_illegal(v(3)));
        assert!(set.is_alias(v(3)));
        assert!(set.add_definite_alias(v(3)));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_failed_deferred_check_rejects_alias() {
        let mut set = AliasSet::new(v(0));
        set.add_deferred_check(v(4), Box::new(|| false));
        assert!(!set.add_definite_alias(v(4)));
        assert!(!set.is_deferred(v(4)));
        assert!(set.is_illegal(v(4)));
        assert!(!set.is_alias(v(4)));
    }

    #[test]
    fn test_deferred_ignored_for_illegal_and_reset() {
        let mut set = AliasSet::new(v(0));
        set.add_illegal_alias(v(5));
        set.add_deferred_check(v(5), Box::new(|| true));
        assert!(!set.is_deferred(v(5)));

        set.add_definite_alias(v(6));
        set.reset();
        assert_eq!(set.len(), 1);
        assert!(set.is_alias(v(0)));
        assert!(!set.is_alias(v(6)));
        assert!(!set.is_illegal(v(5)));
    }
}
