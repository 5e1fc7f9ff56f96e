//! Member Registry
//!
//! Active leaves keyed by id, nested scopes in registration order, and the
//! inactive cache. The active and inactive id sets are kept disjoint by every
//! operation here.

use super::cache::InactiveCache;
use super::Scope;
use crate::flags::FlagPatch;
use crate::identity::IdOrigin;
use crate::member::{MemberSnapshot, Validatable};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What happened when a leaf registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Joined,
    /// An active handle with the same id was replaced.
    Replaced,
    /// A cached snapshot was replayed into the leaf.
    Restored,
}

/// What happened when a leaf was asked to leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The id was not active.
    Absent,
    Discarded,
    Cached,
}

#[derive(Default)]
pub struct Registry {
    active: BTreeMap<String, Arc<dyn Validatable>>,
    nested: Vec<Scope>,
    inactive: InactiveCache,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit_leaf(&mut self, leaf: Arc<dyn Validatable>) -> Admission {
        let id = leaf.id();
        let mut admission = Admission::Joined;

        if let Some(snapshot) = self.inactive.take(&id) {
            if leaf.persist() {
                replay(leaf.as_ref(), &snapshot);
                admission = Admission::Restored;
            } else {
                debug!(member = %id, "Dropping cached snapshot for non-persistent member");
            }
        }

        if self.active.insert(id, leaf).is_some() && admission == Admission::Joined {
            admission = Admission::Replaced;
        }
        admission
    }

    /// Nested scopes are appended as-is; registering one twice is a caller error.
    pub fn admit_scope(&mut self, scope: Scope) {
        self.nested.push(scope);
    }

    pub fn remove_leaf(&mut self, id: &str) -> Removal {
        let Some(leaf) = self.active.remove(id) else {
            return Removal::Absent;
        };
        if !leaf.persist() {
            return Removal::Discarded;
        }

        if leaf.id_origin() == IdOrigin::Generated {
            warn!(
                member = %id,
                "Persisting a member with a generated id; generated ids change across remounts, \
                 assign an explicit id so its state can be restored"
            );
        }
        self.inactive.store(MemberSnapshot::capture(id, leaf.state()));
        Removal::Cached
    }

    /// Remove the first nested scope with `id`.
    pub fn remove_scope(&mut self, id: &str) -> bool {
        match self.nested.iter().position(|s| s.id() == id) {
            Some(idx) => {
                self.nested.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn leaf(&self, id: &str) -> Option<&Arc<dyn Validatable>> {
        self.active.get(id)
    }

    pub fn leaves(&self) -> impl Iterator<Item = (&str, &Arc<dyn Validatable>)> {
        self.active.iter().map(|(id, leaf)| (id.as_str(), leaf))
    }

    pub fn nested(&self) -> &[Scope] {
        &self.nested
    }

    pub fn inactive(&self) -> &InactiveCache {
        &self.inactive
    }

    pub fn inactive_mut(&mut self) -> &mut InactiveCache {
        &mut self.inactive
    }

    /// Every active leaf and nested scope.
    pub fn members(&self) -> (Vec<Arc<dyn Validatable>>, Vec<Scope>) {
        (self.active.values().cloned().collect(), self.nested.clone())
    }

    /// Members taking part in a validation run.
    pub fn eligible(&self) -> (Vec<Arc<dyn Validatable>>, Vec<Scope>) {
        let leaves = self.active.values().filter(|l| !l.disabled()).cloned().collect();
        let nested = self.nested.iter().filter(|s| !s.is_disabled()).cloned().collect();
        (leaves, nested)
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.active.keys().cloned().collect()
    }
}

/// Errors and failed rules first, then the flags verbatim, so the restored
/// flags are exactly the cached ones.
fn replay(leaf: &dyn Validatable, snapshot: &MemberSnapshot) {
    leaf.apply_result(&snapshot.as_result());
    leaf.set_flags(&FlagPatch::full(&snapshot.flags));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, FieldBuilder, Rule};
    use crate::identity::SequentialIds;

    fn leaf(id: &str, persist: bool) -> Arc<Field> {
        Field::builder(id).rule(Rule::required()).persist(persist).build()
    }

    fn assert_disjoint(registry: &Registry) {
        for id in registry.inactive().ids() {
            assert!(registry.leaf(id).is_none(), "{} is both active and cached", id);
        }
    }

    #[test]
    fn test_admit_and_replace() {
        let mut registry = Registry::new();
        assert_eq!(registry.admit_leaf(leaf("email", false)), Admission::Joined);
        assert_eq!(registry.admit_leaf(leaf("email", false)), Admission::Replaced);
        assert_eq!(registry.active_ids(), vec!["email".to_string()]);
    }

    #[test]
    fn test_remove_non_persistent_discards() {
        let mut registry = Registry::new();
        registry.admit_leaf(leaf("email", false));

        assert_eq!(registry.remove_leaf("email"), Removal::Discarded);
        assert_eq!(registry.inactive().ids().count(), 0);
        assert_eq!(registry.remove_leaf("email"), Removal::Absent);
    }

    #[tokio::test]
    async fn test_persistent_round_trip() {
        let mut registry = Registry::new();
        let first = leaf("email", true);
        first.touch();
        first.validate().await.unwrap();
        let before = first.state();

        registry.admit_leaf(first);
        assert_eq!(registry.remove_leaf("email"), Removal::Cached);
        assert!(registry.inactive().contains("email"));
        assert_disjoint(&registry);

        let second = leaf("email", true);
        assert_eq!(registry.admit_leaf(second.clone()), Admission::Restored);
        assert_eq!(second.state(), before);
        assert!(!registry.inactive().contains("email"));
        assert_disjoint(&registry);
    }

    #[test]
    fn test_non_persistent_newcomer_drops_stale_snapshot() {
        let mut registry = Registry::new();
        registry.admit_leaf(leaf("email", true));
        registry.remove_leaf("email");

        let newcomer = leaf("email", false);
        assert_eq!(registry.admit_leaf(newcomer.clone()), Admission::Joined);
        assert_eq!(registry.inactive().ids().count(), 0);
        assert!(!newcomer.state().flags.validated);
    }

    #[test]
    fn test_generated_id_is_still_cached() {
        let ids = SequentialIds::new();
        let mut registry = Registry::new();
        let field = FieldBuilder::generated(&ids).persist(true).build();
        let id = field.id();

        registry.admit_leaf(field);
        assert_eq!(registry.remove_leaf(&id), Removal::Cached);
    }

    #[test]
    fn test_eligible_skips_disabled_leaves() {
        let mut registry = Registry::new();
        let on = leaf("on", false);
        let off = leaf("off", false);
        off.set_disabled(true);
        registry.admit_leaf(on);
        registry.admit_leaf(off);

        let (leaves, nested) = registry.eligible();
        assert_eq!(leaves.iter().map(|l| l.id()).collect::<Vec<_>>(), vec!["on".to_string()]);
        assert!(nested.is_empty());
        assert_eq!(registry.members().0.len(), 2);
    }
}
