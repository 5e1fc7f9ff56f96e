//! Inactive Member Cache
//!
//! Snapshots of members that left while flagged `persist`. Entries live until
//! the same id re-registers or the owning scope is reset; nothing else evicts
//! them.

use crate::member::MemberSnapshot;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct InactiveCache {
    entries: BTreeMap<String, MemberSnapshot>,
}

impl InactiveCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `snapshot`, replacing any older entry under the same id.
    pub fn store(&mut self, snapshot: MemberSnapshot) {
        self.entries.insert(snapshot.id.clone(), snapshot);
    }

    /// Remove and return the entry for `id`.
    pub fn take(&mut self, id: &str) -> Option<MemberSnapshot> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&MemberSnapshot> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Drop every entry, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &MemberSnapshot> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::FieldState;

    fn snapshot(id: &str, errors: &[&str]) -> MemberSnapshot {
        let state = FieldState {
            errors: errors.iter().map(|e| e.to_string()).collect(),
            ..FieldState::default()
        };
        MemberSnapshot::capture(id, state)
    }

    #[test]
    fn test_store_replaces_same_id() {
        let mut cache = InactiveCache::new();
        cache.store(snapshot("email", &["required"]));
        cache.store(snapshot("email", &["invalid"]));

        assert_eq!(cache.ids().collect::<Vec<_>>(), vec!["email"]);
        assert_eq!(cache.get("email").unwrap().errors, vec!["invalid".to_string()]);
    }

    #[test]
    fn test_take_removes_entry() {
        let mut cache = InactiveCache::new();
        cache.store(snapshot("email", &[]));

        assert!(cache.take("email").is_some());
        assert!(!cache.contains("email"));
        assert!(cache.take("email").is_none());
    }

    #[test]
    fn test_clear_reports_count() {
        let mut cache = InactiveCache::new();
        cache.store(snapshot("a", &[]));
        cache.store(snapshot("b", &[]));

        assert_eq!(cache.clear(), 2);
        assert_eq!(cache.ids().count(), 0);
    }
}
