//! Identity Generation
//!
//! Scopes and fields without an explicit id draw one from an injected
//! generator. Generated ids are not stable across remounts, so persistence
//! keyed on them will not match on reattachment.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Where a member's id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdOrigin {
    Explicit,
    Generated,
}

/// Source of unique ids, e.g. `scope_3`.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: &str) -> String;
}

/// Monotonic `<prefix>_<n>` ids, unique for the lifetime of this generator.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counter: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", prefix, n)
    }
}

/// `<prefix>_<uuid v4>` ids; unique without shared state.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self, prefix: &str) -> String {
        format!("{}_{}", prefix, Uuid::new_v4().simple())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_sequential_ids_count_up() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id("scope"), "scope_0");
        assert_eq!(ids.next_id("scope"), "scope_1");
        assert_eq!(ids.next_id("field"), "field_2");
    }

    #[test]
    fn test_separate_generators_do_not_share_state() {
        let a = SequentialIds::new();
        let b = SequentialIds::new();
        a.next_id("scope");
        assert_eq!(b.next_id("scope"), "scope_0");
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidIds;
        let seen: HashSet<_> = (0..64).map(|_| ids.next_id("scope")).collect();
        assert_eq!(seen.len(), 64);
        assert!(seen.iter().all(|id| id.starts_with("scope_")));
    }
}
