//! Scope Event Stream
//!
//! Per-scope broadcast of membership and recompute activity, for observers
//! and diagnostics. Publishing never blocks and never fails; lagging or absent
//! subscribers simply miss events.

use crate::member::MemberKind;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ScopeEvent {
    /// A member registered (or replaced an earlier handle with the same id).
    MemberJoined { id: String, kind: MemberKind },
    /// A registering member received its cached snapshot.
    MemberRestored { id: String },
    /// A member left; `cached` tells whether its state was kept.
    MemberLeft { id: String, kind: MemberKind, cached: bool },
    /// `reset()` discarded cached snapshots.
    CacheCleared { count: usize },
    /// The aggregate state was recomputed.
    Recomputed { revision: u64 },
}

pub struct EventBus {
    tx: broadcast::Sender<ScopeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ScopeEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScopeEvent> {
        self.tx.subscribe()
    }
}
