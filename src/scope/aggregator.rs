//! Aggregate Recompute
//!
//! Derives a scope's own errors and flags from its candidates
//! (`active ∪ inactive ∪ nested`) and drives the coalescing scheduler that
//! decides when to do so.
//!
//! The scheduler is one task per scope. It waits for a membership change or a
//! change on any watched member, then keeps re-arming a quiet-period timer
//! until no further change arrives within the debounce interval, and finally
//! recomputes once. Each recompute hands back fresh member subscriptions, so
//! members that left stop waking the scheduler.

use super::events::ScopeEvent;
use super::registry::Registry;
use super::ScopeInner;
use crate::flags::Flags;
use crate::member::{ErrorMap, FailedRules, FieldState};
use futures::future::select_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Per-field detail carried next to the error map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSummary {
    pub flags: Flags,
    pub failed_rules: FailedRules,
    /// False for members only present as cached snapshots.
    pub active: bool,
}

/// A scope's published view of its whole subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateState {
    pub errors: ErrorMap,
    pub flags: Flags,
    pub fields: BTreeMap<String, FieldSummary>,
}

impl AggregateState {
    pub fn empty() -> Self {
        Self {
            errors: ErrorMap::new(),
            flags: Flags::identity(),
            fields: BTreeMap::new(),
        }
    }
}

impl Default for AggregateState {
    fn default() -> Self {
        Self::empty()
    }
}

pub(crate) enum Contribution {
    Leaf {
        id: String,
        state: FieldState,
        active: bool,
    },
    Nested(AggregateState),
}

impl Contribution {
    fn flags(&self) -> &Flags {
        match self {
            Contribution::Leaf { state, .. } => &state.flags,
            Contribution::Nested(agg) => &agg.flags,
        }
    }
}

/// Pure fold of contributions into an aggregate. Nested scopes merge their
/// error and field maps into this one.
pub(crate) fn aggregate(contributions: &[Contribution]) -> AggregateState {
    let mut errors = ErrorMap::new();
    let mut fields = BTreeMap::new();

    for contribution in contributions {
        match contribution {
            Contribution::Leaf { id, state, active } => {
                errors.insert(id.clone(), state.errors.clone());
                fields.insert(
                    id.clone(),
                    FieldSummary {
                        flags: state.flags,
                        failed_rules: state.failed_rules.clone(),
                        active: *active,
                    },
                );
            }
            Contribution::Nested(agg) => {
                errors.extend(agg.errors.iter().map(|(k, v)| (k.clone(), v.clone())));
                fields.extend(agg.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
    }

    AggregateState {
        errors,
        flags: Flags::reduce(contributions.iter().map(Contribution::flags)),
        fields,
    }
}

/// A live subscription to one candidate's state.
pub(crate) enum Watcher {
    Leaf(watch::Receiver<FieldState>),
    Nested(watch::Receiver<AggregateState>),
}

impl Watcher {
    /// False once the member's sender is gone.
    async fn changed(&mut self) -> bool {
        match self {
            Watcher::Leaf(rx) => rx.changed().await.is_ok(),
            Watcher::Nested(rx) => rx.changed().await.is_ok(),
        }
    }
}

/// Read every candidate once, subscribing to the live ones at the same
/// instant so no change between read and subscribe is lost.
fn collect(registry: &Registry) -> (Vec<Contribution>, Vec<Watcher>) {
    let mut contributions = Vec::new();
    let mut watchers = Vec::new();

    for (id, leaf) in registry.leaves() {
        let mut rx = leaf.watch();
        let state = rx.borrow_and_update().clone();
        contributions.push(Contribution::Leaf {
            id: id.to_string(),
            state,
            active: true,
        });
        watchers.push(Watcher::Leaf(rx));
    }

    for snapshot in registry.inactive().snapshots() {
        contributions.push(Contribution::Leaf {
            id: snapshot.id.clone(),
            state: snapshot.state(),
            active: false,
        });
    }

    for scope in registry.nested() {
        let mut rx = scope.watch();
        let state = rx.borrow_and_update().clone();
        contributions.push(Contribution::Nested(state));
        watchers.push(Watcher::Nested(rx));
    }

    (contributions, watchers)
}

impl ScopeInner {
    /// Recompute and publish this scope's aggregate, returning subscriptions
    /// to the candidates it was computed from.
    pub(crate) async fn recompute(&self) -> Vec<Watcher> {
        let _serial = self.recompute_lock.lock().await;
        let (contributions, watchers) = {
            let registry = self.registry.read().await;
            collect(&registry)
        };

        let next = aggregate(&contributions);
        let revision = self.recomputes.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            scope = %self.id,
            revision,
            candidates = contributions.len(),
            valid = next.flags.valid,
            "Recomputed aggregate state"
        );
        self.state.send_replace(next);
        self.events.publish(ScopeEvent::Recomputed { revision });
        watchers
    }
}

enum Signal {
    Membership,
    Member,
    Closed,
}

enum Fired {
    Changed,
    Closed(usize),
}

async fn any_changed(watchers: &mut [Watcher]) -> Fired {
    if watchers.is_empty() {
        return std::future::pending().await;
    }
    let pending = watchers.iter_mut().map(|w| Box::pin(w.changed()));
    let (alive, idx, _rest) = select_all(pending).await;
    if alive {
        Fired::Changed
    } else {
        Fired::Closed(idx)
    }
}

async fn next_signal(membership: &mut watch::Receiver<u64>, watchers: &mut Vec<Watcher>) -> Signal {
    loop {
        let closed = tokio::select! {
            res = membership.changed() => {
                return if res.is_ok() { Signal::Membership } else { Signal::Closed };
            }
            fired = any_changed(watchers) => match fired {
                Fired::Changed => return Signal::Member,
                Fired::Closed(idx) => idx,
            },
        };
        watchers.swap_remove(closed);
    }
}

pub(crate) fn spawn(inner: &Arc<ScopeInner>) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let membership = inner.membership.subscribe();
    let debounce = inner.config.debounce();
    tokio::spawn(run(weak, membership, debounce))
}

async fn run(weak: Weak<ScopeInner>, mut membership: watch::Receiver<u64>, debounce: Duration) {
    let mut watchers = Vec::new();

    'cycle: loop {
        if let Signal::Closed = next_signal(&mut membership, &mut watchers).await {
            break;
        }

        // Re-arm until the burst goes quiet.
        loop {
            match tokio::time::timeout(debounce, next_signal(&mut membership, &mut watchers)).await {
                Err(_) => break,
                Ok(Signal::Closed) => break 'cycle,
                Ok(Signal::Membership) | Ok(Signal::Member) => continue,
            }
        }

        let Some(inner) = weak.upgrade() else {
            break;
        };
        watchers = inner.recompute().await;
    }
    debug!("Aggregator stopped");
}
