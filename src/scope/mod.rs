//! Validation Scope
//!
//! A scope owns a registry of validatable members (leaves and nested scopes),
//! publishes an aggregate of their errors and flags, and fans validation,
//! reset and error injection out over its subtree. A scope is itself a member
//! of its parent, so trees of any depth compose through the same protocol.

mod aggregator;
mod cache;
mod events;
mod orchestrator;
mod registry;

pub use aggregator::{AggregateState, FieldSummary};
pub use events::ScopeEvent;
pub use orchestrator::ValidateOptions;

use crate::config::ScopeConfig;
use crate::flags::Flags;
use crate::identity::{IdGenerator, IdOrigin, UuidIds};
use crate::member::{ErrorMap, Member, MemberKind, MemberSnapshot};
use events::EventBus;
use registry::{Admission, Registry, Removal};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tracing::debug;

pub(crate) struct ScopeInner {
    pub(crate) id: String,
    origin: IdOrigin,
    pub(crate) config: ScopeConfig,
    disabled: AtomicBool,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) state: watch::Sender<AggregateState>,
    pub(crate) membership: watch::Sender<u64>,
    pub(crate) recomputes: AtomicU64,
    /// Held across read-and-publish so recomputes never interleave.
    pub(crate) recompute_lock: Mutex<()>,
    pub(crate) events: EventBus,
    parent: Option<Weak<ScopeInner>>,
}

/// Cheaply cloneable handle to a scope.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

pub struct ScopeBuilder {
    id: Option<String>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: ScopeConfig,
    disabled: bool,
    parent: Option<Scope>,
}

impl ScopeBuilder {
    fn new() -> Self {
        Self {
            id: None,
            ids: None,
            config: ScopeConfig::default(),
            disabled: false,
            parent: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Generator used when no explicit id is given. Defaults to [`UuidIds`].
    pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: ScopeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Register with `parent` on build; `detach()` undoes it.
    pub fn parent(mut self, parent: &Scope) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Create the scope, start its aggregator and register it with its parent.
    /// Must be called inside a tokio runtime.
    pub async fn build(self) -> Scope {
        let (id, origin) = match self.id {
            Some(id) => (id, IdOrigin::Explicit),
            None => {
                let ids = self.ids.unwrap_or_else(|| Arc::new(UuidIds));
                (ids.next_id("scope"), IdOrigin::Generated)
            }
        };
        let (state, _) = watch::channel(AggregateState::empty());
        let (membership, _) = watch::channel(0u64);

        let inner = Arc::new(ScopeInner {
            id,
            origin,
            events: EventBus::new(self.config.event_capacity),
            config: self.config,
            disabled: AtomicBool::new(self.disabled),
            registry: RwLock::new(Registry::new()),
            state,
            membership,
            recomputes: AtomicU64::new(0),
            recompute_lock: Mutex::new(()),
            parent: self.parent.as_ref().map(|p| Arc::downgrade(&p.inner)),
        });
        aggregator::spawn(&inner);

        let scope = Scope { inner };
        if let Some(parent) = self.parent {
            parent.subscribe(Member::Nested(scope.clone())).await;
        }
        debug!(scope = %scope.id(), "Scope created");
        scope
    }
}

impl Scope {
    pub fn builder() -> ScopeBuilder {
        ScopeBuilder::new()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn id_origin(&self) -> IdOrigin {
        self.inner.origin
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.inner.config
    }

    pub fn is_disabled(&self) -> bool {
        self.inner.disabled.load(Ordering::Relaxed)
    }

    /// A disabled scope is skipped by its parent's `validate()` but still
    /// shows in the parent's aggregate.
    pub fn set_disabled(&self, disabled: bool) {
        self.inner.disabled.store(disabled, Ordering::Relaxed);
    }

    pub fn parent(&self) -> Option<Scope> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Scope { inner })
    }

    /// Register a leaf or nested scope.
    pub async fn subscribe(&self, member: impl Into<Member>) {
        let member = member.into();
        let id = member.id();
        let kind = member.kind();

        let admission = {
            let mut registry = self.inner.registry.write().await;
            match member {
                Member::Leaf(leaf) => registry.admit_leaf(leaf),
                Member::Nested(scope) => {
                    registry.admit_scope(scope);
                    Admission::Joined
                }
            }
        };

        debug!(scope = %self.id(), member = %id, %kind, ?admission, "Member subscribed");
        if admission == Admission::Restored {
            self.inner.events.publish(ScopeEvent::MemberRestored { id: id.clone() });
        }
        self.inner.events.publish(ScopeEvent::MemberJoined { id, kind });
        self.touch_membership();
    }

    /// Remove a member. Unknown ids are ignored.
    pub async fn unsubscribe(&self, id: &str, kind: MemberKind) {
        let removed = {
            let mut registry = self.inner.registry.write().await;
            match kind {
                MemberKind::Member => registry.remove_leaf(id),
                MemberKind::Scope => {
                    if registry.remove_scope(id) {
                        Removal::Discarded
                    } else {
                        Removal::Absent
                    }
                }
            }
        };

        if removed == Removal::Absent {
            debug!(scope = %self.id(), member = %id, %kind, "Unsubscribe of inactive member ignored");
            return;
        }
        debug!(scope = %self.id(), member = %id, %kind, ?removed, "Member unsubscribed");
        self.inner.events.publish(ScopeEvent::MemberLeft {
            id: id.to_string(),
            kind,
            cached: removed == Removal::Cached,
        });
        self.touch_membership();
    }

    /// Leave the parent scope, if it is still around.
    pub async fn detach(&self) {
        if let Some(parent) = self.parent() {
            parent.unsubscribe(self.id(), MemberKind::Scope).await;
        }
    }

    /// The current aggregate. Always a whole recompute result.
    pub fn state(&self) -> AggregateState {
        self.inner.state.borrow().clone()
    }

    pub fn errors(&self) -> ErrorMap {
        self.inner.state.borrow().errors.clone()
    }

    pub fn flags(&self) -> Flags {
        self.inner.state.borrow().flags
    }

    /// Subscribe to aggregate updates.
    pub fn watch(&self) -> watch::Receiver<AggregateState> {
        self.inner.state.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<ScopeEvent> {
        self.inner.events.subscribe()
    }

    /// Recompute now, bypassing the debounce.
    pub async fn refresh(&self) -> AggregateState {
        self.inner.recompute().await;
        self.state()
    }

    /// Number of recomputes so far.
    pub fn recompute_count(&self) -> u64 {
        self.inner.recomputes.load(Ordering::SeqCst)
    }

    pub async fn active_ids(&self) -> Vec<String> {
        self.inner.registry.read().await.active_ids()
    }

    pub async fn inactive_ids(&self) -> Vec<String> {
        let registry = self.inner.registry.read().await;
        registry.inactive().ids().map(str::to_string).collect()
    }

    pub async fn nested_ids(&self) -> Vec<String> {
        let registry = self.inner.registry.read().await;
        registry.nested().iter().map(|s| s.id().to_string()).collect()
    }

    pub async fn cached(&self, id: &str) -> Option<MemberSnapshot> {
        self.inner.registry.read().await.inactive().get(id).cloned()
    }

    fn touch_membership(&self) {
        self.inner.membership.send_modify(|rev| *rev += 1);
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("disabled", &self.is_disabled())
            .finish()
    }
}
