//! Validatable Node Contract
//!
//! The capability set every leaf of a scope tree exposes, and the tagged
//! [`Member`] variant that lets a scope hold leaves and nested scopes side by
//! side.

use crate::flags::{FlagPatch, Flags};
use crate::identity::IdOrigin;
use crate::scope::Scope;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Rule name → messages produced by that rule.
pub type FailedRules = BTreeMap<String, Vec<String>>;

/// Field id → error messages. Input of `set_errors`, output of aggregation.
pub type ErrorMap = BTreeMap<String, Vec<String>>;

/// Observable validation state of a single leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FieldState {
    pub errors: Vec<String>,
    pub flags: Flags,
    pub failed_rules: FailedRules,
}

/// Outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub failed_rules: FailedRules,
}

impl ValidationResult {
    pub fn passed() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            failed_rules: FailedRules::new(),
        }
    }

    /// Valid iff `errors` is empty.
    pub fn from_errors(errors: Vec<String>, failed_rules: FailedRules) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            failed_rules,
        }
    }
}

/// Last-known state of a member that left while asking to be remembered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSnapshot {
    pub id: String,
    pub flags: Flags,
    pub errors: Vec<String>,
    pub failed_rules: FailedRules,
    pub cached_at: DateTime<Utc>,
}

impl MemberSnapshot {
    pub fn capture(id: impl Into<String>, state: FieldState) -> Self {
        Self {
            id: id.into(),
            flags: state.flags,
            errors: state.errors,
            failed_rules: state.failed_rules,
            cached_at: Utc::now(),
        }
    }

    /// The snapshot replayed as a validation result.
    pub fn as_result(&self) -> ValidationResult {
        ValidationResult {
            valid: self.flags.valid,
            errors: self.errors.clone(),
            failed_rules: self.failed_rules.clone(),
        }
    }

    pub fn state(&self) -> FieldState {
        FieldState {
            errors: self.errors.clone(),
            flags: self.flags,
            failed_rules: self.failed_rules.clone(),
        }
    }
}

/// A leaf validatable node.
///
/// Implementations publish their [`FieldState`] through a `watch` channel;
/// every call to [`Validatable::watch`] hands out a fresh receiver, which is
/// how a scope re-subscribes to its members on each recompute cycle.
#[async_trait]
pub trait Validatable: Send + Sync {
    fn id(&self) -> String;

    /// Whether [`Validatable::id`] was assigned or generated.
    fn id_origin(&self) -> IdOrigin {
        IdOrigin::Explicit
    }

    fn disabled(&self) -> bool {
        false
    }

    /// Whether this member wants its state kept across removal.
    fn persist(&self) -> bool {
        false
    }

    fn watch(&self) -> watch::Receiver<FieldState>;

    fn state(&self) -> FieldState {
        self.watch().borrow().clone()
    }

    /// Run validation and apply the outcome to this member's state.
    async fn validate(&self) -> Result<ValidationResult>;

    /// Run validation without touching displayed errors.
    async fn validate_silent(&self) -> Result<ValidationResult>;

    fn reset(&self);

    fn set_errors(&self, messages: Vec<String>);

    fn set_flags(&self, patch: &FlagPatch);

    fn apply_result(&self, result: &ValidationResult);
}

/// Which registration channel a member uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberKind {
    Member,
    Scope,
}

impl std::fmt::Display for MemberKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberKind::Member => write!(f, "member"),
            MemberKind::Scope => write!(f, "scope"),
        }
    }
}

/// Anything a scope can hold.
#[derive(Clone)]
pub enum Member {
    Leaf(Arc<dyn Validatable>),
    Nested(Scope),
}

impl Member {
    pub fn id(&self) -> String {
        match self {
            Member::Leaf(leaf) => leaf.id(),
            Member::Nested(scope) => scope.id().to_string(),
        }
    }

    pub fn kind(&self) -> MemberKind {
        match self {
            Member::Leaf(_) => MemberKind::Member,
            Member::Nested(_) => MemberKind::Scope,
        }
    }
}

impl std::fmt::Debug for Member {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Member")
            .field("kind", &self.kind())
            .field("id", &self.id())
            .finish()
    }
}

impl From<Scope> for Member {
    fn from(scope: Scope) -> Self {
        Member::Nested(scope)
    }
}

impl<V: Validatable + 'static> From<Arc<V>> for Member {
    fn from(leaf: Arc<V>) -> Self {
        Member::Leaf(leaf)
    }
}
