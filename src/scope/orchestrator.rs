//! Validation Orchestrator
//!
//! Tree-wide `validate`, `passes`, `reset` and `set_errors`. Every fan-out
//! waits for all members before deciding; nothing short-circuits.

use super::events::ScopeEvent;
use super::Scope;
use crate::config::RejectionPolicy;
use crate::error::{ScopeError, ScopeResult};
use crate::member::ErrorMap;
use futures::future::{BoxFuture, FutureExt};
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Run members' silent path: outcomes are computed but errors are not
    /// pushed into their displayed state.
    pub silent: bool,
}

impl ValidateOptions {
    pub fn silent() -> Self {
        Self { silent: true }
    }
}

impl Scope {
    /// Validate every enabled member. True iff all of them pass; an empty
    /// scope passes.
    pub async fn validate(&self) -> ScopeResult<bool> {
        self.validate_with(ValidateOptions::default()).await
    }

    pub fn validate_with(&self, options: ValidateOptions) -> BoxFuture<'_, ScopeResult<bool>> {
        async move {
            let (leaves, nested) = self.inner.registry.read().await.eligible();
            debug!(
                scope = %self.id(),
                leaves = leaves.len(),
                nested = nested.len(),
                silent = options.silent,
                "Validating"
            );

            let leaf_runs = leaves.iter().map(|leaf| async move {
                let outcome = if options.silent {
                    leaf.validate_silent().await
                } else {
                    leaf.validate().await
                };
                outcome
                    .map(|result| result.valid)
                    .map_err(|source| ScopeError::MemberRejected { member: leaf.id(), source })
            });
            let scope_runs = nested.iter().map(|scope| scope.validate_with(options));

            let (leaf_outcomes, scope_outcomes) =
                futures::join!(join_all(leaf_runs), join_all(scope_runs));

            let policy = self.inner.config.rejection_policy;
            let mut valid = true;
            let mut rejection = None;
            for outcome in leaf_outcomes.into_iter().chain(scope_outcomes) {
                match outcome {
                    Ok(passed) => valid &= passed,
                    Err(err) => {
                        valid = false;
                        match policy {
                            RejectionPolicy::TreatAsInvalid => {
                                warn!(scope = %self.id(), error = %err, "Member rejected, counting as invalid");
                            }
                            RejectionPolicy::Propagate if rejection.is_none() => rejection = Some(err),
                            RejectionPolicy::Propagate => {}
                        }
                    }
                }
            }

            match rejection {
                Some(err) => Err(err),
                None => Ok(valid),
            }
        }
        .boxed()
    }

    /// Run `validate()` and call `callback` only if everything passed.
    pub async fn passes<T, F>(&self, callback: F) -> ScopeResult<Option<T>>
    where
        F: FnOnce() -> T,
    {
        if self.validate().await? {
            Ok(Some(callback()))
        } else {
            Ok(None)
        }
    }

    /// Forget every cached snapshot and reset all active members.
    ///
    /// Runs in the background; the returned handle may be awaited or dropped.
    pub fn reset(&self) -> JoinHandle<()> {
        let scope = self.clone();
        tokio::spawn(async move { scope.reset_members().await })
    }

    async fn reset_members(&self) {
        let (cleared, (leaves, nested)) = {
            let mut registry = self.inner.registry.write().await;
            let cleared = registry.inactive_mut().clear();
            (cleared, registry.members())
        };

        if cleared > 0 {
            debug!(scope = %self.id(), cleared, "Cleared inactive cache");
            self.inner.events.publish(ScopeEvent::CacheCleared { count: cleared });
            self.touch_membership();
        }

        for leaf in &leaves {
            leaf.reset();
        }
        join_all(nested.iter().map(Scope::reset)).await;
    }

    /// Push server-side errors into matching active members. Ids with no
    /// active member are ignored; nested scopes receive the whole map.
    pub fn set_errors<'a>(&'a self, errors: &'a ErrorMap) -> BoxFuture<'a, ()> {
        async move {
            let (matched, nested) = {
                let registry = self.inner.registry.read().await;
                let matched: Vec<_> = errors
                    .iter()
                    .filter_map(|(id, messages)| registry.leaf(id).map(|leaf| (leaf.clone(), messages.clone())))
                    .collect();
                (matched, registry.nested().to_vec())
            };

            debug!(scope = %self.id(), matched = matched.len(), supplied = errors.len(), "Setting errors");
            for (leaf, messages) in matched {
                leaf.set_errors(messages);
            }
            join_all(nested.iter().map(|scope| scope.set_errors(errors))).await;
        }
        .boxed()
    }
}
