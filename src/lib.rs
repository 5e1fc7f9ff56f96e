//! Validation Scope
//!
//! A hierarchical aggregator for form-validation state:
//! - Scopes collect errors and flags from many validatable members
//! - Nested scopes compose into trees of any depth
//! - Debounced, coalesced recompute of the aggregate
//! - Tree-wide validate / reset / server-error injection
//! - Persistence of departed members' state across remounts

pub mod config;
pub mod error;
pub mod field;
pub mod flags;
pub mod identity;
pub mod member;
pub mod scope;
pub mod utils;

// Re-exports for convenience
pub use config::{ConfigManager, RejectionPolicy, ScopeConfig};
pub use error::{ScopeError, ScopeResult};
pub use field::{Field, FieldBuilder, Rule};
pub use flags::{FlagName, FlagPatch, Flags, Strategy};
pub use identity::{IdGenerator, IdOrigin, SequentialIds, UuidIds};
pub use member::{ErrorMap, FailedRules, FieldState, Member, MemberKind, MemberSnapshot, Validatable, ValidationResult};
pub use scope::{AggregateState, FieldSummary, Scope, ScopeBuilder, ScopeEvent, ValidateOptions};
