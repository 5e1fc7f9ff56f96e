//! Error types for scope operations.
//!
//! Membership mistakes (unknown ids, unmatched error entries) are tolerated and
//! never surface here. Only collaborator faults and configuration problems do.

use thiserror::Error;

/// Errors surfaced by a [`crate::Scope`] or its configuration layer.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A member's `validate()` call failed instead of producing an outcome.
    #[error("member '{member}' rejected validation")]
    MemberRejected {
        /// Id of the member that rejected.
        member: String,
        /// The collaborator's own error.
        #[source]
        source: anyhow::Error,
    },

    /// The configuration file could not be read or written.
    #[error("config I/O failed for {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file could not be parsed.
    #[error("config parse failed for {path}: {reason}")]
    ConfigParse { path: String, reason: String },
}

pub type ScopeResult<T> = std::result::Result<T, ScopeError>;
