//! Scope Configuration
//!
//! Tunables shared by every scope in a tree, loadable from JSON or YAML.

use crate::error::{ScopeError, ScopeResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// What a scope does when a member's `validate()` fails outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Surface the first rejection as the scope's `validate()` error.
    #[default]
    Propagate,
    /// Count the rejecting member as invalid and keep going.
    TreatAsInvalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Quiet period before a burst of member changes is recomputed.
    pub debounce_ms: u64,
    pub rejection_policy: RejectionPolicy,
    /// Buffer size of the per-scope event stream.
    pub event_capacity: usize,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 16,
            rejection_policy: RejectionPolicy::Propagate,
            event_capacity: 256,
        }
    }
}

impl ScopeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_rejection_policy(mut self, policy: RejectionPolicy) -> Self {
        self.rejection_policy = policy;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Format::Yaml,
            _ => Format::Json,
        }
    }
}

/// Loads and saves a [`ScopeConfig`] file.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the config, falling back to the default when the file is absent.
    pub async fn load(&self) -> ScopeResult<ScopeConfig> {
        if !self.path.exists() {
            tracing::debug!("No scope config at {}, using defaults", self.path.display());
            return Ok(ScopeConfig::default());
        }
        let content = fs::read_to_string(&self.path).await.map_err(|e| self.io_error(e))?;
        let parsed = match Format::of(&self.path) {
            Format::Json => serde_json::from_str(&content).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::from_str(&content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|reason| ScopeError::ConfigParse {
            path: self.path.display().to_string(),
            reason,
        })
    }

    pub async fn save(&self, config: &ScopeConfig) -> ScopeResult<()> {
        let content = match Format::of(&self.path) {
            Format::Json => serde_json::to_string_pretty(config).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::to_string(config).map_err(|e| e.to_string()),
        }
        .map_err(|reason| ScopeError::ConfigParse {
            path: self.path.display().to_string(),
            reason,
        })?;
        fs::write(&self.path, content).await.map_err(|e| self.io_error(e))
    }

    fn io_error(&self, source: std::io::Error) -> ScopeError {
        ScopeError::ConfigIo {
            path: self.path.display().to_string(),
            source,
        }
    }
}
