//! Agent configuration

use crate::error::{AtsError, AtsResult, ConfigError};
use crate::request::DEFAULT_CALLER;
use serde::{Deserialize, Serialize};

/// Suffix appended to a rolled backup folder.
pub const BACKUP_TIMESTAMP_FORMAT: &str = "_%Y.%m.%d_%H.%M.%S";

/// Process-wide agent settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Caller id holding the template components
    pub default_caller: String,
    /// Run the component cleanup handler after restoring a named environment too
    pub cleanup_on_named_environment: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            default_caller: DEFAULT_CALLER.to_string(),
            cleanup_on_named_environment: true,
        }
    }
}

impl AgentConfig {
    /// Load from `ATS_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let default_caller = std::env::var("ATS_DEFAULT_CALLER")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CALLER.to_string());

        let cleanup_on_named_environment = std::env::var("ATS_CLEANUP_ON_NAMED_ENVIRONMENT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        Self {
            default_caller,
            cleanup_on_named_environment,
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(AtsError::Config) if invalid.
    pub fn validate(&self) -> AtsResult<()> {
        if self.default_caller.trim().is_empty() {
            return Err(AtsError::Config(ConfigError::InvalidValue {
                field: "default_caller".to_string(),
                value: self.default_caller.clone(),
                reason: "default_caller must not be empty".to_string(),
            }));
        }

        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
