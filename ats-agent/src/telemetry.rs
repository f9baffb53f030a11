//! Tracing Subscriber Initialization
//!
//! Agents log through `tracing`. The host process installs a subscriber once
//! at startup, with the filter and output format taken from the environment.

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `ATS_LOG_LEVEL` and `RUST_LOG` are unset.
pub const DEFAULT_LOG_FILTER: &str = "ats_agent=info,ats_client=info,warn";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to init subscriber: {0}")]
    SubscriberInit(String),
}

/// Logging configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directives, e.g. `ats_agent=debug,info`
    pub filter: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// `ATS_LOG_LEVEL` falls back to `RUST_LOG`, then to [`DEFAULT_LOG_FILTER`].
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("ATS_LOG_LEVEL")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
            json: std::env::var("ATS_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(&config.filter).map_err(|e| TelemetryError::InvalidFilter {
            filter: config.filter.clone(),
            reason: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_thread_names(true))
            .try_init()
    };
    installed.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))?;

    tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
