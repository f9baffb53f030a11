//! Error types for ATS agent operations

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Boxed error returned by action handlers and pluggable collaborators.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Component registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("No component with name '{component}' is registered (caller {caller})")]
    NoSuchComponent { component: String, caller: String },

    #[error("Component '{component}' is already defined")]
    ComponentAlreadyDefined { component: String },

    #[error("Component '{component}' has no environment named '{environment}'")]
    NoSuchEnvironment {
        component: String,
        environment: String,
    },
}

/// Action resolution and invocation errors.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("No action '{action}' is registered in component '{component}'")]
    NoSuchAction { component: String, action: String },

    #[error("{reason} for action '{action}' of component '{component}' with argument types {arg_types:?}")]
    NoCompatibleMethod {
        component: String,
        action: String,
        arg_types: Vec<String>,
        reason: String,
    },

    #[error("Action '{action}' with signature {signature} is already defined in component '{component}'")]
    ActionAlreadyDefined {
        component: String,
        action: String,
        signature: String,
    },

    #[error("Could not execute action '{action}' of component '{component}': {reason}")]
    Execution {
        component: String,
        action: String,
        reason: String,
    },

    #[error("Action '{action}' of component '{component}' failed: {message}")]
    InternalComponent {
        component: String,
        action: String,
        message: String,
        #[source]
        source: Arc<dyn StdError + Send + Sync + 'static>,
    },
}

impl ActionError {
    /// Wrap a failure raised by the action body itself, keeping its cause chain.
    pub fn internal(component: &str, action: &str, cause: BoxError) -> Self {
        ActionError::InternalComponent {
            component: component.to_string(),
            action: action.to_string(),
            message: cause.to_string(),
            source: Arc::from(cause),
        }
    }
}

/// Load queue errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("No load queue with name '{queue}'")]
    NoSuchLoadQueue { queue: String },

    #[error("Load queue '{queue}' already exists and is in state {state}")]
    LoadQueueAlreadyExists { queue: String, state: String },

    #[error("Parameter data provider '{kind}' for parameter '{parameter}' is not supported")]
    ParameterDataProviderNotSupported { parameter: String, kind: String },

    #[error("Could not initialize data provider for parameter '{parameter}': {reason}")]
    ParameterDataProviderInitialization { parameter: String, reason: String },

    #[error("Invalid threading pattern: {reason}")]
    InvalidThreadingPattern { reason: String },

    #[error("Cannot {operation} load queue '{queue}' while it is in state {state}")]
    InvalidQueueState {
        queue: String,
        state: String,
        operation: String,
    },

    #[error("Could not start worker for load queue '{queue}': {reason}")]
    WorkerSpawn { queue: String, reason: String },
}

/// Environment backup/restore and configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("Could not restore environment '{environment}' of component '{component}': {reason}")]
    Restore {
        component: String,
        environment: String,
        reason: String,
    },

    #[error("Could not backup environment '{environment}' of component '{component}': {reason}")]
    Backup {
        component: String,
        environment: String,
        reason: String,
    },

    #[error("Backup path '{path}' exists but is a file")]
    BackupTargetIsFile { path: String },

    #[error("Configurator '{description}' failed: {reason}")]
    Configuration { description: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Client side coordination errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("Queue with name '{queue}' not found")]
    QueueNotFound { queue: String },

    #[error("No threading pattern supplied for queue '{queue}'")]
    MissingThreadingPattern { queue: String },

    #[error("Queue '{queue}' targets no agents and no local load engine is attached")]
    NoLocalEngine { queue: String },

    #[error("Transport to agent '{agent}' failed: {reason}")]
    Transport { agent: String, reason: String },

    #[error("Malformed message: {reason}")]
    Codec { reason: String },
}

/// Serializable form of an error raised on an agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    /// Variant identity of the original error, e.g. `NoSuchComponent`
    pub kind: String,
    /// Display message of the original error
    pub message: String,
    /// Messages of the cause chain, outermost first
    pub causes: Vec<String>,
}

/// Master error type for all ATS errors.
#[derive(Debug, Clone, Error)]
pub enum AtsError {
    #[error("Component error: {0}")]
    Component(#[from] ComponentError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Internal lock poisoned")]
    LockPoisoned,
}

/// Result type alias for ATS operations.
pub type AtsResult<T> = Result<T, AtsError>;

impl AtsError {
    /// Stable identity of the variant, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            AtsError::Component(e) => match e {
                ComponentError::NoSuchComponent { .. } => "NoSuchComponent",
                ComponentError::ComponentAlreadyDefined { .. } => "ComponentAlreadyDefined",
                ComponentError::NoSuchEnvironment { .. } => "NoSuchEnvironment",
            },
            AtsError::Action(e) => match e {
                ActionError::NoSuchAction { .. } => "NoSuchAction",
                ActionError::NoCompatibleMethod { .. } => "NoCompatibleMethodFound",
                ActionError::ActionAlreadyDefined { .. } => "ActionAlreadyDefined",
                ActionError::Execution { .. } => "ActionExecution",
                ActionError::InternalComponent { .. } => "InternalComponent",
            },
            AtsError::Load(e) => match e {
                LoadError::NoSuchLoadQueue { .. } => "NoSuchLoadQueue",
                LoadError::LoadQueueAlreadyExists { .. } => "LoadQueueAlreadyExists",
                LoadError::ParameterDataProviderNotSupported { .. } => {
                    "ParameterDataProviderNotSupported"
                }
                LoadError::ParameterDataProviderInitialization { .. } => {
                    "ParameterDataProviderInitialization"
                }
                LoadError::InvalidThreadingPattern { .. } => "InvalidThreadingPattern",
                LoadError::InvalidQueueState { .. } => "InvalidQueueState",
                LoadError::WorkerSpawn { .. } => "WorkerSpawn",
            },
            AtsError::Environment(_) => "Environment",
            AtsError::Config(_) => "Config",
            AtsError::Client(_) => "Client",
            AtsError::Remote(_) => "Remote",
            AtsError::LockPoisoned => "LockPoisoned",
        }
    }

    /// Convert into the serializable form, flattening the cause chain.
    pub fn to_remote(&self) -> RemoteError {
        if let AtsError::Remote(remote) = self {
            return remote.clone();
        }
        let mut causes = Vec::new();
        let mut current = StdError::source(self);
        while let Some(cause) = current {
            causes.push(cause.to_string());
            current = cause.source();
        }
        RemoteError {
            kind: self.kind().to_string(),
            message: self.to_string(),
            causes,
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for AtsError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        AtsError::LockPoisoned
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("disk full")]
    struct DiskFull;

    #[test]
    fn test_component_error_display_no_such_component() {
        let err = ComponentError::NoSuchComponent {
            component: "Calc".to_string(),
            caller: "10.0.0.1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Calc"));
        assert!(msg.contains("10.0.0.1"));
    }

    #[test]
    fn test_load_error_display_already_exists() {
        let err = LoadError::LoadQueueAlreadyExists {
            queue: "Q1".to_string(),
            state: "RUNNING".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Q1"));
        assert!(msg.contains("RUNNING"));
    }

    #[test]
    fn test_internal_component_keeps_source_chain() {
        let err = AtsError::from(ActionError::internal("Calc", "divide", Box::new(DiskFull)));
        let remote = err.to_remote();
        assert_eq!(remote.kind, "InternalComponent");
        assert!(remote.message.contains("divide"));
        assert!(remote.causes.iter().any(|c| c.contains("disk full")));
    }

    #[test]
    fn test_ats_error_from_variants() {
        let component = AtsError::from(ComponentError::ComponentAlreadyDefined {
            component: "Calc".to_string(),
        });
        assert!(matches!(component, AtsError::Component(_)));
        assert_eq!(component.kind(), "ComponentAlreadyDefined");

        let load = AtsError::from(LoadError::NoSuchLoadQueue {
            queue: "Q".to_string(),
        });
        assert!(matches!(load, AtsError::Load(_)));
        assert_eq!(load.kind(), "NoSuchLoadQueue");

        let config = AtsError::from(ConfigError::InvalidValue {
            field: "default_caller".to_string(),
            value: "".to_string(),
            reason: "must not be empty".to_string(),
        });
        assert!(matches!(config, AtsError::Config(_)));
    }

    #[test]
    fn test_remote_error_roundtrips_unchanged() {
        let remote = RemoteError {
            kind: "NoSuchAction".to_string(),
            message: "missing".to_string(),
            causes: vec![],
        };
        let err = AtsError::from(remote.clone());
        assert_eq!(err.to_remote(), remote);
    }

    #[test]
    fn test_poisoned_lock_maps_to_lock_poisoned() {
        let lock = std::sync::Mutex::new(0);
        let _ = std::panic::catch_unwind(|| {
            let _guard = lock.lock().unwrap();
            panic!("poison");
        });
        let err: AtsError = lock.lock().unwrap_err().into();
        assert!(matches!(err, AtsError::LockPoisoned));
    }
}
