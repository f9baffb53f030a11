//! Caller identity and action requests

use crate::value::{ArgType, ArgValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller id of the local process; holds the template components.
pub const DEFAULT_CALLER: &str = "127.0.0.1";

/// Component name of the system monitoring service. Requests to it are never queued.
pub const MONITORING_COMPONENT: &str = "auto-system-monitoring";

/// Identity of the remote test executor on whose behalf actions run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The local caller.
    pub fn local() -> Self {
        Self(DEFAULT_CALLER.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CallerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A single action invocation: component, action and arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    component: String,
    action: String,
    args: Vec<ArgValue>,
    /// Overrides the transfer unit declared by the action
    transfer_unit: Option<String>,
    /// Whether the execution is registered in the execution statistics
    register_execution: bool,
}

impl ActionRequest {
    pub fn new(component: &str, action: &str, args: Vec<ArgValue>) -> Self {
        Self {
            component: component.to_string(),
            action: action.to_string(),
            args,
            transfer_unit: None,
            register_execution: true,
        }
    }

    pub fn with_transfer_unit(mut self, unit: &str) -> Self {
        self.transfer_unit = Some(unit.to_string());
        self
    }

    pub fn without_registration(mut self) -> Self {
        self.register_execution = false;
        self
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn args(&self) -> &[ArgValue] {
        &self.args
    }

    pub fn transfer_unit(&self) -> Option<&str> {
        self.transfer_unit.as_deref()
    }

    pub fn register_execution(&self) -> bool {
        self.register_execution
    }

    /// Runtime type of every argument, `null` mapped to the placeholder type.
    pub fn arg_types(&self) -> Vec<ArgType> {
        self.args.iter().map(ArgValue::arg_type).collect()
    }

    /// Short human form, e.g. `Calc.add(2, 3)`.
    pub fn describe(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.to_string()).collect();
        format!("{}.{}({})", self.component, self.action, args.join(", "))
    }
}

// =============================================================================
// TESTS
// =============================================================================
