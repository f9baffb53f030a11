//! Restore and backup of component environments on request

use crate::registry::ComponentRepository;
use ats_core::{AtsResult, CallerId, EnvironmentError};
use std::path::Path;
use std::sync::Arc;

/// Restores and backs up environments of registered components.
pub struct EnvironmentHandler {
    repository: Arc<ComponentRepository>,
    /// Run the cleanup handler after restoring a named (non-default) environment
    cleanup_on_named_environment: bool,
}

impl EnvironmentHandler {
    pub fn new(repository: Arc<ComponentRepository>, cleanup_on_named_environment: bool) -> Self {
        Self {
            repository,
            cleanup_on_named_environment,
        }
    }

    /// Restore one environment of `component`, then run its cleanup handler.
    pub fn restore(
        &self,
        caller: &CallerId,
        component: &str,
        environment: Option<&str>,
        folder: Option<&Path>,
    ) -> AtsResult<()> {
        let env = self
            .repository
            .get_component_environment(component, environment)?;
        env.restore(folder)?;
        tracing::info!(component = %component, environment = %env.name(), "Restored environment");

        if environment.is_some() && !self.cleanup_on_named_environment {
            return Ok(());
        }
        let action_map = self.repository.get_component_action_map(caller, component)?;
        if let Some(cleanup) = action_map.cleanup_handler() {
            cleanup.clean().map_err(|e| EnvironmentError::Restore {
                component: component.to_string(),
                environment: env.name().to_string(),
                reason: format!("cleanup handler failed: {}", e),
            })?;
            tracing::info!(component = %component, "Executed environment cleanup handler");
        }
        Ok(())
    }

    /// Restore `environment` (or the default one) of every component that has it.
    pub fn restore_all(
        &self,
        caller: &CallerId,
        environment: Option<&str>,
        folder: Option<&Path>,
    ) -> AtsResult<()> {
        for component in self.repository.components()? {
            if component.environment(environment).is_some() {
                self.restore(caller, component.name(), environment, folder)?;
            }
        }
        Ok(())
    }

    pub fn backup(
        &self,
        component: &str,
        environment: Option<&str>,
        folder: Option<&Path>,
    ) -> AtsResult<()> {
        let env = self
            .repository
            .get_component_environment(component, environment)?;
        env.backup(folder)?;
        tracing::info!(component = %component, environment = %env.name(), "Backed up environment");
        Ok(())
    }

    /// Back up `environment` (or the default one) of every component that has it.
    pub fn backup_all(&self, environment: Option<&str>, folder: Option<&Path>) -> AtsResult<()> {
        for component in self.repository.components()? {
            if component.environment(environment).is_some() {
                self.backup(component.name(), environment, folder)?;
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
