//! Agent facade wiring the registry, dispatcher, environments and load engine

use crate::dispatcher::ActionDispatcher;
use crate::endpoint::AgentEndpoint;
use crate::environment::{ConfigurationManager, Configurator, EnvironmentHandler};
use crate::load::{CustomProviderFactory, DataProviderFactory, LoadHandlerRegistry, LoadQueueHandler};
use crate::registry::{Component, ComponentRepository};
use ats_core::{AgentConfig, AtsResult, CallerId};
use std::sync::Arc;

/// One agent process: deployed components and everything serving them.
pub struct Agent {
    config: AgentConfig,
    repository: Arc<ComponentRepository>,
    dispatcher: ActionDispatcher,
    loads: Arc<LoadHandlerRegistry>,
    environments: Arc<EnvironmentHandler>,
    configurations: ConfigurationManager,
}

impl Agent {
    pub fn new(config: AgentConfig) -> AtsResult<Self> {
        config.validate()?;
        let repository = Arc::new(ComponentRepository::new(CallerId::new(
            config.default_caller.clone(),
        )));
        let providers = Arc::new(DataProviderFactory::new());
        Ok(Self {
            dispatcher: ActionDispatcher::new(repository.clone()),
            loads: Arc::new(LoadHandlerRegistry::new(repository.clone(), providers)),
            environments: Arc::new(EnvironmentHandler::new(
                repository.clone(),
                config.cleanup_on_named_environment,
            )),
            configurations: ConfigurationManager::new(),
            repository,
            config,
        })
    }

    /// Agent configured from `ATS_*` environment variables.
    pub fn from_env() -> AtsResult<Self> {
        Self::new(AgentConfig::from_env())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn deploy_component(&self, component: Component) -> AtsResult<()> {
        self.repository.put_component(component)
    }

    pub fn register_data_provider(&self, kind: &str, factory: Arc<dyn CustomProviderFactory>) {
        self.loads.providers().register_custom(kind, factory);
    }

    pub fn apply_configuration(&self, configurators: Vec<Box<dyn Configurator>>) -> AtsResult<()> {
        self.configurations.apply(configurators)
    }

    /// Initialize every deployed component and take first environment backups.
    pub fn start(&self) -> AtsResult<()> {
        let components = self.repository.component_names()?;
        tracing::info!(components = ?components, "Starting agent");
        self.repository.initialize_all_components()
    }

    /// Cancel all queues, revert configuration, finalize and forget every
    /// component. Continues past failures and reports the first one.
    pub fn shutdown(&self) -> AtsResult<()> {
        tracing::info!("Shutting down agent");
        let cancelled = self.loads.cancel_all();
        let reverted = self.configurations.revert_all();
        if let Err(e) = &reverted {
            tracing::error!(error = %e, "Could not revert configuration");
        }
        let finalized = self.repository.finalize_all_components();
        let cleared = self.repository.clear();
        cancelled.and(reverted).and(finalized).and(cleared)
    }

    pub fn repository(&self) -> &Arc<ComponentRepository> {
        &self.repository
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn environments(&self) -> &Arc<EnvironmentHandler> {
        &self.environments
    }

    pub fn load_handlers(&self) -> &Arc<LoadHandlerRegistry> {
        &self.loads
    }

    pub fn load_handler(&self, caller: &CallerId) -> AtsResult<Arc<LoadQueueHandler>> {
        self.loads.handler_for(caller)
    }

    /// Endpoint serving wire calls against this agent.
    pub fn endpoint(&self) -> AgentEndpoint {
        AgentEndpoint::new(
            self.dispatcher.clone(),
            self.loads.clone(),
            self.environments.clone(),
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================
