//! ATS Agent - Component Registry, Action Dispatch and Load Engine
//!
//! An agent hosts deployed components. Callers invoke single actions through
//! the [`ActionDispatcher`] or run named load queues through their
//! [`LoadQueueHandler`]. Every caller works on its own copy of each component,
//! so stateful action classes are never shared between callers.

pub mod agent;
pub mod dispatcher;
pub mod endpoint;
pub mod environment;
pub mod load;
pub mod registry;
pub mod telemetry;

pub use agent::Agent;
pub use dispatcher::ActionDispatcher;
pub use endpoint::{AgentEndpoint, LoopbackTransport};
pub use environment::{
    ComponentEnvironment, ConfigurationManager, Configurator, EnvironmentHandler, EnvironmentUnit,
};
pub use load::{
    CustomProviderFactory, DataProviderFactory, IndexedDataProvider, LoadHandlerRegistry,
    LoadQueueHandler, ParameterDataProvider, QueueLoader,
};
pub use registry::*;
pub use telemetry::{init_tracing, TelemetryConfig, TelemetryError};
