//! Load engine: named queues of actions run by worker threads

mod gate;
mod handler;
mod loader;
mod providers;
mod task;

pub use handler::{LoadHandlerRegistry, LoadQueueHandler};
pub use loader::QueueLoader;
pub use providers::{
    CustomProviderFactory, DataProviderFactory, IndexedDataProvider, ParameterDataProvider,
};
