//! ATS Client - Action Queues and Multi-Agent Load Coordination
//!
//! The test executor side of ATS. An [`AgentClient`] calls agents over any
//! [`ats_core::AgentTransport`]; a [`QueueRegistry`] captures action requests
//! into named queues and runs them on the local load engine or spread across
//! several agents.

pub mod client;
pub mod executor;
pub mod queue;

pub use client::AgentClient;
pub use executor::{DistributedLoadExecutor, LoadExecutor, LocalLoadExecutor};
pub use queue::{ActionQueue, Dispatched, QueueRegistry};
