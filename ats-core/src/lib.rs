//! ATS Core - Shared Types
//!
//! Value model, error taxonomy, configuration and the agent wire contract.
//! Every other ATS crate depends on this one.

pub mod config;
pub mod data_config;
pub mod error;
pub mod pattern;
pub mod queue;
pub mod request;
pub mod value;
pub mod wire;

pub use config::*;
pub use data_config::*;
pub use error::*;
pub use pattern::*;
pub use queue::*;
pub use request::*;
pub use value::*;
pub use wire::*;
