//! Wire contract between the coordinator and agents
//!
//! Calls and replies are JSON encoded. The transport only moves bytes to an
//! agent address and back; an agent failure travels as a [`RemoteError`].

use crate::data_config::LoaderDataConfig;
use crate::error::{AtsError, AtsResult, ClientError, RemoteError};
use crate::pattern::ThreadingPattern;
use crate::queue::QueueStatistics;
use crate::request::{ActionRequest, CallerId};
use crate::value::ArgValue;
use serde::{Deserialize, Serialize};

/// A call addressed to an agent on behalf of a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEnvelope {
    pub caller: CallerId,
    pub call: AgentCall,
}

/// Operations an agent serves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentCall {
    ExecuteAction(ActionRequest),
    IsComponentLoaded {
        component: String,
    },
    ScheduleActions {
        queue: String,
        queue_id: u32,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        data_config: LoaderDataConfig,
        use_synchronized_iterations: bool,
    },
    StartQueue {
        queue: String,
    },
    ResumeQueue {
        queue: String,
    },
    CancelQueue {
        queue: String,
    },
    CancelAllQueues,
    WaitUntilQueueFinish {
        queue: String,
    },
    WaitUntilAllQueuesFinish,
    WaitUntilQueueIsPaused {
        queue: String,
    },
    IsQueueRunning {
        queue: String,
    },
    RunningQueuesCount,
    QueueStatistics {
        queue: String,
    },
    RestoreEnvironment {
        component: Option<String>,
        environment: Option<String>,
        folder: Option<String>,
    },
    BackupEnvironment {
        component: Option<String>,
        environment: Option<String>,
        folder: Option<String>,
    },
}

/// Successful reply to an [`AgentCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgentReply {
    Done,
    Value(ArgValue),
    Flag(bool),
    Count(u32),
    Statistics(Option<QueueStatistics>),
}

/// Moves encoded calls to an agent and returns the encoded reply.
pub trait AgentTransport: Send + Sync {
    fn call(&self, agent: &str, payload: &[u8]) -> Result<Vec<u8>, ClientError>;
}

pub fn encode_envelope(envelope: &AgentEnvelope) -> AtsResult<Vec<u8>> {
    serde_json::to_vec(envelope).map_err(codec_error)
}

pub fn decode_envelope(payload: &[u8]) -> AtsResult<AgentEnvelope> {
    serde_json::from_slice(payload).map_err(codec_error)
}

pub fn encode_reply(reply: &Result<AgentReply, RemoteError>) -> AtsResult<Vec<u8>> {
    serde_json::to_vec(reply).map_err(codec_error)
}

/// Decode a reply; an agent-side failure becomes [`AtsError::Remote`].
pub fn decode_reply(payload: &[u8]) -> AtsResult<AgentReply> {
    let reply: Result<AgentReply, RemoteError> =
        serde_json::from_slice(payload).map_err(codec_error)?;
    reply.map_err(AtsError::Remote)
}

fn codec_error(e: serde_json::Error) -> AtsError {
    ClientError::Codec {
        reason: e.to_string(),
    }
    .into()
}

// =============================================================================
// TESTS
// =============================================================================
