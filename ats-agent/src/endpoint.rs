//! Agent Endpoint - Serves encoded calls from coordinators
//!
//! [`AgentEndpoint::handle`] decodes an [`AgentEnvelope`], runs the call for
//! the envelope's caller and encodes the outcome. [`LoopbackTransport`] routes
//! calls to endpoints living in the same process.

use crate::dispatcher::ActionDispatcher;
use crate::environment::EnvironmentHandler;
use crate::load::LoadHandlerRegistry;
use ats_core::{
    decode_envelope, encode_reply, AgentCall, AgentEnvelope, AgentReply, AgentTransport,
    AtsResult, CallerId, ClientError, RemoteError,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Agent side of the wire contract.
#[derive(Clone)]
pub struct AgentEndpoint {
    dispatcher: ActionDispatcher,
    loads: Arc<LoadHandlerRegistry>,
    environments: Arc<EnvironmentHandler>,
}

impl AgentEndpoint {
    pub fn new(
        dispatcher: ActionDispatcher,
        loads: Arc<LoadHandlerRegistry>,
        environments: Arc<EnvironmentHandler>,
    ) -> Self {
        Self {
            dispatcher,
            loads,
            environments,
        }
    }

    /// Decode, serve and encode one call. Never fails: decoding and call
    /// errors are encoded as the reply.
    pub fn handle(&self, payload: &[u8]) -> Vec<u8> {
        let outcome = decode_envelope(payload)
            .and_then(|envelope| self.serve(envelope))
            .map_err(|e| {
                tracing::debug!(error = %e, "Agent call failed");
                e.to_remote()
            });
        encode_reply(&outcome).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Could not encode agent reply");
            let fallback: Result<AgentReply, RemoteError> = Err(e.to_remote());
            serde_json::to_vec(&fallback).unwrap_or_default()
        })
    }

    /// Serve a decoded call.
    pub fn serve(&self, envelope: AgentEnvelope) -> AtsResult<AgentReply> {
        let caller = envelope.caller;
        tracing::trace!(caller = %caller, call = ?envelope.call, "Serving agent call");
        match envelope.call {
            AgentCall::ExecuteAction(request) => self
                .dispatcher
                .execute(&caller, &request)
                .map(AgentReply::Value),
            AgentCall::IsComponentLoaded { component } => Ok(AgentReply::Flag(
                self.dispatcher.is_component_loaded(&caller, &component),
            )),
            AgentCall::ScheduleActions {
                queue,
                queue_id,
                requests,
                pattern,
                data_config,
                use_synchronized_iterations,
            } => {
                self.loads.handler_for(&caller)?.schedule_actions(
                    &queue,
                    queue_id,
                    requests,
                    pattern,
                    &data_config,
                    use_synchronized_iterations,
                )?;
                Ok(AgentReply::Done)
            }
            AgentCall::StartQueue { queue } => {
                self.loads.handler_for(&caller)?.start_queue(&queue)?;
                Ok(AgentReply::Done)
            }
            AgentCall::ResumeQueue { queue } => {
                self.loads.handler_for(&caller)?.resume_queue(&queue)?;
                Ok(AgentReply::Done)
            }
            AgentCall::CancelQueue { queue } => {
                self.loads.handler_for(&caller)?.cancel_queue(&queue)?;
                Ok(AgentReply::Done)
            }
            AgentCall::CancelAllQueues => {
                self.loads.cancel_all_queues_from_agent(&caller)?;
                Ok(AgentReply::Done)
            }
            AgentCall::WaitUntilQueueFinish { queue } => {
                self.loads
                    .handler_for(&caller)?
                    .wait_until_queue_finish(&queue)?;
                Ok(AgentReply::Done)
            }
            AgentCall::WaitUntilAllQueuesFinish => {
                self.loads
                    .handler_for(&caller)?
                    .wait_until_all_queues_finish()?;
                Ok(AgentReply::Done)
            }
            AgentCall::WaitUntilQueueIsPaused { queue } => self
                .loads
                .handler_for(&caller)?
                .wait_until_queue_is_paused(&queue)
                .map(AgentReply::Flag),
            AgentCall::IsQueueRunning { queue } => self
                .loads
                .handler_for(&caller)?
                .is_queue_running(&queue)
                .map(AgentReply::Flag),
            AgentCall::RunningQueuesCount => {
                let count = self.loads.handler_for(&caller)?.running_queues_count()?;
                Ok(AgentReply::Count(u32::try_from(count).unwrap_or(u32::MAX)))
            }
            AgentCall::QueueStatistics { queue } => self
                .loads
                .handler_for(&caller)?
                .queue_statistics(&queue)
                .map(AgentReply::Statistics),
            AgentCall::RestoreEnvironment {
                component,
                environment,
                folder,
            } => {
                let folder = folder.as_deref().map(Path::new);
                match component {
                    Some(component) => self.environments.restore(
                        &caller,
                        &component,
                        environment.as_deref(),
                        folder,
                    )?,
                    None => {
                        self.environments
                            .restore_all(&caller, environment.as_deref(), folder)?
                    }
                }
                Ok(AgentReply::Done)
            }
            AgentCall::BackupEnvironment {
                component,
                environment,
                folder,
            } => {
                let folder = folder.as_deref().map(Path::new);
                match component {
                    Some(component) => {
                        self.environments
                            .backup(&component, environment.as_deref(), folder)?
                    }
                    None => self.environments.backup_all(environment.as_deref(), folder)?,
                }
                Ok(AgentReply::Done)
            }
        }
    }

    /// Serve a call without going through the codec.
    pub fn call(&self, caller: &CallerId, call: AgentCall) -> AtsResult<AgentReply> {
        self.serve(AgentEnvelope {
            caller: caller.clone(),
            call,
        })
    }
}

/// In-process transport: agent addresses map to endpoints.
#[derive(Default)]
pub struct LoopbackTransport {
    endpoints: RwLock<HashMap<String, AgentEndpoint>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve calls to `address` with `endpoint`.
    pub fn register(&self, address: &str, endpoint: AgentEndpoint) -> AtsResult<()> {
        self.endpoints
            .write()?
            .insert(address.to_string(), endpoint);
        Ok(())
    }

    pub fn addresses(&self) -> AtsResult<Vec<String>> {
        let mut addresses: Vec<String> = self.endpoints.read()?.keys().cloned().collect();
        addresses.sort();
        Ok(addresses)
    }
}

impl AgentTransport for LoopbackTransport {
    fn call(&self, agent: &str, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        // clone out so long calls never hold the table lock
        let endpoint = self
            .endpoints
            .read()
            .map_err(|_| ClientError::Transport {
                agent: agent.to_string(),
                reason: "endpoint table lock poisoned".to_string(),
            })?
            .get(agent)
            .cloned()
            .ok_or_else(|| ClientError::Transport {
                agent: agent.to_string(),
                reason: "no agent is listening on this address".to_string(),
            })?;
        Ok(endpoint.handle(payload))
    }
}

// =============================================================================
// TESTS
// =============================================================================
