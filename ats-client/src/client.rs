//! Typed calls to remote agents over an [`AgentTransport`]

use ats_core::{
    decode_reply, encode_envelope, ActionRequest, AgentCall, AgentEnvelope, AgentReply,
    AgentTransport, ArgValue, AtsResult, CallerId, ClientError, LoaderDataConfig,
    QueueStatistics, ThreadingPattern,
};
use std::sync::Arc;

/// Calls agents on behalf of one caller.
#[derive(Clone)]
pub struct AgentClient {
    transport: Arc<dyn AgentTransport>,
    caller: CallerId,
}

impl AgentClient {
    pub fn new(transport: Arc<dyn AgentTransport>, caller: CallerId) -> Self {
        Self { transport, caller }
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Send one call to `agent` and decode its reply.
    pub fn call(&self, agent: &str, call: AgentCall) -> AtsResult<AgentReply> {
        let payload = encode_envelope(&AgentEnvelope {
            caller: self.caller.clone(),
            call,
        })?;
        let reply = self.transport.call(agent, &payload)?;
        decode_reply(&reply)
    }

    pub fn execute_action(&self, agent: &str, request: &ActionRequest) -> AtsResult<ArgValue> {
        match self.call(agent, AgentCall::ExecuteAction(request.clone()))? {
            AgentReply::Value(value) => Ok(value),
            other => Err(unexpected(agent, "ExecuteAction", &other)),
        }
    }

    pub fn is_component_loaded(&self, agent: &str, component: &str) -> AtsResult<bool> {
        self.flag(
            agent,
            AgentCall::IsComponentLoaded {
                component: component.to_string(),
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn schedule_actions(
        &self,
        agent: &str,
        queue: &str,
        queue_id: u32,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        data_config: LoaderDataConfig,
        use_synchronized_iterations: bool,
    ) -> AtsResult<()> {
        self.done(
            agent,
            AgentCall::ScheduleActions {
                queue: queue.to_string(),
                queue_id,
                requests,
                pattern,
                data_config,
                use_synchronized_iterations,
            },
        )
    }

    pub fn start_queue(&self, agent: &str, queue: &str) -> AtsResult<()> {
        self.done(agent, AgentCall::StartQueue { queue: queue.to_string() })
    }

    pub fn resume_queue(&self, agent: &str, queue: &str) -> AtsResult<()> {
        self.done(agent, AgentCall::ResumeQueue { queue: queue.to_string() })
    }

    pub fn cancel_queue(&self, agent: &str, queue: &str) -> AtsResult<()> {
        self.done(agent, AgentCall::CancelQueue { queue: queue.to_string() })
    }

    pub fn cancel_all_queues(&self, agent: &str) -> AtsResult<()> {
        self.done(agent, AgentCall::CancelAllQueues)
    }

    pub fn wait_until_queue_finish(&self, agent: &str, queue: &str) -> AtsResult<()> {
        self.done(
            agent,
            AgentCall::WaitUntilQueueFinish {
                queue: queue.to_string(),
            },
        )
    }

    pub fn wait_until_all_queues_finish(&self, agent: &str) -> AtsResult<()> {
        self.done(agent, AgentCall::WaitUntilAllQueuesFinish)
    }

    pub fn wait_until_queue_is_paused(&self, agent: &str, queue: &str) -> AtsResult<bool> {
        self.flag(
            agent,
            AgentCall::WaitUntilQueueIsPaused {
                queue: queue.to_string(),
            },
        )
    }

    pub fn is_queue_running(&self, agent: &str, queue: &str) -> AtsResult<bool> {
        self.flag(
            agent,
            AgentCall::IsQueueRunning {
                queue: queue.to_string(),
            },
        )
    }

    pub fn running_queues_count(&self, agent: &str) -> AtsResult<u32> {
        match self.call(agent, AgentCall::RunningQueuesCount)? {
            AgentReply::Count(count) => Ok(count),
            other => Err(unexpected(agent, "RunningQueuesCount", &other)),
        }
    }

    pub fn queue_statistics(&self, agent: &str, queue: &str) -> AtsResult<Option<QueueStatistics>> {
        match self.call(
            agent,
            AgentCall::QueueStatistics {
                queue: queue.to_string(),
            },
        )? {
            AgentReply::Statistics(statistics) => Ok(statistics),
            other => Err(unexpected(agent, "QueueStatistics", &other)),
        }
    }

    /// Restore `environment` of `component`; `None` component restores all.
    pub fn restore_environment(
        &self,
        agent: &str,
        component: Option<&str>,
        environment: Option<&str>,
        folder: Option<&str>,
    ) -> AtsResult<()> {
        self.done(
            agent,
            AgentCall::RestoreEnvironment {
                component: component.map(str::to_string),
                environment: environment.map(str::to_string),
                folder: folder.map(str::to_string),
            },
        )
    }

    /// Back up `environment` of `component`; `None` component backs up all.
    pub fn backup_environment(
        &self,
        agent: &str,
        component: Option<&str>,
        environment: Option<&str>,
        folder: Option<&str>,
    ) -> AtsResult<()> {
        self.done(
            agent,
            AgentCall::BackupEnvironment {
                component: component.map(str::to_string),
                environment: environment.map(str::to_string),
                folder: folder.map(str::to_string),
            },
        )
    }

    fn done(&self, agent: &str, call: AgentCall) -> AtsResult<()> {
        match self.call(agent, call)? {
            AgentReply::Done => Ok(()),
            other => Err(unexpected(agent, "Done", &other)),
        }
    }

    fn flag(&self, agent: &str, call: AgentCall) -> AtsResult<bool> {
        match self.call(agent, call)? {
            AgentReply::Flag(flag) => Ok(flag),
            other => Err(unexpected(agent, "Flag", &other)),
        }
    }
}

fn unexpected(agent: &str, expected: &str, got: &AgentReply) -> ats_core::AtsError {
    ClientError::Codec {
        reason: format!("agent {} answered {:?} where {} was expected", agent, got, expected),
    }
    .into()
}
