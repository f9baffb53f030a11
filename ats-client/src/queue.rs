//! Action Queues - Named, sequence-numbered load queues of one test executor
//!
//! A queue in capture mode buffers every submitted request instead of sending
//! it. Requests to the monitoring component are the exception and always run
//! at once. `execute_queued_actions` then hands the buffer to a local or a
//! distributed [`LoadExecutor`].

use crate::client::AgentClient;
use crate::executor::{DistributedLoadExecutor, LoadExecutor, LocalLoadExecutor};
use ats_agent::LoadHandlerRegistry;
use ats_core::{
    ActionRequest, ArgValue, AtsResult, ClientError, LoadQueueResult, LoaderDataConfig,
    QueueStatistics, ThreadingPattern, MONITORING_COMPONENT,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// What happened to a submitted request.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    /// Buffered for a later `execute_queued_actions`
    Queued,
    /// Sent at once; carries the action's return value
    Executed(ArgValue),
}

// =============================================================================
// ACTION QUEUE
// =============================================================================

/// One named queue. `(name, sequence)` identifies it.
pub struct ActionQueue {
    name: String,
    sequence: u32,
    agents: Mutex<Vec<String>>,
    requests: Mutex<Vec<ActionRequest>>,
    queueing: AtomicBool,
    /// Set once the queue is known to have finished on every agent
    finished: AtomicBool,
    executor: Mutex<Option<Arc<dyn LoadExecutor>>>,
}

impl ActionQueue {
    fn new(name: &str, sequence: u32, agents: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            sequence,
            agents: Mutex::new(agents),
            requests: Mutex::new(Vec::new()),
            queueing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            executor: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn agents(&self) -> AtsResult<Vec<String>> {
        Ok(self.agents.lock()?.clone())
    }

    pub fn is_queueing(&self) -> bool {
        self.queueing.load(Ordering::SeqCst)
    }

    /// Whether a blocking run or a wait has seen this queue finish.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    /// Number of buffered requests.
    pub fn queued_count(&self) -> AtsResult<usize> {
        Ok(self.requests.lock()?.len())
    }

    fn stored_executor(&self) -> AtsResult<Option<Arc<dyn LoadExecutor>>> {
        Ok(self.executor.lock()?.clone())
    }
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("name", &self.name)
            .field("sequence", &self.sequence)
            .field("queueing", &self.is_queueing())
            .finish()
    }
}

// =============================================================================
// QUEUE REGISTRY
// =============================================================================

/// Every queue created by one test executor.
pub struct QueueRegistry {
    client: AgentClient,
    local: Option<Arc<LoadHandlerRegistry>>,
    queues: Mutex<Vec<Arc<ActionQueue>>>,
    current: Mutex<Option<Arc<ActionQueue>>>,
}

impl QueueRegistry {
    pub fn new(client: AgentClient) -> Self {
        Self {
            client,
            local: None,
            queues: Mutex::new(Vec::new()),
            current: Mutex::new(None),
        }
    }

    /// Queues that target no agent run on this in-process load engine.
    pub fn with_local_loads(mut self, loads: Arc<LoadHandlerRegistry>) -> Self {
        self.local = Some(loads);
        self
    }

    pub fn client(&self) -> &AgentClient {
        &self.client
    }

    /// Create the next queue named `name` and make it current. Sequences
    /// start at 1 and grow per name.
    pub fn get_new_instance(&self, agents: &[String], name: &str) -> AtsResult<Arc<ActionQueue>> {
        let mut queues = self.queues.lock()?;
        let sequence = queues
            .iter()
            .filter(|q| q.name == name)
            .map(|q| q.sequence)
            .max()
            .unwrap_or(0)
            + 1;
        let queue = Arc::new(ActionQueue::new(name, sequence, agents.to_vec()));
        queues.push(queue.clone());
        *self.current.lock()? = Some(queue.clone());
        tracing::debug!(queue = %name, sequence, agents = ?agents, "Created action queue");
        Ok(queue)
    }

    pub fn get_current_instance(&self) -> AtsResult<Option<Arc<ActionQueue>>> {
        Ok(self.current.lock()?.clone())
    }

    /// Switch the current queue into capture mode.
    pub fn start_queueing(&self) -> AtsResult<()> {
        let current = self.get_current_instance()?;
        match current {
            Some(queue) => {
                queue.queueing.store(true, Ordering::SeqCst);
                tracing::info!(queue = %queue.name, sequence = queue.sequence, "Started queueing actions");
                Ok(())
            }
            None => Err(ClientError::QueueNotFound {
                queue: "<current>".to_string(),
            }
            .into()),
        }
    }

    /// Buffer `request` if the current queue captures, otherwise run it on `agent`.
    pub fn submit(&self, agent: &str, request: ActionRequest) -> AtsResult<Dispatched> {
        if request.component() != MONITORING_COMPONENT {
            if let Some(queue) = self.get_current_instance()? {
                if queue.is_queueing() {
                    queue.requests.lock()?.push(request);
                    return Ok(Dispatched::Queued);
                }
            }
        }
        self.client
            .execute_action(agent, &request)
            .map(Dispatched::Executed)
    }

    /// Run the buffer of the current queue on `agents`, or locally when empty.
    pub fn execute_queued_actions(
        &self,
        agents: &[String],
        pattern: Option<ThreadingPattern>,
        data_config: LoaderDataConfig,
    ) -> AtsResult<Arc<ActionQueue>> {
        let queue = self
            .get_current_instance()?
            .ok_or_else(|| ClientError::QueueNotFound {
                queue: "<current>".to_string(),
            })?;
        let pattern = pattern.ok_or_else(|| ClientError::MissingThreadingPattern {
            queue: queue.name.clone(),
        })?;

        queue.queueing.store(false, Ordering::SeqCst);
        let requests = std::mem::take(&mut *queue.requests.lock()?);

        let targets: Vec<String> = if !agents.is_empty() && (pattern.thread_count() as usize) < agents.len() {
            tracing::warn!(
                queue = %queue.name,
                threads = pattern.thread_count(),
                agents = agents.len(),
                agent = %agents[0],
                "Fewer threads than agents, the queue will run on one agent only"
            );
            vec![agents[0].clone()]
        } else {
            agents.to_vec()
        };

        *queue.agents.lock()? = targets.clone();
        let executor = self.executor_for(&queue.name, queue.sequence, &targets)?;
        *queue.executor.lock()? = Some(executor.clone());

        tracing::info!(
            queue = %queue.name,
            sequence = queue.sequence,
            actions = requests.len(),
            agents = ?targets,
            "Executing queued actions"
        );
        let block = pattern.block_until_completion();
        executor.execute(requests, pattern, data_config)?;
        if block {
            queue.mark_finished();
        }
        Ok(queue)
    }

    pub fn wait_until_queue_finish(&self, name: &str) -> AtsResult<()> {
        for queue in self.queues_named(name)? {
            self.wait_for(&queue)?;
        }
        Ok(())
    }

    pub fn wait_until_all_queues_finish(&self) -> AtsResult<()> {
        let queues = self.queues.lock()?.clone();
        for queue in queues {
            self.wait_for(&queue)?;
        }
        Ok(())
    }

    /// Cancel every unfinished queue named `name`.
    pub fn cancel_queue(&self, name: &str) -> AtsResult<()> {
        for queue in self.queues_named(name)? {
            if !queue.is_finished() {
                self.executor_of(&queue)?.cancel()?;
            }
        }
        Ok(())
    }

    /// An unknown name is simply not running.
    pub fn is_queue_running(&self, name: &str) -> AtsResult<bool> {
        let queues = self.queues.lock()?.clone();
        for queue in queues.iter().filter(|q| q.name == name && !q.is_finished()) {
            if self.executor_of(queue)?.is_running()? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn wait_for(&self, queue: &ActionQueue) -> AtsResult<()> {
        if queue.is_finished() {
            return Ok(());
        }
        self.executor_of(queue)?.wait_until_finished()?;
        queue.mark_finished();
        Ok(())
    }

    /// Statistics of the latest queue named `name`, merged across its agents.
    pub fn queue_statistics(&self, name: &str) -> AtsResult<QueueStatistics> {
        self.executor_of(&*self.latest(name)?)?.statistics()
    }

    pub fn queue_result(&self, name: &str) -> AtsResult<LoadQueueResult> {
        self.executor_of(&*self.latest(name)?)?.result()
    }

    fn latest(&self, name: &str) -> AtsResult<Arc<ActionQueue>> {
        self.queues
            .lock()?
            .iter()
            .filter(|q| q.name == name)
            .max_by_key(|q| q.sequence)
            .cloned()
            .ok_or_else(|| {
                ClientError::QueueNotFound {
                    queue: name.to_string(),
                }
                .into()
            })
    }

    fn queues_named(&self, name: &str) -> AtsResult<Vec<Arc<ActionQueue>>> {
        let queues: Vec<Arc<ActionQueue>> = self
            .queues
            .lock()?
            .iter()
            .filter(|q| q.name == name)
            .cloned()
            .collect();
        if queues.is_empty() {
            return Err(ClientError::QueueNotFound {
                queue: name.to_string(),
            }
            .into());
        }
        Ok(queues)
    }

    /// The executor that ran `queue`, or a fresh one bound to its agents.
    fn executor_of(&self, queue: &ActionQueue) -> AtsResult<Arc<dyn LoadExecutor>> {
        if let Some(executor) = queue.stored_executor()? {
            return Ok(executor);
        }
        let agents = queue.agents()?;
        self.executor_for(&queue.name, queue.sequence, &agents)
    }

    fn executor_for(
        &self,
        name: &str,
        sequence: u32,
        agents: &[String],
    ) -> AtsResult<Arc<dyn LoadExecutor>> {
        if !agents.is_empty() {
            return Ok(Arc::new(DistributedLoadExecutor::new(
                name,
                sequence,
                agents.to_vec(),
                self.client.clone(),
            )));
        }
        let loads = self.local.as_ref().ok_or_else(|| ClientError::NoLocalEngine {
            queue: name.to_string(),
        })?;
        let handler = loads.handler_for(self.client.caller())?;
        Ok(Arc::new(LocalLoadExecutor::new(name, sequence, handler)))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ats_core::{AgentTransport, CallerId};
    use proptest::prelude::*;

    struct RefusingTransport;

    impl AgentTransport for RefusingTransport {
        fn call(&self, agent: &str, _payload: &[u8]) -> Result<Vec<u8>, ClientError> {
            Err(ClientError::Transport {
                agent: agent.to_string(),
                reason: "refused".to_string(),
            })
        }
    }

    fn registry() -> QueueRegistry {
        QueueRegistry::new(AgentClient::new(
            Arc::new(RefusingTransport),
            CallerId::from("tester"),
        ))
    }

    #[test]
    fn test_sequences_grow_per_name() -> AtsResult<()> {
        let queues = registry();
        let agents = vec!["a1".to_string()];
        assert_eq!(queues.get_new_instance(&agents, "Q")?.sequence(), 1);
        assert_eq!(queues.get_new_instance(&agents, "Q")?.sequence(), 2);
        assert_eq!(queues.get_new_instance(&agents, "R")?.sequence(), 1);
        let current = queues.get_current_instance()?.map(|q| q.name().to_string());
        assert_eq!(current.as_deref(), Some("R"));
        Ok(())
    }

    #[test]
    fn test_capture_mode_buffers_requests() -> AtsResult<()> {
        let queues = registry();
        queues.get_new_instance(&[], "Q")?;
        queues.start_queueing()?;
        let dispatched = queues.submit("a1", ActionRequest::new("Calc", "add", vec![]))?;
        assert_eq!(dispatched, Dispatched::Queued);
        let current = queues.get_current_instance()?.map(|q| q.queued_count());
        assert!(matches!(current, Some(Ok(1))));
        Ok(())
    }

    #[test]
    fn test_monitoring_requests_bypass_capture() -> AtsResult<()> {
        let queues = registry();
        queues.get_new_instance(&[], "Q")?;
        queues.start_queueing()?;
        // goes straight to the transport, which refuses
        let result = queues.submit("a1", ActionRequest::new(MONITORING_COMPONENT, "poll", vec![]));
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn test_missing_pattern_rejected() -> AtsResult<()> {
        let queues = registry();
        queues.get_new_instance(&[], "Q")?;
        let result = queues.execute_queued_actions(&[], None, LoaderDataConfig::new());
        assert_eq!(result.map(|_| ()).map_err(|e| e.kind()), Err("Client"));
        Ok(())
    }

    #[test]
    fn test_unknown_queue_not_found() {
        let queues = registry();
        let err = queues.cancel_queue("nope").unwrap_err();
        assert!(err.to_string().contains("Queue with name 'nope' not found"));
        assert!(queues.wait_until_queue_finish("nope").is_err());
        assert!(!queues.is_queue_running("nope").unwrap());
    }

    #[test]
    fn test_finished_queue_is_not_contacted_again() -> AtsResult<()> {
        let queues = registry();
        let agents = vec!["a1".to_string()];
        let queue = queues.get_new_instance(&agents, "Q")?;
        // the agent refuses every call, so only skipped operations can succeed
        assert!(queues.cancel_queue("Q").is_err());

        queue.mark_finished();
        assert!(queue.is_finished());
        queues.cancel_queue("Q")?;
        queues.wait_until_queue_finish("Q")?;
        queues.wait_until_all_queues_finish()?;
        assert!(!queues.is_queue_running("Q")?);
        Ok(())
    }

    #[test]
    fn test_local_queue_needs_engine() -> AtsResult<()> {
        let queues = registry();
        queues.get_new_instance(&[], "Q")?;
        let pattern = ThreadingPattern::all_at_once(1, 1, true)?;
        let err = queues
            .execute_queued_actions(&[], Some(pattern), LoaderDataConfig::new())
            .unwrap_err();
        assert!(err.to_string().contains("no local load engine"));
        Ok(())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Each name numbers its own queues 1, 2, 3... whatever the interleaving.
        #[test]
        fn prop_sequences_count_per_name(names in prop::collection::vec(0usize..3, 1..20)) {
            let queues = registry();
            let mut created = [0u32; 3];
            for index in names {
                created[index] += 1;
                let queue = queues.get_new_instance(&[], &format!("Q{}", index)).unwrap();
                prop_assert_eq!(queue.sequence(), created[index]);
                prop_assert!(!queue.is_finished());
            }
        }
    }
}
