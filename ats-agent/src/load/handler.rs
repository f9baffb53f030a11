//! Load Queue Handler - Named queues of one caller
//!
//! Finished and cancelled queues are swept out of the live table before every
//! operation; their statistics stay available by name until the queue name is
//! reused. The table lock is never held while waiting on a queue.

use super::loader::QueueLoader;
use super::providers::DataProviderFactory;
use super::task::QueuedAction;
use crate::registry::ComponentRepository;
use ats_core::{
    ActionRequest, AtsResult, CallerId, LoadError, LoadQueueState, LoaderDataConfig,
    QueueStatistics, ThreadingPattern,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Load queues scheduled by one caller.
pub struct LoadQueueHandler {
    caller: CallerId,
    repository: Arc<ComponentRepository>,
    providers: Arc<DataProviderFactory>,
    queues: Mutex<HashMap<String, Arc<QueueLoader>>>,
    finished: Mutex<HashMap<String, QueueStatistics>>,
}

impl LoadQueueHandler {
    pub fn new(
        caller: CallerId,
        repository: Arc<ComponentRepository>,
        providers: Arc<DataProviderFactory>,
    ) -> Self {
        Self {
            caller,
            repository,
            providers,
            queues: Mutex::new(HashMap::new()),
            finished: Mutex::new(HashMap::new()),
        }
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }

    /// Schedule and immediately start a queue.
    pub fn execute_actions(
        &self,
        queue: &str,
        queue_id: u32,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        data_config: &LoaderDataConfig,
    ) -> AtsResult<()> {
        self.schedule_actions(queue, queue_id, requests, pattern, data_config, false)?;
        self.start_queue(queue)
    }

    /// Resolve every request, build the data providers and spawn the workers
    /// of a new queue. The queue waits for [`Self::start_queue`].
    pub fn schedule_actions(
        &self,
        queue: &str,
        queue_id: u32,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        data_config: &LoaderDataConfig,
        use_synchronized_iterations: bool,
    ) -> AtsResult<()> {
        pattern.validate()?;
        self.sweep()?;
        if let Some(existing) = self.queues.lock()?.get(queue) {
            return Err(LoadError::LoadQueueAlreadyExists {
                queue: queue.to_string(),
                state: existing.state().to_string(),
            }
            .into());
        }

        let providers = self
            .providers
            .create_providers(data_config, pattern.thread_count())?;
        let provided: Vec<&str> = providers.iter().map(|p| p.parameter()).collect();

        let mut actions = Vec::with_capacity(requests.len());
        for request in requests {
            let action_map = self
                .repository
                .get_component_action_map(&self.caller, request.component())?;
            let method = action_map.get_action_method(request.action(), &request.arg_types())?;
            actions.push(QueuedAction::new(request, method, &provided));
        }
        for parameter in &provided {
            let users = actions.iter().filter(|a| a.uses_parameter(parameter)).count();
            if users == 0 {
                tracing::warn!(
                    queue = %queue,
                    parameter = %parameter,
                    "Parameter is provided by a data provider but no queued action uses it"
                );
            }
        }

        let loader = QueueLoader::schedule(
            queue,
            queue_id,
            actions,
            providers,
            pattern,
            use_synchronized_iterations,
        )?;

        let mut queues = self.queues.lock()?;
        if let Some(existing) = queues.get(queue) {
            loader.cancel();
            return Err(LoadError::LoadQueueAlreadyExists {
                queue: queue.to_string(),
                state: existing.state().to_string(),
            }
            .into());
        }
        self.finished.lock()?.remove(queue);
        queues.insert(queue.to_string(), Arc::new(loader));
        Ok(())
    }

    pub fn start_queue(&self, queue: &str) -> AtsResult<()> {
        self.get_required(queue)?.start()
    }

    pub fn resume_queue(&self, queue: &str) -> AtsResult<()> {
        self.get_required(queue)?.resume()
    }

    pub fn pause_queue(&self, queue: &str) -> AtsResult<()> {
        self.get_required(queue)?.pause()
    }

    /// Cancel `queue` if it is present.
    pub fn cancel_queue(&self, queue: &str) -> AtsResult<()> {
        match self.get(queue)? {
            Some(loader) => loader.cancel(),
            None => tracing::warn!(queue = %queue, "Cannot cancel queue as such queue is not present"),
        }
        self.sweep()
    }

    pub fn cancel_all_queues(&self) -> AtsResult<()> {
        for loader in self.live()? {
            loader.cancel();
        }
        self.sweep()
    }

    pub fn is_queue_running(&self, queue: &str) -> AtsResult<bool> {
        Ok(self.get(queue)?.is_some_and(|loader| loader.is_running()))
    }

    /// Block until `queue` leaves the running and paused states.
    pub fn wait_until_queue_finish(&self, queue: &str) -> AtsResult<()> {
        match self.get(queue)? {
            Some(loader) => {
                let state = loader.wait_until_finished();
                tracing::info!(queue = %queue, state = %state, "Waited for queue to finish");
            }
            None => tracing::warn!(
                "We will not wait for queue with name '{}' to finish as such queue is not present",
                queue
            ),
        }
        self.sweep()
    }

    pub fn wait_until_all_queues_finish(&self) -> AtsResult<()> {
        for loader in self.live()? {
            loader.wait_until_finished();
        }
        self.sweep()
    }

    /// Block while `queue` is running. True when it is paused afterwards;
    /// false once it finished, even if it was already swept.
    pub fn wait_until_queue_is_paused(&self, queue: &str) -> AtsResult<bool> {
        if let Some(loader) = self.get(queue)? {
            return Ok(loader.wait_until_paused());
        }
        if self.finished.lock()?.contains_key(queue) {
            return Ok(false);
        }
        Err(LoadError::NoSuchLoadQueue {
            queue: queue.to_string(),
        }
        .into())
    }

    pub fn running_queues_count(&self) -> AtsResult<usize> {
        Ok(self
            .live()?
            .iter()
            .filter(|loader| loader.state() == LoadQueueState::Running)
            .count())
    }

    /// Statistics of a live or already swept queue.
    pub fn queue_statistics(&self, queue: &str) -> AtsResult<Option<QueueStatistics>> {
        if let Some(loader) = self.get(queue)? {
            return Ok(Some(loader.statistics()));
        }
        Ok(self.finished.lock()?.get(queue).cloned())
    }

    fn get(&self, queue: &str) -> AtsResult<Option<Arc<QueueLoader>>> {
        self.sweep()?;
        Ok(self.queues.lock()?.get(queue).cloned())
    }

    fn get_required(&self, queue: &str) -> AtsResult<Arc<QueueLoader>> {
        self.get(queue)?.ok_or_else(|| {
            LoadError::NoSuchLoadQueue {
                queue: queue.to_string(),
            }
            .into()
        })
    }

    fn live(&self) -> AtsResult<Vec<Arc<QueueLoader>>> {
        self.sweep()?;
        Ok(self.queues.lock()?.values().cloned().collect())
    }

    /// Move terminal queues out of the live table.
    fn sweep(&self) -> AtsResult<()> {
        let mut queues = self.queues.lock()?;
        let done: Vec<String> = queues
            .iter()
            .filter(|(_, loader)| loader.state().is_terminal())
            .map(|(name, _)| name.clone())
            .collect();
        if done.is_empty() {
            return Ok(());
        }
        let mut finished = self.finished.lock()?;
        for name in done {
            if let Some(loader) = queues.remove(&name) {
                tracing::debug!(queue = %name, state = %loader.state(), "Removed load queue");
                finished.insert(name, loader.statistics());
            }
        }
        Ok(())
    }
}

/// One [`LoadQueueHandler`] per caller.
pub struct LoadHandlerRegistry {
    repository: Arc<ComponentRepository>,
    providers: Arc<DataProviderFactory>,
    handlers: Mutex<HashMap<CallerId, Arc<LoadQueueHandler>>>,
}

impl LoadHandlerRegistry {
    pub fn new(repository: Arc<ComponentRepository>, providers: Arc<DataProviderFactory>) -> Self {
        Self {
            repository,
            providers,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    pub fn providers(&self) -> &Arc<DataProviderFactory> {
        &self.providers
    }

    /// The caller's handler, created on first use.
    pub fn handler_for(&self, caller: &CallerId) -> AtsResult<Arc<LoadQueueHandler>> {
        let mut handlers = self.handlers.lock()?;
        let handler = handlers.entry(caller.clone()).or_insert_with(|| {
            Arc::new(LoadQueueHandler::new(
                caller.clone(),
                self.repository.clone(),
                self.providers.clone(),
            ))
        });
        Ok(handler.clone())
    }

    /// Cancel every queue of `caller`.
    pub fn cancel_all_queues_from_agent(&self, caller: &CallerId) -> AtsResult<()> {
        let handler = self.handlers.lock()?.get(caller).cloned();
        match handler {
            Some(handler) => handler.cancel_all_queues(),
            None => Ok(()),
        }
    }

    /// Cancel every queue of every caller.
    pub fn cancel_all(&self) -> AtsResult<()> {
        let handlers: Vec<_> = self.handlers.lock()?.values().cloned().collect();
        for handler in handlers {
            handler.cancel_all_queues()?;
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ActionClass, ActionSpec, Component};
    use crate::load::providers::{CustomProviderFactory, ParameterDataProvider};
    use ats_core::{
        ArgValue, AtsError, DataSource, ParameterDataConfig, ParamType, ProviderLevel,
    };
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn handler(hits: Arc<AtomicUsize>) -> LoadQueueHandler {
        handler_with(hits, Arc::new(DataProviderFactory::new()))
    }

    fn handler_with(hits: Arc<AtomicUsize>, providers: Arc<DataProviderFactory>) -> LoadQueueHandler {
        let repo = Arc::new(ComponentRepository::new(CallerId::local()));
        let seen = hits.clone();
        repo.put_component(
            Component::builder("Calc")
                .action_class(
                    ActionClass::builder("Calc", move || seen.clone())
                        .action(
                            ActionSpec::new("add")
                                .param("a", ParamType::Int)
                                .param("b", ParamType::Int),
                            |hits: &mut Arc<AtomicUsize>, args| {
                                hits.fetch_add(1, Ordering::SeqCst);
                                Ok(ArgValue::Int(args.int(0)? + args.int(1)?))
                            },
                        )
                        .action(ActionSpec::new("fail"), |_: &mut Arc<AtomicUsize>, _| {
                            Err("always fails".into())
                        })
                        .build(),
                )
                .build(),
        )
        .expect("fresh repository");
        LoadQueueHandler::new(CallerId::from("tester"), repo, providers)
    }

    fn add() -> ActionRequest {
        ActionRequest::new("Calc", "add", vec![ArgValue::Int(1), ArgValue::Int(2)])
    }

    #[test]
    fn test_blocking_queue_runs_every_iteration() -> AtsResult<()> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = handler(hits.clone());
        h.execute_actions(
            "Q1",
            1,
            vec![add(), add()],
            ThreadingPattern::all_at_once(3, 4, true)?,
            &LoaderDataConfig::new(),
        )?;
        assert_eq!(hits.load(Ordering::SeqCst), 24);
        assert_eq!(h.running_queues_count()?, 0);
        let stats = h.queue_statistics("Q1")?.expect("kept after sweep");
        assert_eq!(stats.iterations_passed, 12);
        assert_eq!(stats.actions["Calc add"].passed, 24);
        Ok(())
    }

    #[test]
    fn test_duplicate_live_queue_rejected() -> AtsResult<()> {
        let h = handler(Arc::new(AtomicUsize::new(0)));
        let pattern = ThreadingPattern::all_at_once(1, 1, false)?;
        h.schedule_actions("Q", 1, vec![add()], pattern.clone(), &LoaderDataConfig::new(), false)?;
        let err = h
            .schedule_actions("Q", 2, vec![add()], pattern, &LoaderDataConfig::new(), false)
            .unwrap_err();
        assert!(matches!(
            err,
            AtsError::Load(LoadError::LoadQueueAlreadyExists { .. })
        ));
        h.cancel_queue("Q")?;
        assert!(!h.is_queue_running("Q")?);
        Ok(())
    }

    #[test]
    fn test_name_reusable_after_finish() -> AtsResult<()> {
        let h = handler(Arc::new(AtomicUsize::new(0)));
        let pattern = ThreadingPattern::all_at_once(2, 1, true)?;
        h.execute_actions("Q", 1, vec![add()], pattern.clone(), &LoaderDataConfig::new())?;
        h.execute_actions("Q", 2, vec![add()], pattern, &LoaderDataConfig::new())?;
        Ok(())
    }

    #[test]
    fn test_unknown_queue_operations() {
        let h = handler(Arc::new(AtomicUsize::new(0)));
        for result in [h.start_queue("X"), h.resume_queue("X"), h.pause_queue("X")] {
            assert!(matches!(
                result,
                Err(AtsError::Load(LoadError::NoSuchLoadQueue { .. }))
            ));
        }
        assert!(h.wait_until_queue_finish("X").is_ok());
        assert!(h.wait_until_queue_is_paused("X").is_err());
        assert_eq!(h.queue_statistics("X").unwrap(), None);
    }

    #[test]
    fn test_failed_action_fails_iteration() -> AtsResult<()> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = handler(hits.clone());
        h.execute_actions(
            "Q",
            1,
            vec![ActionRequest::new("Calc", "fail", vec![]), add()],
            ThreadingPattern::all_at_once(1, 3, true)?,
            &LoaderDataConfig::new(),
        )?;
        let stats = h.queue_statistics("Q")?.expect("statistics");
        assert_eq!(stats.iterations_failed, 3);
        assert_eq!(stats.actions["Calc fail"].failed, 3);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn test_provided_parameter_substituted() -> AtsResult<()> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = handler(hits.clone());
        h.execute_actions(
            "Q",
            1,
            vec![add()],
            ThreadingPattern::all_at_once(2, 2, true)?,
            &LoaderDataConfig::new().with(ParameterDataConfig::range("a", 10, 20)),
        )?;
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[test]
    fn test_synchronized_iterations_pause_between_rounds() -> AtsResult<()> {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = handler(hits.clone());
        h.schedule_actions(
            "Q",
            1,
            vec![add()],
            ThreadingPattern::all_at_once(2, 3, false)?,
            &LoaderDataConfig::new(),
            true,
        )?;
        h.start_queue("Q")?;
        assert!(h.wait_until_queue_is_paused("Q")?);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        h.resume_queue("Q")?;
        assert!(h.wait_until_queue_is_paused("Q")?);
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        h.resume_queue("Q")?;
        h.wait_until_queue_finish("Q")?;
        assert_eq!(hits.load(Ordering::SeqCst), 6);
        assert!(!h.is_queue_running("Q")?);
        Ok(())
    }

    struct Exploding;

    impl ParameterDataProvider for Exploding {
        fn parameter(&self) -> &str {
            "a"
        }

        fn next_value(&self, _worker: usize) -> ArgValue {
            panic!("data source went away")
        }
    }

    impl CustomProviderFactory for Exploding {
        fn create(&self, _: &ParameterDataConfig) -> AtsResult<Arc<dyn ParameterDataProvider>> {
            Ok(Arc::new(Exploding))
        }
    }

    #[test]
    fn test_panicking_worker_still_finishes_queue() -> AtsResult<()> {
        let providers = Arc::new(DataProviderFactory::new());
        providers.register_custom("exploding", Arc::new(Exploding));
        let h = handler_with(Arc::new(AtomicUsize::new(0)), providers);
        let data = LoaderDataConfig::new().with(ParameterDataConfig::new(
            "a",
            ProviderLevel::PerInvocation,
            DataSource::Custom {
                kind: "exploding".to_string(),
                settings: BTreeMap::new(),
            },
        ));
        h.execute_actions("Q", 1, vec![add()], ThreadingPattern::all_at_once(2, 3, true)?, &data)?;
        assert!(!h.is_queue_running("Q")?);
        assert_eq!(h.running_queues_count()?, 0);
        h.wait_until_all_queues_finish()?;
        Ok(())
    }

    #[test]
    fn test_panicking_constructor_fails_iterations() -> AtsResult<()> {
        let repo = Arc::new(ComponentRepository::new(CallerId::local()));
        repo.put_component(
            Component::builder("Fragile")
                .action_class(
                    ActionClass::builder::<(), _>("Fragile", || panic!("no config"))
                        .action(ActionSpec::new("touch"), |_: &mut (), _| Ok(ArgValue::Null))
                        .build(),
                )
                .build(),
        )?;
        let h = LoadQueueHandler::new(
            CallerId::from("tester"),
            repo,
            Arc::new(DataProviderFactory::new()),
        );
        h.execute_actions(
            "Q",
            1,
            vec![ActionRequest::new("Fragile", "touch", vec![])],
            ThreadingPattern::all_at_once(1, 2, true)?,
            &LoaderDataConfig::new(),
        )?;
        assert_eq!(h.running_queues_count()?, 0);
        let stats = h.queue_statistics("Q")?.unwrap_or_default();
        assert_eq!(stats.iterations_failed, 2);
        Ok(())
    }
}
