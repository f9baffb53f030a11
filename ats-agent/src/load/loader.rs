//! Queue Loader - State machine of one load queue
//!
//! ```text
//! CREATED -[schedule]-> SCHEDULED -[start]-> RUNNING -[all workers done]-> FINISHED
//!                                               |  ^
//!                              [all paused]     v  | [resume]
//!                                              PAUSED
//! any non-terminal state -[cancel]-> CANCELLED
//! ```
//!
//! Workers are spawned when the queue is scheduled and wait at the start
//! gate of their ramp-up group until the queue starts.

use super::gate::StartGate;
use super::providers::ParameterDataProvider;
use super::task::{QueuedAction, WorkerTask};
use ats_core::{
    even_load, AtsResult, LoadError, LoadQueueResult, LoadQueueState, QueueStatistics,
    ThreadingPattern,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// =============================================================================
// SHARED STATE
// =============================================================================

#[derive(Debug)]
struct Progress {
    state: LoadQueueState,
    paused: usize,
    finished: usize,
}

/// State shared between a loader and its workers.
pub(crate) struct LoaderShared {
    queue: String,
    workers: usize,
    progress: Mutex<Progress>,
    changed: Condvar,
    token: CancellationToken,
    pause_requested: AtomicBool,
    statistics: Mutex<QueueStatistics>,
}

impl LoaderShared {
    fn new(queue: &str, workers: usize) -> Self {
        Self {
            queue: queue.to_string(),
            workers,
            progress: Mutex::new(Progress {
                state: LoadQueueState::Created,
                paused: 0,
                finished: 0,
            }),
            changed: Condvar::new(),
            token: CancellationToken::new(),
            pause_requested: AtomicBool::new(false),
            statistics: Mutex::new(QueueStatistics::default()),
        }
    }

    // progress and statistics only hold counters, a poisoned lock still has usable data
    fn progress(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn statistics_guard(&self) -> MutexGuard<'_, QueueStatistics> {
        self.statistics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn queue(&self) -> &str {
        &self.queue
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    pub(crate) fn on_worker_paused(&self) {
        let mut progress = self.progress();
        progress.paused += 1;
        self.settle(&mut progress);
    }

    pub(crate) fn on_worker_finished(&self) {
        let mut progress = self.progress();
        progress.finished += 1;
        self.settle(&mut progress);
    }

    fn settle(&self, progress: &mut Progress) {
        if !progress.state.is_terminal() {
            if progress.finished == self.workers {
                progress.state = LoadQueueState::Finished;
                tracing::info!(queue = %self.queue, "Finished executing queue");
            } else if progress.state == LoadQueueState::Running
                && progress.paused > 0
                && progress.paused + progress.finished == self.workers
            {
                progress.state = LoadQueueState::Paused;
                tracing::info!(queue = %self.queue, "Queue paused");
            }
        }
        self.changed.notify_all();
    }

    pub(crate) fn record_iteration(&self, passed: bool) {
        let mut statistics = self.statistics_guard();
        if passed {
            statistics.iterations_passed += 1;
        } else {
            statistics.iterations_failed += 1;
        }
    }

    /// Count one execution of `action`; `None` marks a failure.
    pub(crate) fn record_action(
        &self,
        action: &str,
        transfer_unit: Option<&str>,
        elapsed: Option<Duration>,
    ) {
        let mut statistics = self.statistics_guard();
        let entry = statistics.actions.entry(action.to_string()).or_default();
        if entry.transfer_unit.is_none() {
            entry.transfer_unit = transfer_unit.map(str::to_string);
        }
        match elapsed {
            Some(elapsed) => {
                entry.passed += 1;
                entry.total_time_ms += elapsed.as_millis() as u64;
            }
            None => entry.failed += 1,
        }
    }

    /// Sleep for `duration` unless the queue is cancelled first.
    pub(crate) fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let progress = self.progress();
        let _ = self
            .changed
            .wait_timeout_while(progress, duration, |_| !self.token.is_cancelled());
    }

    fn wait_while<F>(&self, mut condition: F) -> LoadQueueState
    where
        F: FnMut(LoadQueueState) -> bool,
    {
        let progress = self.progress();
        let progress = self
            .changed
            .wait_while(progress, |p| condition(p.state))
            .unwrap_or_else(PoisonError::into_inner);
        progress.state
    }
}

// =============================================================================
// QUEUE LOADER
// =============================================================================

/// One scheduled load queue and its workers.
pub struct QueueLoader {
    name: String,
    id: u32,
    pattern: Arc<ThreadingPattern>,
    synchronized: bool,
    shared: Arc<LoaderShared>,
    groups: Vec<Arc<StartGate>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl QueueLoader {
    /// Spawn the workers of a new queue; they wait for [`Self::start`].
    pub(crate) fn schedule(
        name: &str,
        id: u32,
        actions: Vec<QueuedAction>,
        providers: Vec<Arc<dyn ParameterDataProvider>>,
        pattern: ThreadingPattern,
        synchronized: bool,
    ) -> AtsResult<Self> {
        let thread_count = pattern.thread_count() as usize;
        let synchronized = synchronized || pattern.use_synchronized_iterations();
        let shared = Arc::new(LoaderShared::new(name, thread_count));
        let groups: Vec<Arc<StartGate>> = (0..group_count(&pattern))
            .map(|_| Arc::new(StartGate::new()))
            .collect();
        let per_group = if groups.len() == 1 {
            thread_count
        } else {
            pattern.threads_per_step() as usize
        };
        let quotas = pattern
            .execution_speed()
            .map(|speed| even_load(speed.executions_per_time_frame, pattern.thread_count()))
            .unwrap_or_default();

        let pattern = Arc::new(pattern);
        let actions = Arc::new(actions);
        let providers = Arc::new(providers);
        let mut workers = Vec::with_capacity(thread_count);
        for index in 0..thread_count {
            let task = WorkerTask::new(
                index,
                actions.clone(),
                providers.clone(),
                pattern.clone(),
                synchronized,
                quotas.get(index).copied().unwrap_or(u32::MAX),
                shared.clone(),
                groups[(index / per_group).min(groups.len() - 1)].clone(),
            );
            let spawned = thread::Builder::new()
                .name(format!("{}-worker-{}", name, index))
                .spawn(move || task.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    shared.token.cancel();
                    groups.iter().for_each(|g| g.interrupt());
                    return Err(LoadError::WorkerSpawn {
                        queue: name.to_string(),
                        reason: e.to_string(),
                    }
                    .into());
                }
            }
        }

        shared.progress().state = LoadQueueState::Scheduled;
        tracing::info!(
            queue = %name,
            queue_id = id,
            pattern = %pattern.description(),
            "Scheduled load queue"
        );
        Ok(Self {
            name: name.to_string(),
            id,
            pattern,
            synchronized,
            shared,
            groups,
            workers: Mutex::new(workers),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn pattern(&self) -> &ThreadingPattern {
        &self.pattern
    }

    pub fn state(&self) -> LoadQueueState {
        self.shared.progress().state
    }

    /// Running or paused.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            LoadQueueState::Running | LoadQueueState::Paused
        )
    }

    pub fn uses_synchronized_iterations(&self) -> bool {
        self.synchronized
    }

    /// Release the workers group by group. Blocks until the queue finishes when
    /// the pattern asks for it, unless iterations are synchronized by a coordinator.
    pub fn start(&self) -> AtsResult<()> {
        self.transition(LoadQueueState::Scheduled, "start")?;
        tracing::info!(queue = %self.name, "Starting load queue");

        let interval = self.pattern.ramp_up_interval();
        if self.groups.len() == 1 || interval.is_zero() || self.pattern.block_until_completion() {
            open_groups(&self.groups, &self.shared, interval);
        } else {
            let groups = self.groups.clone();
            let shared = self.shared.clone();
            let helper = thread::Builder::new()
                .name(format!("{}-ramp-up", self.name))
                .spawn(move || open_groups(&groups, &shared, interval));
            if let Err(e) = helper {
                tracing::warn!(queue = %self.name, error = %e, "Ramping up on the calling thread");
                open_groups(&self.groups, &self.shared, interval);
            }
        }

        if self.pattern.block_until_completion() && !self.synchronized {
            self.wait_until_finished();
        }
        Ok(())
    }

    /// Continue a paused queue; all groups are released at once.
    pub fn resume(&self) -> AtsResult<()> {
        {
            let mut progress = self.shared.progress();
            if progress.state != LoadQueueState::Paused {
                return Err(self.invalid_state(progress.state, "resume"));
            }
            progress.state = LoadQueueState::Running;
            progress.paused = 0;
        }
        self.shared.pause_requested.store(false, Ordering::SeqCst);
        tracing::info!(queue = %self.name, "Resuming load queue");
        self.groups.iter().for_each(|g| g.open());
        Ok(())
    }

    /// Ask every worker to pause after its current iteration.
    pub fn pause(&self) -> AtsResult<()> {
        let state = self.state();
        if state != LoadQueueState::Running {
            return Err(self.invalid_state(state, "pause"));
        }
        self.shared.pause_requested.store(true, Ordering::SeqCst);
        tracing::info!(queue = %self.name, "Pausing load queue");
        Ok(())
    }

    /// Stop the queue. Workers leave at their next iteration boundary.
    pub fn cancel(&self) {
        self.shared.token.cancel();
        {
            let mut progress = self.shared.progress();
            if !progress.state.is_terminal() {
                progress.state = LoadQueueState::Cancelled;
                tracing::info!(queue = %self.name, "Cancelled load queue");
            }
            self.shared.changed.notify_all();
        }
        self.groups.iter().for_each(|g| g.interrupt());
    }

    /// Block while the queue is running or paused.
    pub fn wait_until_finished(&self) -> LoadQueueState {
        let state = self.shared.wait_while(|s| {
            matches!(s, LoadQueueState::Running | LoadQueueState::Paused)
        });
        if state == LoadQueueState::Finished {
            self.join_workers();
        }
        state
    }

    /// Block while the queue is running. True when it ended up paused.
    pub fn wait_until_paused(&self) -> bool {
        self.shared.wait_while(|s| s == LoadQueueState::Running) == LoadQueueState::Paused
    }

    pub fn statistics(&self) -> QueueStatistics {
        self.shared.statistics_guard().clone()
    }

    pub fn result(&self) -> LoadQueueResult {
        self.statistics().result(self.pattern.queue_pass_rate())
    }

    fn transition(&self, from: LoadQueueState, operation: &str) -> AtsResult<()> {
        let mut progress = self.shared.progress();
        if progress.state != from {
            return Err(self.invalid_state(progress.state, operation));
        }
        progress.state = LoadQueueState::Running;
        Ok(())
    }

    fn invalid_state(&self, state: LoadQueueState, operation: &str) -> ats_core::AtsError {
        LoadError::InvalidQueueState {
            queue: self.name.clone(),
            state: state.to_string(),
            operation: operation.to_string(),
        }
        .into()
    }

    fn join_workers(&self) {
        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!(queue = %self.name, "Worker thread panicked");
            }
        }
    }
}

/// One group when workers start together, otherwise one per ramp-up step.
fn group_count(pattern: &ThreadingPattern) -> usize {
    let threads = pattern.thread_count() as usize;
    let per_step = pattern.threads_per_step() as usize;
    if pattern.ramp_up_interval().is_zero() || per_step == 0 || per_step >= threads {
        1
    } else {
        threads.div_ceil(per_step)
    }
}

fn open_groups(groups: &[Arc<StartGate>], shared: &LoaderShared, interval: Duration) {
    for (step, group) in groups.iter().enumerate() {
        if step > 0 {
            shared.sleep(interval);
        }
        if shared.is_cancelled() {
            return;
        }
        tracing::debug!(queue = %shared.queue(), step, "Releasing ramp-up group");
        group.open();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_count() {
        let flat = ThreadingPattern::all_at_once(5, 1, false).unwrap();
        assert_eq!(group_count(&flat), 1);

        let steps = ThreadingPattern::ramp_up(5, 1, 100, 2, false).unwrap();
        assert_eq!(group_count(&steps), 3);

        let even = ThreadingPattern::ramp_up(6, 1, 100, 2, false).unwrap();
        assert_eq!(group_count(&even), 3);

        let instant = ThreadingPattern::ramp_up(6, 1, 0, 2, false).unwrap();
        assert_eq!(group_count(&instant), 1);
    }

    #[test]
    fn test_settle_reports_pause_then_finish() {
        let shared = LoaderShared::new("Q", 2);
        shared.progress().state = LoadQueueState::Running;
        shared.on_worker_paused();
        assert_eq!(shared.progress().state, LoadQueueState::Running);
        shared.on_worker_finished();
        assert_eq!(shared.progress().state, LoadQueueState::Paused);

        let shared = LoaderShared::new("Q", 2);
        shared.progress().state = LoadQueueState::Running;
        shared.on_worker_finished();
        shared.on_worker_finished();
        assert_eq!(shared.progress().state, LoadQueueState::Finished);
    }

    #[test]
    fn test_finish_does_not_override_cancel() {
        let shared = LoaderShared::new("Q", 1);
        shared.progress().state = LoadQueueState::Cancelled;
        shared.on_worker_finished();
        assert_eq!(shared.progress().state, LoadQueueState::Cancelled);
    }

    #[test]
    fn test_record_action_statistics() {
        let shared = LoaderShared::new("Q", 1);
        shared.record_action("Calc add", Some("KB/sec"), Some(Duration::from_millis(4)));
        shared.record_action("Calc add", None, None);
        shared.record_iteration(true);
        shared.record_iteration(false);
        let stats = shared.statistics_guard().clone();
        let add = &stats.actions["Calc add"];
        assert_eq!((add.passed, add.failed, add.total_time_ms), (1, 1, 4));
        assert_eq!(add.transfer_unit.as_deref(), Some("KB/sec"));
        assert_eq!((stats.iterations_passed, stats.iterations_failed), (1, 1));
    }
}
