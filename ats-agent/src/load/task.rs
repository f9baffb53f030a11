//! Load Worker - One thread of a queue running its iterations
//!
//! A worker waits at its group's start gate, then runs every queued action
//! once per iteration with its own action class instances. It reports to the
//! loader when it pauses or finishes.

use super::gate::StartGate;
use super::loader::LoaderShared;
use super::providers::ParameterDataProvider;
use crate::registry::{ActionInstance, ActionMethod};
use ats_core::{
    ActionRequest, ArgValue, AtsResult, IterationDelay, RunMode, ThreadingPattern, USERNAME_PARAM,
};
use rand::Rng;
use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An action of the queue, resolved when the queue was scheduled.
pub(crate) struct QueuedAction {
    request: ActionRequest,
    method: Arc<ActionMethod>,
    /// Statistics key, `component action`
    key: String,
    transfer_unit: Option<String>,
    /// Argument positions fed by data providers
    provided: Vec<(usize, String)>,
}

impl QueuedAction {
    pub(crate) fn new(request: ActionRequest, method: Arc<ActionMethod>, provided: &[&str]) -> Self {
        let provided = method
            .parameter_names()
            .into_iter()
            .enumerate()
            .filter(|(_, name)| provided.contains(&name.as_str()))
            .collect();
        let transfer_unit = request
            .transfer_unit()
            .map(|unit| format!("{}/sec", unit))
            .or_else(|| method.transfer_rate_unit());
        Self {
            key: format!("{} {}", method.component(), method.action()),
            request,
            method,
            transfer_unit,
            provided,
        }
    }

    pub(crate) fn uses_parameter(&self, parameter: &str) -> bool {
        self.provided.iter().any(|(_, name)| name == parameter)
    }

    fn registered(&self) -> bool {
        self.request.register_execution() && self.method.register_execution()
    }

    fn arguments(&self, values: &HashMap<&str, ArgValue>) -> Vec<ArgValue> {
        let mut args = self.request.args().to_vec();
        for (position, name) in &self.provided {
            if let (Some(slot), Some(value)) = (args.get_mut(*position), values.get(name.as_str())) {
                *slot = value.clone();
            }
        }
        args
    }
}

/// How a worker's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Paused,
    Finished,
}

/// Reports the worker as finished when dropped, also while unwinding from a panic.
struct FinishedGuard(Arc<LoaderShared>);

impl Drop for FinishedGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            tracing::error!(queue = %self.0.queue(), "Worker panicked, counting it as finished");
        }
        self.0.on_worker_finished();
    }
}

pub(crate) struct WorkerTask {
    index: usize,
    actions: Arc<Vec<QueuedAction>>,
    providers: Arc<Vec<Arc<dyn ParameterDataProvider>>>,
    pattern: Arc<ThreadingPattern>,
    synchronized: bool,
    /// Executions allowed per time frame
    quota: u32,
    shared: Arc<LoaderShared>,
    gate: Arc<StartGate>,
    instances: HashMap<String, ActionInstance>,
    iterations_done: u32,
    deadline: Option<Instant>,
    frame: Option<(Instant, u32)>,
}

impl WorkerTask {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: usize,
        actions: Arc<Vec<QueuedAction>>,
        providers: Arc<Vec<Arc<dyn ParameterDataProvider>>>,
        pattern: Arc<ThreadingPattern>,
        synchronized: bool,
        quota: u32,
        shared: Arc<LoaderShared>,
        gate: Arc<StartGate>,
    ) -> Self {
        Self {
            index,
            actions,
            providers,
            pattern,
            synchronized,
            quota: quota.max(1),
            shared,
            gate,
            instances: HashMap::new(),
            iterations_done: 0,
            deadline: None,
            frame: None,
        }
    }

    pub(crate) fn run(mut self) {
        let span = tracing::info_span!(
            "load_worker",
            queue = %self.shared.queue(),
            worker = self.index,
            user = tracing::field::Empty
        );
        let _entered = span.enter();
        let _finished = FinishedGuard(self.shared.clone());

        let mut seen = 0;
        while self.gate.wait(&mut seen, self.shared.token()) {
            match self.execute() {
                Outcome::Paused => self.shared.on_worker_paused(),
                Outcome::Finished => break,
            }
        }
        tracing::debug!(iterations = self.iterations_done, "Worker finished");
    }

    fn execute(&mut self) -> Outcome {
        if let RunMode::Duration { seconds } = self.pattern.run_mode() {
            self.deadline
                .get_or_insert_with(|| Instant::now() + Duration::from_secs(*seconds));
        }
        loop {
            if self.shared.is_cancelled() || !self.has_more_iterations() {
                return Outcome::Finished;
            }
            self.pace();
            if self.shared.is_cancelled() {
                return Outcome::Finished;
            }

            let passed = self.run_iteration();
            self.shared.record_iteration(passed);
            self.iterations_done += 1;

            if !self.has_more_iterations() {
                return Outcome::Finished;
            }
            if self.synchronized || self.shared.pause_requested() {
                return Outcome::Paused;
            }
            self.delay();
        }
    }

    fn has_more_iterations(&self) -> bool {
        match self.pattern.run_mode() {
            RunMode::Iterations(total) => self.iterations_done < *total,
            RunMode::Duration { .. } => self.deadline.map_or(true, |d| Instant::now() < d),
        }
    }

    /// Run every action once. The first failing action fails the iteration.
    fn run_iteration(&mut self) -> bool {
        let providers = self.providers.clone();
        let values: HashMap<&str, ArgValue> = providers
            .iter()
            .map(|p| (p.parameter(), p.next_value(self.index)))
            .collect();
        if let Some(user) = values.get(USERNAME_PARAM) {
            tracing::Span::current().record("user", tracing::field::display(user));
        }

        let actions = self.actions.clone();
        for action in actions.iter() {
            let args = action.arguments(&values);
            let started = Instant::now();
            let result = self
                .instance_for(&action.method)
                .and_then(|instance| action.method.invoke(instance, &args));
            let elapsed = started.elapsed();

            match result {
                Ok(_) => {
                    tracing::debug!(
                        action = %action.key,
                        duration_ms = elapsed.as_millis() as u64,
                        "checkpoint"
                    );
                    if action.registered() {
                        let timed = action.method.register_in_queue_execution_time();
                        self.shared.record_action(
                            &action.key,
                            action.transfer_unit.as_deref(),
                            Some(if timed { elapsed } else { Duration::ZERO }),
                        );
                    }
                }
                Err(e) => {
                    tracing::error!(
                        action = %action.key,
                        error = %e,
                        "Exception caught during invocation - skipping to next iteration"
                    );
                    if action.registered() {
                        self.shared
                            .record_action(&action.key, action.transfer_unit.as_deref(), None);
                    }
                    return false;
                }
            }
        }
        true
    }

    /// This worker's instance of the method's action class.
    fn instance_for(&mut self, method: &ActionMethod) -> AtsResult<&mut (dyn Any + Send + 'static)> {
        let class = method.class();
        let instance = match self.instances.entry(class.name().to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(class.create_instance(method.component())?),
        };
        Ok(instance.as_mut())
    }

    /// Hold back once this worker used up its executions of the time frame.
    fn pace(&mut self) {
        let Some(speed) = self.pattern.execution_speed() else {
            return;
        };
        let frame_length = Duration::from_secs(u64::from(speed.time_frame_secs));
        let now = Instant::now();
        let (frame_start, executed) = self.frame.get_or_insert((now, 0));
        if now.duration_since(*frame_start) >= frame_length {
            *frame_start = now;
            *executed = 0;
        }
        if *executed >= self.quota {
            let frame_end = *frame_start + frame_length;
            self.shared
                .sleep(frame_end.saturating_duration_since(Instant::now()));
            *frame_start = Instant::now();
            *executed = 0;
        }
        *executed += 1;
    }

    fn delay(&self) {
        let pause = match self.pattern.delay() {
            IterationDelay::None => return,
            IterationDelay::Fixed { ms } => *ms,
            IterationDelay::Varying { min_ms, max_ms } => {
                rand::rng().random_range(*min_ms..=*max_ms)
            }
        };
        self.shared.sleep(Duration::from_millis(pause));
    }
}
