//! Threading patterns describing how a load queue runs its workers

use crate::error::{AtsError, AtsResult, LoadError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How worker threads are started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartMode {
    /// All workers start together
    AllAtOnce,
    /// Workers start in groups of `threads_per_step`, one group every `interval_ms`
    RampUp { interval_ms: u64, threads_per_step: u32 },
}

/// How long each worker keeps iterating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// Fixed number of iterations per worker
    Iterations(u32),
    /// Iterate until the wall clock duration elapses
    Duration { seconds: u64 },
}

/// Pause between two iterations of one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationDelay {
    None,
    Fixed { ms: u64 },
    /// Random pause, uniformly chosen per iteration
    Varying { min_ms: u64, max_ms: u64 },
}

/// Upper bound on the number of iterations across all workers per time frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSpeed {
    pub executions_per_time_frame: u32,
    pub time_frame_secs: u32,
}

/// Thread count, start/run mode and pacing of a load queue.
///
/// Deserialized patterns go through [`ThreadingPattern::validate`], so a
/// pattern received from the wire can never carry zero threads or an empty
/// iteration range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawThreadingPattern")]
pub struct ThreadingPattern {
    thread_count: u32,
    start: StartMode,
    run: RunMode,
    delay: IterationDelay,
    speed: Option<ExecutionSpeed>,
    block_until_completion: bool,
    use_synchronized_iterations: bool,
    /// Percentage of passed iterations required for the queue to pass
    queue_pass_rate: u8,
}

/// Wire shape of [`ThreadingPattern`], checked before it is accepted.
#[derive(Deserialize)]
struct RawThreadingPattern {
    thread_count: u32,
    start: StartMode,
    run: RunMode,
    delay: IterationDelay,
    speed: Option<ExecutionSpeed>,
    block_until_completion: bool,
    use_synchronized_iterations: bool,
    queue_pass_rate: u8,
}

impl TryFrom<RawThreadingPattern> for ThreadingPattern {
    type Error = AtsError;

    fn try_from(raw: RawThreadingPattern) -> Result<Self, Self::Error> {
        let pattern = Self {
            thread_count: raw.thread_count,
            start: raw.start,
            run: raw.run,
            delay: raw.delay,
            speed: raw.speed,
            block_until_completion: raw.block_until_completion,
            use_synchronized_iterations: raw.use_synchronized_iterations,
            queue_pass_rate: raw.queue_pass_rate,
        };
        pattern.validate()?;
        Ok(pattern)
    }
}

impl ThreadingPattern {
    /// All workers start together and run `iterations` iterations each.
    pub fn all_at_once(thread_count: u32, iterations: u32, block: bool) -> AtsResult<Self> {
        Self::build(thread_count, StartMode::AllAtOnce, RunMode::Iterations(iterations), block)
    }

    /// Workers start `threads_per_step` at a time, every `interval_ms`.
    pub fn ramp_up(
        thread_count: u32,
        iterations: u32,
        interval_ms: u64,
        threads_per_step: u32,
        block: bool,
    ) -> AtsResult<Self> {
        Self::build(
            thread_count,
            StartMode::RampUp {
                interval_ms,
                threads_per_step,
            },
            RunMode::Iterations(iterations),
            block,
        )
    }

    /// All workers start together and iterate for `seconds`.
    pub fn fixed_duration(thread_count: u32, seconds: u64, block: bool) -> AtsResult<Self> {
        Self::build(thread_count, StartMode::AllAtOnce, RunMode::Duration { seconds }, block)
    }

    /// Ramped start, then iterate for `seconds`.
    pub fn fixed_duration_ramp_up(
        thread_count: u32,
        seconds: u64,
        interval_ms: u64,
        threads_per_step: u32,
        block: bool,
    ) -> AtsResult<Self> {
        Self::build(
            thread_count,
            StartMode::RampUp {
                interval_ms,
                threads_per_step,
            },
            RunMode::Duration { seconds },
            block,
        )
    }

    fn build(thread_count: u32, start: StartMode, run: RunMode, block: bool) -> AtsResult<Self> {
        if thread_count == 0 {
            return Err(invalid("the thread count must be a positive integer"));
        }
        if let StartMode::RampUp {
            threads_per_step, ..
        } = start
        {
            if threads_per_step == 0 {
                return Err(invalid("the thread count per step must be a positive integer"));
            }
            if threads_per_step >= thread_count {
                return Err(invalid(
                    "the thread count per step must be smaller than the total thread count",
                ));
            }
        }
        match run {
            RunMode::Iterations(0) => {
                return Err(invalid("the iteration count must be a positive integer"))
            }
            RunMode::Duration { seconds: 0 } => {
                return Err(invalid("the duration must be a positive number of seconds"))
            }
            _ => {}
        }
        Ok(Self {
            thread_count,
            start,
            run,
            delay: IterationDelay::None,
            speed: None,
            block_until_completion: block,
            use_synchronized_iterations: false,
            queue_pass_rate: 0,
        })
    }

    /// Check the invariants the load engine relies on.
    ///
    /// A per-agent share produced by [`ThreadingPattern::distribute`] may start
    /// all of its threads in one step, so only a zero step is rejected here.
    pub fn validate(&self) -> AtsResult<()> {
        if self.thread_count == 0 {
            return Err(invalid("the thread count must be a positive integer"));
        }
        if let StartMode::RampUp {
            threads_per_step: 0,
            ..
        } = self.start
        {
            return Err(invalid("the thread count per step must be a positive integer"));
        }
        match self.run {
            RunMode::Iterations(0) => {
                return Err(invalid("the iteration count must be a positive integer"))
            }
            RunMode::Duration { seconds: 0 } => {
                return Err(invalid("the duration must be a positive number of seconds"))
            }
            _ => {}
        }
        if let IterationDelay::Varying { min_ms, max_ms } = self.delay {
            if min_ms > max_ms {
                return Err(invalid(&format!(
                    "the minimum interval between iterations ({}) is bigger than the maximum ({})",
                    min_ms, max_ms
                )));
            }
        }
        if let Some(speed) = &self.speed {
            if speed.executions_per_time_frame == 0 || speed.time_frame_secs == 0 {
                return Err(invalid(
                    "executions per time frame and the time frame must be positive integers",
                ));
            }
        }
        if self.queue_pass_rate > 100 {
            return Err(invalid("the queue pass rate must be between 0 and 100"));
        }
        Ok(())
    }

    /// Fixed pause between iterations.
    pub fn with_interval(mut self, ms: u64) -> Self {
        self.delay = if ms == 0 {
            IterationDelay::None
        } else {
            IterationDelay::Fixed { ms }
        };
        self
    }

    /// Random pause between iterations. A reversed range is swapped.
    pub fn with_varying_interval(mut self, min_ms: u64, max_ms: u64) -> Self {
        let (min_ms, max_ms) = if min_ms > max_ms {
            tracing::warn!(
                min_ms,
                max_ms,
                "Minimum interval between iterations is bigger than the maximum, swapping them"
            );
            (max_ms, min_ms)
        } else {
            (min_ms, max_ms)
        };
        if min_ms == max_ms {
            return self.with_interval(min_ms);
        }
        self.delay = IterationDelay::Varying { min_ms, max_ms };
        self
    }

    /// Limit the total iterations per time frame across all workers.
    pub fn with_execution_speed(
        mut self,
        executions_per_time_frame: u32,
        time_frame_secs: u32,
    ) -> AtsResult<Self> {
        if executions_per_time_frame == 0 || time_frame_secs == 0 {
            return Err(invalid(
                "executions per time frame and the time frame must be positive integers",
            ));
        }
        if self.thread_count > executions_per_time_frame {
            return Err(invalid(&format!(
                "the thread count ({}) is bigger than the executions per time frame ({})",
                self.thread_count, executions_per_time_frame
            )));
        }
        self.speed = Some(ExecutionSpeed {
            executions_per_time_frame,
            time_frame_secs,
        });
        Ok(self)
    }

    /// Whether starting the queue blocks until it finishes.
    pub fn with_block_until_completion(mut self, block: bool) -> Self {
        self.block_until_completion = block;
        self
    }

    /// Workers wait for each other after every iteration.
    pub fn with_synchronized_iterations(mut self) -> Self {
        self.use_synchronized_iterations = true;
        self
    }

    pub fn with_pass_rate(mut self, percents: u8) -> AtsResult<Self> {
        if percents > 100 {
            return Err(invalid("the queue pass rate must be between 0 and 100"));
        }
        self.queue_pass_rate = percents;
        Ok(self)
    }

    pub fn thread_count(&self) -> u32 {
        self.thread_count
    }

    pub fn start_mode(&self) -> &StartMode {
        &self.start
    }

    pub fn run_mode(&self) -> &RunMode {
        &self.run
    }

    pub fn delay(&self) -> &IterationDelay {
        &self.delay
    }

    pub fn execution_speed(&self) -> Option<&ExecutionSpeed> {
        self.speed.as_ref()
    }

    pub fn block_until_completion(&self) -> bool {
        self.block_until_completion
    }

    pub fn use_synchronized_iterations(&self) -> bool {
        self.use_synchronized_iterations
    }

    pub fn queue_pass_rate(&self) -> u8 {
        self.queue_pass_rate
    }

    /// Sleep between starting two thread groups.
    pub fn ramp_up_interval(&self) -> Duration {
        match self.start {
            StartMode::AllAtOnce => Duration::ZERO,
            StartMode::RampUp { interval_ms, .. } => Duration::from_millis(interval_ms),
        }
    }

    /// Number of workers started per ramp-up step.
    pub fn threads_per_step(&self) -> u32 {
        match self.start {
            StartMode::AllAtOnce => self.thread_count,
            StartMode::RampUp {
                threads_per_step, ..
            } => threads_per_step,
        }
    }

    /// Human readable summary.
    pub fn description(&self) -> String {
        let mut description = match (&self.start, &self.run) {
            (StartMode::AllAtOnce, RunMode::Iterations(_)) => {
                format!("All at once - {} threads", self.thread_count)
            }
            (
                StartMode::RampUp {
                    interval_ms,
                    threads_per_step,
                },
                RunMode::Iterations(_),
            ) => format!(
                "Ramp up - {} total threads, {} threads every {} ms",
                self.thread_count, threads_per_step, interval_ms
            ),
            (StartMode::AllAtOnce, RunMode::Duration { seconds }) => format!(
                "Fixed duration all at once - {} threads in {} seconds",
                self.thread_count, seconds
            ),
            (
                StartMode::RampUp {
                    interval_ms,
                    threads_per_step,
                },
                RunMode::Duration { seconds },
            ) => format!(
                "Fixed duration ramp up - {} total threads in {} seconds, {} threads every {} ms",
                self.thread_count, seconds, threads_per_step, interval_ms
            ),
        };

        let interval = match self.delay {
            IterationDelay::None => "continuous".to_string(),
            IterationDelay::Fixed { ms } => format!("{} ms interval", ms),
            IterationDelay::Varying { min_ms, max_ms } => {
                format!("{} to {} ms varying interval", min_ms, max_ms)
            }
        };
        match self.run {
            RunMode::Iterations(n) => {
                description.push_str(&format!(", {} iterations, {}", n, interval))
            }
            RunMode::Duration { .. } => description.push_str(&format!(", {}", interval)),
        }

        if self.use_synchronized_iterations {
            description.push_str(", running synchronized iterations");
        }
        if let Some(speed) = &self.speed {
            description.push_str(&format!(
                ", max {} total iterations per {} secs",
                speed.executions_per_time_frame, speed.time_frame_secs
            ));
        }
        if self.queue_pass_rate > 0 {
            description.push_str(&format!(
                ", pass if {}% of the iterations pass",
                self.queue_pass_rate
            ));
        }
        description
    }

    /// Split this pattern across `hosts` agents.
    ///
    /// When there are fewer threads (or executions per time frame) than hosts
    /// the pattern is returned unchanged as a single entry, meaning the work
    /// runs on one host only.
    pub fn distribute(&self, hosts: u32) -> AtsResult<Vec<ThreadingPattern>> {
        if hosts <= 1 {
            return Ok(vec![self.clone()]);
        }
        if self.thread_count < hosts {
            tracing::warn!(
                threads = self.thread_count,
                hosts,
                "Cannot distribute so few threads on all hosts, all work will be done by one host"
            );
            return Ok(vec![self.clone()]);
        }
        if let Some(speed) = &self.speed {
            if speed.executions_per_time_frame < hosts {
                tracing::warn!(
                    executions = speed.executions_per_time_frame,
                    hosts,
                    "Cannot distribute so few iterations per time frame on all hosts, all work will be done by one host"
                );
                return Ok(vec![self.clone()]);
            }
        }

        let threads = even_load(self.thread_count, hosts);
        let steps = match self.start {
            StartMode::AllAtOnce => None,
            StartMode::RampUp {
                threads_per_step, ..
            } => {
                if threads_per_step < hosts {
                    return Err(invalid(&format!(
                        "the thread count per step [{}] must be at least as much as the number of agents [{}]",
                        threads_per_step, hosts
                    )));
                }
                Some(even_load(threads_per_step, hosts))
            }
        };
        let executions = self
            .speed
            .as_ref()
            .map(|s| even_load(s.executions_per_time_frame, hosts));

        let patterns = (0..hosts as usize)
            .map(|i| {
                let mut pattern = self.clone();
                pattern.thread_count = threads[i];
                if let (
                    StartMode::RampUp {
                        threads_per_step, ..
                    },
                    Some(steps),
                ) = (&mut pattern.start, &steps)
                {
                    *threads_per_step = steps[i];
                }
                if let (Some(speed), Some(executions)) = (&mut pattern.speed, &executions) {
                    speed.executions_per_time_frame = executions[i];
                }
                pattern
            })
            .collect();
        Ok(patterns)
    }
}

/// Split `total` into `parts` near-equal shares; the first shares take the remainder.
pub fn even_load(total: u32, parts: u32) -> Vec<u32> {
    if parts == 0 {
        return Vec::new();
    }
    let base = total / parts;
    let remainder = total % parts;
    (0..parts)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

fn invalid(reason: &str) -> AtsError {
    LoadError::InvalidThreadingPattern {
        reason: reason.to_string(),
    }
    .into()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ramp_up_rejects_step_not_smaller_than_threads() {
        let err = ThreadingPattern::ramp_up(4, 1, 100, 4, true).unwrap_err();
        assert!(matches!(
            err,
            AtsError::Load(LoadError::InvalidThreadingPattern { .. })
        ));
    }

    #[test]
    fn test_zero_threads_rejected() {
        assert!(ThreadingPattern::all_at_once(0, 1, true).is_err());
    }

    #[test]
    fn test_varying_interval_swaps_reversed_range() {
        let p = ThreadingPattern::all_at_once(2, 1, true)
            .unwrap()
            .with_varying_interval(500, 100);
        assert_eq!(
            p.delay(),
            &IterationDelay::Varying {
                min_ms: 100,
                max_ms: 500
            }
        );
    }

    #[test]
    fn test_equal_varying_interval_becomes_fixed() {
        let p = ThreadingPattern::all_at_once(2, 1, true)
            .unwrap()
            .with_varying_interval(300, 300);
        assert_eq!(p.delay(), &IterationDelay::Fixed { ms: 300 });
    }

    #[test]
    fn test_speed_rejects_more_threads_than_executions() {
        let p = ThreadingPattern::all_at_once(10, 1, true).unwrap();
        assert!(p.with_execution_speed(5, 1).is_err());
    }

    #[test]
    fn test_description_ramp_up() -> AtsResult<()> {
        let p = ThreadingPattern::ramp_up(10, 5, 1000, 2, true)?
            .with_interval(200)
            .with_pass_rate(90)?;
        let d = p.description();
        assert!(d.starts_with("Ramp up - 10 total threads, 2 threads every 1000 ms"));
        assert!(d.contains("5 iterations, 200 ms interval"));
        assert!(d.contains("pass if 90%"));
        Ok(())
    }

    #[test]
    fn test_distribute_fewer_threads_than_hosts_uses_one_host() -> AtsResult<()> {
        let p = ThreadingPattern::all_at_once(2, 1, true)?;
        let parts = p.distribute(3)?;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].thread_count(), 2);
        Ok(())
    }

    #[test]
    fn test_distribute_ramp_up_needs_enough_threads_per_step() -> AtsResult<()> {
        let p = ThreadingPattern::ramp_up(10, 1, 100, 2, true)?;
        assert!(p.distribute(3).is_err());
        let parts = p.distribute(2)?;
        assert_eq!(parts.iter().map(|p| p.threads_per_step()).sum::<u32>(), 2);
        Ok(())
    }

    #[test]
    fn test_deserialize_rejects_unsafe_patterns() -> AtsResult<()> {
        let valid = serde_json::to_value(ThreadingPattern::all_at_once(2, 3, true)?)
            .map_err(|e| invalid(&e.to_string()))?;
        let mutations: [(&str, serde_json::Value); 4] = [
            ("thread_count", serde_json::json!(0)),
            ("run", serde_json::json!({ "Iterations": 0 })),
            ("start", serde_json::json!({ "RampUp": { "interval_ms": 10, "threads_per_step": 0 } })),
            ("delay", serde_json::json!({ "Varying": { "min_ms": 500, "max_ms": 100 } })),
        ];
        for (field, value) in mutations {
            let mut tampered = valid.clone();
            tampered[field] = value;
            let parsed = serde_json::from_value::<ThreadingPattern>(tampered);
            assert!(parsed.is_err(), "{} should have been rejected", field);
        }
        Ok(())
    }

    #[test]
    fn test_distributed_ramp_up_survives_the_wire() -> AtsResult<()> {
        // each share starts all of its threads in a single step
        let parts = ThreadingPattern::ramp_up(4, 2, 100, 2, true)?.distribute(2)?;
        for part in parts {
            let json = serde_json::to_string(&part).map_err(|e| invalid(&e.to_string()))?;
            let back: ThreadingPattern =
                serde_json::from_str(&json).map_err(|e| invalid(&e.to_string()))?;
            assert_eq!(back, part);
        }
        Ok(())
    }

    #[test]
    fn test_even_load() {
        assert_eq!(even_load(7, 3), vec![3, 2, 2]);
        assert_eq!(even_load(2, 4), vec![1, 1, 0, 0]);
        assert!(even_load(5, 0).is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Distributing never loses or invents threads.
        #[test]
        fn prop_distribute_preserves_thread_count(threads in 1u32..200, hosts in 1u32..10) {
            let p = ThreadingPattern::all_at_once(threads, 1, true).unwrap();
            let parts = p.distribute(hosts).unwrap();
            let total: u32 = parts.iter().map(|p| p.thread_count()).sum();
            prop_assert_eq!(total, threads);
            prop_assert!(parts.iter().all(|p| p.thread_count() > 0));
        }
    }
}
