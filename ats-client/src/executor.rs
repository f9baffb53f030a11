//! Load Executors - Run a captured queue locally or across agents
//!
//! The [`DistributedLoadExecutor`] splits the threading pattern and parameter
//! data across its agents so no two agents share a value, schedules the queue
//! on every agent and then starts them together. With synchronized iterations
//! it drives the rounds itself: wait until every agent paused, drop agents
//! that finished, resume the rest.

use crate::client::AgentClient;
use ats_agent::LoadQueueHandler;
use ats_core::{
    ActionRequest, AtsResult, LoadQueueResult, LoaderDataConfig, QueueStatistics,
    ThreadingPattern,
};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;

/// Runs one queue and answers for it afterwards.
pub trait LoadExecutor: Send + Sync {
    fn execute(
        &self,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        data_config: LoaderDataConfig,
    ) -> AtsResult<()>;

    fn wait_until_finished(&self) -> AtsResult<()>;

    fn cancel(&self) -> AtsResult<()>;

    fn is_running(&self) -> AtsResult<bool>;

    /// Statistics merged over every agent that ran the queue.
    fn statistics(&self) -> AtsResult<QueueStatistics>;

    /// Pass rate of the last executed pattern; zero requires every iteration to pass.
    fn pass_rate(&self) -> u8;

    fn result(&self) -> AtsResult<LoadQueueResult> {
        Ok(self.statistics()?.result(self.pass_rate()))
    }
}

/// Wait for every target to pause, then resume those that did, until none does.
fn drive_synchronized_rounds<T, P, R>(
    queue: &str,
    mut targets: Vec<T>,
    wait_paused: P,
    resume: R,
) -> AtsResult<()>
where
    P: Fn(&T) -> AtsResult<bool>,
    R: Fn(&T) -> AtsResult<()>,
{
    let mut round = 1u32;
    while !targets.is_empty() {
        let mut paused = Vec::with_capacity(targets.len());
        for target in targets {
            if wait_paused(&target)? {
                paused.push(target);
            }
        }
        if paused.is_empty() {
            break;
        }
        round += 1;
        tracing::debug!(queue = %queue, round, targets = paused.len(), "Starting synchronized iteration");
        for target in &paused {
            resume(target)?;
        }
        targets = paused;
    }
    tracing::info!(queue = %queue, rounds = round, "Synchronized iterations completed");
    Ok(())
}

// =============================================================================
// LOCAL
// =============================================================================

/// Runs the queue on the in-process load engine.
pub struct LocalLoadExecutor {
    queue: String,
    queue_id: u32,
    handler: Arc<LoadQueueHandler>,
    pass_rate: AtomicU8,
}

impl LocalLoadExecutor {
    pub fn new(queue: &str, queue_id: u32, handler: Arc<LoadQueueHandler>) -> Self {
        Self {
            queue: queue.to_string(),
            queue_id,
            handler,
            pass_rate: AtomicU8::new(0),
        }
    }
}

impl LoadExecutor for LocalLoadExecutor {
    fn execute(
        &self,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        data_config: LoaderDataConfig,
    ) -> AtsResult<()> {
        self.pass_rate
            .store(pattern.queue_pass_rate(), Ordering::SeqCst);
        if !pattern.use_synchronized_iterations() {
            return self.handler.execute_actions(
                &self.queue,
                self.queue_id,
                requests,
                pattern,
                &data_config,
            );
        }

        let block = pattern.block_until_completion();
        self.handler.schedule_actions(
            &self.queue,
            self.queue_id,
            requests,
            pattern,
            &data_config,
            true,
        )?;
        self.handler.start_queue(&self.queue)?;

        let handler = self.handler.clone();
        let queue = self.queue.clone();
        let drive = move || {
            drive_synchronized_rounds(
                &queue,
                vec![handler.clone()],
                |h: &Arc<LoadQueueHandler>| h.wait_until_queue_is_paused(&queue),
                |h: &Arc<LoadQueueHandler>| h.resume_queue(&queue),
            )
        };
        if block {
            drive()?;
            self.handler.wait_until_queue_finish(&self.queue)
        } else {
            spawn_driver(&self.queue, drive)
        }
    }

    fn wait_until_finished(&self) -> AtsResult<()> {
        self.handler.wait_until_queue_finish(&self.queue)
    }

    fn cancel(&self) -> AtsResult<()> {
        self.handler.cancel_queue(&self.queue)
    }

    fn is_running(&self) -> AtsResult<bool> {
        self.handler.is_queue_running(&self.queue)
    }

    fn statistics(&self) -> AtsResult<QueueStatistics> {
        Ok(self
            .handler
            .queue_statistics(&self.queue)?
            .unwrap_or_default())
    }

    fn pass_rate(&self) -> u8 {
        self.pass_rate.load(Ordering::SeqCst)
    }
}

// =============================================================================
// DISTRIBUTED
// =============================================================================

/// Fans the queue out across remote agents.
pub struct DistributedLoadExecutor {
    queue: String,
    queue_id: u32,
    agents: Vec<String>,
    client: AgentClient,
    pass_rate: AtomicU8,
}

impl DistributedLoadExecutor {
    pub fn new(queue: &str, queue_id: u32, agents: Vec<String>, client: AgentClient) -> Self {
        Self {
            queue: queue.to_string(),
            queue_id,
            agents,
            client,
            pass_rate: AtomicU8::new(0),
        }
    }

    pub fn agents(&self) -> &[String] {
        &self.agents
    }

    fn cancel_on(&self, agents: &[String]) {
        for agent in agents {
            if let Err(e) = self.client.cancel_queue(agent, &self.queue) {
                tracing::error!(queue = %self.queue, agent = %agent, error = %e, "Could not cancel queue");
            }
        }
    }
}

impl LoadExecutor for DistributedLoadExecutor {
    fn execute(
        &self,
        requests: Vec<ActionRequest>,
        pattern: ThreadingPattern,
        data_config: LoaderDataConfig,
    ) -> AtsResult<()> {
        self.pass_rate
            .store(pattern.queue_pass_rate(), Ordering::SeqCst);
        let block = pattern.block_until_completion();
        let synchronized = pattern.use_synchronized_iterations();

        let patterns = pattern.distribute(self.agents.len() as u32)?;
        let agents: Vec<String> = self.agents.iter().take(patterns.len()).cloned().collect();
        let data = data_config.distribute(agents.len() as u32)?;

        tracing::info!(
            queue = %self.queue,
            queue_id = self.queue_id,
            agents = ?agents,
            pattern = %pattern.description(),
            "Scheduling queue on agents"
        );
        for (i, ((agent, agent_pattern), agent_data)) in
            agents.iter().zip(patterns).zip(data).enumerate()
        {
            let scheduled = self.client.schedule_actions(
                agent,
                &self.queue,
                self.queue_id,
                requests.clone(),
                agent_pattern.with_block_until_completion(false),
                agent_data,
                synchronized,
            );
            if let Err(e) = scheduled {
                tracing::error!(queue = %self.queue, agent = %agent, error = %e, "Could not schedule queue, cancelling it on all agents");
                self.cancel_on(&agents[..i]);
                return Err(e);
            }
        }

        for agent in &agents {
            self.client.start_queue(agent, &self.queue)?;
        }

        if synchronized {
            let client = self.client.clone();
            let queue = self.queue.clone();
            let targets = agents.clone();
            let drive = move || {
                drive_synchronized_rounds(
                    &queue,
                    targets,
                    |agent: &String| client.wait_until_queue_is_paused(agent, &queue),
                    |agent: &String| client.resume_queue(agent, &queue),
                )
            };
            if !block {
                return spawn_driver(&self.queue, drive);
            }
            drive()?;
        }
        if block {
            for agent in &agents {
                self.client.wait_until_queue_finish(agent, &self.queue)?;
            }
        }
        Ok(())
    }

    fn wait_until_finished(&self) -> AtsResult<()> {
        for agent in &self.agents {
            self.client.wait_until_queue_finish(agent, &self.queue)?;
        }
        Ok(())
    }

    fn cancel(&self) -> AtsResult<()> {
        for agent in &self.agents {
            self.client.cancel_queue(agent, &self.queue)?;
        }
        Ok(())
    }

    fn is_running(&self) -> AtsResult<bool> {
        for agent in &self.agents {
            if self.client.is_queue_running(agent, &self.queue)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn statistics(&self) -> AtsResult<QueueStatistics> {
        let mut merged = QueueStatistics::default();
        for agent in &self.agents {
            if let Some(statistics) = self.client.queue_statistics(agent, &self.queue)? {
                merged.merge(&statistics);
            }
        }
        Ok(merged)
    }

    fn pass_rate(&self) -> u8 {
        self.pass_rate.load(Ordering::SeqCst)
    }
}

/// Run the round driver on a helper thread; failures are logged.
fn spawn_driver<F>(queue: &str, drive: F) -> AtsResult<()>
where
    F: FnOnce() -> AtsResult<()> + Send + 'static,
{
    let name = queue.to_string();
    thread::Builder::new()
        .name(format!("{}-sync-driver", queue))
        .spawn(move || {
            if let Err(e) = drive() {
                tracing::error!(queue = %name, error = %e, "Synchronized iteration driver failed");
            }
        })
        .map_err(|e| ats_core::LoadError::WorkerSpawn {
            queue: queue.to_string(),
            reason: e.to_string(),
        })?;
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_rounds_drop_finished_targets() -> AtsResult<()> {
        // target n pauses n times before finishing
        let remaining = Mutex::new(vec![1u32, 3]);
        let resumed = Mutex::new(Vec::new());
        drive_synchronized_rounds(
            "Q",
            vec![0usize, 1],
            |t| {
                let mut remaining = remaining.lock().unwrap();
                if remaining[*t] == 0 {
                    return Ok(false);
                }
                remaining[*t] -= 1;
                Ok(true)
            },
            |t| {
                resumed.lock().unwrap().push(*t);
                Ok(())
            },
        )?;
        assert_eq!(*resumed.lock().unwrap(), vec![0, 1, 1, 1]);
        Ok(())
    }
}
