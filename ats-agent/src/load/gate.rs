//! Start gate shared by a group of workers

use std::sync::{Condvar, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Workers of one ramp-up group block here until the group is released.
///
/// Every [`StartGate::open`] bumps a generation counter; a worker passes once
/// per generation, so the same gate serves the initial start and every resume.
#[derive(Debug, Default)]
pub(crate) struct StartGate {
    generation: Mutex<u64>,
    released: Condvar,
}

impl StartGate {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open(&self) {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        *generation += 1;
        self.released.notify_all();
    }

    /// Block until a generation newer than `seen` opens. Returns `false` once
    /// `cancel` fires.
    pub(crate) fn wait(&self, seen: &mut u64, cancel: &CancellationToken) -> bool {
        let mut generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            if *generation > *seen {
                *seen = *generation;
                return true;
            }
            generation = self
                .released
                .wait(generation)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wake waiters so they re-check cancellation.
    pub(crate) fn interrupt(&self) {
        let _generation = self.generation.lock().unwrap_or_else(PoisonError::into_inner);
        self.released.notify_all();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_open_releases_each_generation_once() {
        let gate = Arc::new(StartGate::new());
        let token = CancellationToken::new();
        gate.open();
        let mut seen = 0;
        assert!(gate.wait(&mut seen, &token));
        assert_eq!(seen, 1);

        let waiter = {
            let gate = gate.clone();
            let token = token.clone();
            thread::spawn(move || gate.wait(&mut seen, &token))
        };
        gate.open();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_cancel_interrupts_waiters() {
        let gate = Arc::new(StartGate::new());
        let token = CancellationToken::new();
        let waiter = {
            let gate = gate.clone();
            let token = token.clone();
            thread::spawn(move || gate.wait(&mut 0, &token))
        };
        token.cancel();
        gate.interrupt();
        assert!(!waiter.join().unwrap());
    }
}
