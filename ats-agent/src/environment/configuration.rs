//! Pluggable configuration units applied and reverted in order

use ats_core::{AtsResult, BoxError, EnvironmentError};
use std::sync::Mutex;

/// A unit of configuration the agent can apply and later revert.
pub trait Configurator: Send {
    fn needs_applying(&self) -> bool;

    fn apply(&mut self) -> Result<(), BoxError>;

    fn revert(&mut self) -> Result<(), BoxError>;

    fn description(&self) -> String;
}

/// Applies configurators in registration order and reverts them in reverse.
#[derive(Default)]
pub struct ConfigurationManager {
    applied: Mutex<Vec<Box<dyn Configurator>>>,
}

impl ConfigurationManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply each configurator that needs applying. Stops at the first failure;
    /// configurators applied so far stay registered for [`Self::revert_all`].
    pub fn apply(&self, configurators: Vec<Box<dyn Configurator>>) -> AtsResult<()> {
        let mut applied = self.applied.lock()?;
        for mut configurator in configurators {
            let description = configurator.description();
            if !configurator.needs_applying() {
                tracing::debug!(configurator = %description, "Configuration already in place");
                continue;
            }
            configurator
                .apply()
                .map_err(|e| EnvironmentError::Configuration {
                    description: description.clone(),
                    reason: e.to_string(),
                })?;
            tracing::info!(configurator = %description, "Applied configuration");
            applied.push(configurator);
        }
        Ok(())
    }

    /// Revert everything applied, newest first. Every configurator is
    /// attempted; the first failure is returned.
    pub fn revert_all(&self) -> AtsResult<()> {
        let mut applied = self.applied.lock()?;
        let mut first_failure = None;
        while let Some(mut configurator) = applied.pop() {
            let description = configurator.description();
            match configurator.revert() {
                Ok(()) => tracing::info!(configurator = %description, "Reverted configuration"),
                Err(e) => {
                    tracing::error!(configurator = %description, error = %e, "Could not revert configuration");
                    first_failure.get_or_insert(EnvironmentError::Configuration {
                        description,
                        reason: e.to_string(),
                    });
                }
            }
        }
        match first_failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    pub fn applied_count(&self) -> usize {
        self.applied.lock().map(|a| a.len()).unwrap_or(0)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Recorder {
        name: &'static str,
        needed: bool,
        fail_apply: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Configurator for Recorder {
        fn needs_applying(&self) -> bool {
            self.needed
        }

        fn apply(&mut self) -> Result<(), BoxError> {
            if self.fail_apply {
                return Err("refused".into());
            }
            self.log.lock().unwrap().push(format!("apply {}", self.name));
            Ok(())
        }

        fn revert(&mut self) -> Result<(), BoxError> {
            self.log.lock().unwrap().push(format!("revert {}", self.name));
            Ok(())
        }

        fn description(&self) -> String {
            self.name.to_string()
        }
    }

    fn recorder(name: &'static str, needed: bool, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn Configurator> {
        Box::new(Recorder {
            name,
            needed,
            fail_apply: false,
            log: log.clone(),
        })
    }

    #[test]
    fn test_apply_in_order_revert_in_reverse() -> AtsResult<()> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ConfigurationManager::new();
        manager.apply(vec![
            recorder("a", true, &log),
            recorder("skip", false, &log),
            recorder("b", true, &log),
        ])?;
        assert_eq!(manager.applied_count(), 2);
        manager.revert_all()?;
        assert_eq!(
            *log.lock().unwrap(),
            vec!["apply a", "apply b", "revert b", "revert a"]
        );
        Ok(())
    }

    #[test]
    fn test_apply_failure_reports_configurator() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let manager = ConfigurationManager::new();
        let failing = Box::new(Recorder {
            name: "broken",
            needed: true,
            fail_apply: true,
            log: log.clone(),
        });
        let err = manager
            .apply(vec![recorder("a", true, &log), failing])
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert_eq!(manager.applied_count(), 1);
    }
}
