//! ATS Test Utilities
//!
//! Shared test infrastructure for the ATS workspace:
//! - Fixture components (calculator, greeter, counter)
//! - Mock environment units and configurators
//! - Proptest generators for values, patterns and data configurations
//! - Assertions on ATS error variants

pub use ats_core::{
    ActionRequest, ArgValue, AtsError, AtsResult, CallerId, LoaderDataConfig, ParameterDataConfig,
    ThreadingPattern,
};

use ats_agent::{ActionClass, ActionSpec, Agent, Component, EnvironmentUnit};
use ats_core::{AgentConfig, BoxError, ParamType};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Install a test subscriber once; repeated calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCKS
// ============================================================================

pub mod mocks {
    //! Recording stand-ins for pluggable collaborators.

    use super::*;
    use ats_agent::Configurator;

    /// Counts backups and restores; optionally fails restores.
    #[derive(Debug, Clone, Default)]
    pub struct MockEnvironmentUnit {
        pub backups: Arc<AtomicUsize>,
        pub restores: Arc<AtomicUsize>,
        pub fail_restore: bool,
        pub temp_dir: Arc<Mutex<Option<PathBuf>>>,
    }

    impl MockEnvironmentUnit {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail_restore: true,
                ..Self::default()
            }
        }

        pub fn backup_count(&self) -> usize {
            self.backups.load(Ordering::SeqCst)
        }

        pub fn restore_count(&self) -> usize {
            self.restores.load(Ordering::SeqCst)
        }
    }

    impl EnvironmentUnit for MockEnvironmentUnit {
        fn backup(&mut self) -> Result<(), BoxError> {
            self.backups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn restore(&mut self) -> Result<(), BoxError> {
            if self.fail_restore {
                return Err("mock restore failure".into());
            }
            self.restores.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn set_temp_backup_dir(&mut self, dir: &Path) {
            if let Ok(mut temp) = self.temp_dir.lock() {
                *temp = Some(dir.to_path_buf());
            }
        }

        fn description(&self) -> String {
            "mock environment unit".to_string()
        }

        fn new_copy(&self) -> Box<dyn EnvironmentUnit> {
            Box::new(self.clone())
        }
    }

    /// Appends `apply <name>` / `revert <name>` to a shared log.
    pub struct MockConfigurator {
        pub name: String,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl MockConfigurator {
        pub fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                log: log.clone(),
            }
        }

        fn record(&self, entry: String) -> Result<(), BoxError> {
            self.log
                .lock()
                .map_err(|_| "configurator log poisoned")?
                .push(entry);
            Ok(())
        }
    }

    impl Configurator for MockConfigurator {
        fn needs_applying(&self) -> bool {
            true
        }

        fn apply(&mut self) -> Result<(), BoxError> {
            self.record(format!("apply {}", self.name))
        }

        fn revert(&mut self) -> Result<(), BoxError> {
            self.record(format!("revert {}", self.name))
        }

        fn description(&self) -> String {
            self.name.clone()
        }
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built components and agents for common testing scenarios.

    use super::*;

    /// `Calc.add(int, int)`, `Calc.add(long, long)` and `Calc.fail()`.
    pub fn calc_component() -> Component {
        Component::builder("Calc")
            .action_class(
                ActionClass::builder("CalcActions", || ())
                    .action(
                        ActionSpec::new("add")
                            .param("a", ParamType::Int)
                            .param("b", ParamType::Int),
                        |_: &mut (), args| Ok(ArgValue::Int(args.int(0)? + args.int(1)?)),
                    )
                    .action(
                        ActionSpec::new("add")
                            .param("a", ParamType::Long)
                            .param("b", ParamType::Long),
                        |_: &mut (), args| Ok(ArgValue::Long(args.long(0)? + args.long(1)?)),
                    )
                    .action(ActionSpec::new("fail"), |_: &mut (), _| {
                        Err("calculation failed".into())
                    })
                    .build(),
            )
            .build()
    }

    /// `Greeter.greet(String)` and `Greeter.greet(String, String)`.
    pub fn greeter_component() -> Component {
        Component::builder("Greeter")
            .action_class(
                ActionClass::builder("GreeterActions", || ())
                    .action(
                        ActionSpec::new("greet").param("name", ParamType::Str),
                        |_: &mut (), args| Ok(ArgValue::from(format!("Hello, {}", args.str(0)?))),
                    )
                    .action(
                        ActionSpec::new("greet")
                            .param("greeting", ParamType::Str)
                            .param("name", ParamType::Str),
                        |_: &mut (), args| {
                            Ok(ArgValue::from(format!("{}, {}", args.str(0)?, args.str(1)?)))
                        },
                    )
                    .build(),
            )
            .build()
    }

    /// Stateful `Counter.increment()` / `Counter.value()`, plus a process-wide
    /// tally of increments across every instance.
    pub fn counter_component(tally: Arc<AtomicUsize>) -> Component {
        Component::builder("Counter")
            .action_class(
                ActionClass::builder("CounterActions", move || (0i64, tally.clone()))
                    .action(
                        ActionSpec::new("increment"),
                        |state: &mut (i64, Arc<AtomicUsize>), _| {
                            state.0 += 1;
                            state.1.fetch_add(1, Ordering::SeqCst);
                            Ok(ArgValue::Long(state.0))
                        },
                    )
                    .action(
                        ActionSpec::new("value"),
                        |state: &mut (i64, Arc<AtomicUsize>), _| Ok(ArgValue::Long(state.0)),
                    )
                    .build(),
            )
            .build()
    }

    /// Agent with the calculator, greeter and counter deployed and started.
    pub fn test_agent(tally: Arc<AtomicUsize>) -> AtsResult<Agent> {
        let agent = Agent::new(AgentConfig::default())?;
        agent.deploy_component(calc_component())?;
        agent.deploy_component(greeter_component())?;
        agent.deploy_component(counter_component(tally))?;
        agent.start()?;
        Ok(agent)
    }

    /// `count` requests of `Calc.add(1, 2)`.
    pub fn add_requests(count: usize) -> Vec<ActionRequest> {
        (0..count)
            .map(|_| ActionRequest::new("Calc", "add", vec![ArgValue::Int(1), ArgValue::Int(2)]))
            .collect()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for ATS value types.

    use super::*;
    use proptest::prelude::*;

    /// Scalar argument values.
    pub fn arb_scalar_value() -> impl Strategy<Value = ArgValue> {
        prop_oneof![
            Just(ArgValue::Null),
            any::<bool>().prop_map(ArgValue::Bool),
            any::<i32>().prop_map(ArgValue::Int),
            any::<i64>().prop_map(ArgValue::Long),
            (-1.0e9f64..1.0e9).prop_map(ArgValue::Double),
            "[a-zA-Z0-9 ]{0,16}".prop_map(ArgValue::Str),
            prop::collection::vec(any::<u8>(), 0..16).prop_map(ArgValue::Bytes),
        ]
    }

    /// Scalars and one level of lists.
    pub fn arb_arg_value() -> impl Strategy<Value = ArgValue> {
        prop_oneof![
            4 => arb_scalar_value(),
            1 => prop::collection::vec(arb_scalar_value(), 0..4).prop_map(ArgValue::List),
        ]
    }

    pub fn arb_caller() -> impl Strategy<Value = CallerId> {
        (1u8..=254, 1u8..=254).prop_map(|(a, b)| CallerId::new(format!("10.0.{}.{}", a, b)))
    }

    /// Valid all-at-once or ramp-up iteration patterns.
    pub fn arb_threading_pattern() -> impl Strategy<Value = ThreadingPattern> {
        (2u32..16, 1u32..5, 0u64..50, any::<bool>()).prop_flat_map(
            |(threads, iterations, interval, ramp)| {
                (1u32..threads).prop_map(move |per_step| {
                    let pattern = if ramp {
                        ThreadingPattern::ramp_up(threads, iterations, interval, per_step, false)
                    } else {
                        ThreadingPattern::all_at_once(threads, iterations, false)
                    };
                    pattern.unwrap_or_else(|e| panic!("generated pattern invalid: {}", e))
                })
            },
        )
    }

    /// Integer range data configurations with at least `min_values` values.
    pub fn arb_range_config(min_values: i32) -> impl Strategy<Value = ParameterDataConfig> {
        (-1000i32..1000, min_values.max(1)..min_values.max(1) + 100)
            .prop_map(|(start, len)| ParameterDataConfig::range("id", start, start + len - 1))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on ATS error variants.

    use super::*;

    /// Assert that an ATS result failed with the given variant kind, whether
    /// raised locally or carried back from an agent.
    #[track_caller]
    pub fn assert_error_kind<T: std::fmt::Debug>(result: &AtsResult<T>, kind: &str) {
        match result {
            Err(AtsError::Remote(remote)) => assert_eq!(remote.kind, kind, "{:?}", remote),
            Err(e) => assert_eq!(e.kind(), kind, "{}", e),
            Ok(value) => panic!("Expected {} error, got Ok({:?})", kind, value),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
