//! Per-caller component repository
//!
//! The default caller holds the template components. Any other caller gets a
//! private copy of a component the first time it asks for it, so stateful
//! action class instances are never shared between callers.

use super::action::panic_message;
use super::component::{Component, ComponentActionMap};
use crate::environment::ComponentEnvironment;
use ats_core::{AtsResult, BoxError, CallerId, ComponentError};
use dashmap::DashMap;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

type CallerComponents = HashMap<String, Arc<Component>>;

/// Components per caller, seeded by the default caller's templates.
pub struct ComponentRepository {
    default_caller: CallerId,
    components: RwLock<HashMap<CallerId, CallerComponents>>,
    /// One lock per component name, serializing first-use copies
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ComponentRepository {
    pub fn new(default_caller: CallerId) -> Self {
        let mut components = HashMap::new();
        components.insert(default_caller.clone(), HashMap::new());
        Self {
            default_caller,
            components: RwLock::new(components),
            creation_locks: DashMap::new(),
        }
    }

    pub fn default_caller(&self) -> &CallerId {
        &self.default_caller
    }

    /// Register a template component under the default caller.
    pub fn put_component(&self, component: Component) -> AtsResult<()> {
        let mut components = self.components.write()?;
        let defaults = components.entry(self.default_caller.clone()).or_default();
        if defaults.contains_key(component.name()) {
            return Err(ComponentError::ComponentAlreadyDefined {
                component: component.name().to_string(),
            }
            .into());
        }
        tracing::info!(component = %component.name(), "Registered component");
        defaults.insert(component.name().to_string(), Arc::new(component));
        Ok(())
    }

    /// The caller's own copy of `name`, created on first use.
    pub fn get_component(&self, caller: &CallerId, name: &str) -> AtsResult<Arc<Component>> {
        let template = {
            let components = self.components.read()?;
            if let Some(found) = components.get(caller).and_then(|c| c.get(name)) {
                return Ok(found.clone());
            }
            components
                .get(&self.default_caller)
                .and_then(|c| c.get(name))
                .cloned()
                .ok_or_else(|| ComponentError::NoSuchComponent {
                    component: name.to_string(),
                    caller: caller.to_string(),
                })?
        };

        let lock = self
            .creation_locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _creating = lock.lock()?;

        // another thread may have finished the copy while we waited
        if let Some(found) = self
            .components
            .read()?
            .get(caller)
            .and_then(|c| c.get(name))
        {
            return Ok(found.clone());
        }

        tracing::info!(
            component = %name,
            caller = %caller,
            "Create a new instance of component for calls from caller"
        );
        let copy = Arc::new(template.new_copy());
        self.components
            .write()?
            .entry(caller.clone())
            .or_default()
            .insert(name.to_string(), copy.clone());
        Ok(copy)
    }

    /// The caller's action map for `name`.
    pub fn get_component_action_map(
        &self,
        caller: &CallerId,
        name: &str,
    ) -> AtsResult<Arc<ComponentActionMap>> {
        Ok(self.get_component(caller, name)?.action_map().clone())
    }

    /// Environment of a template component; `None` selects its default environment.
    pub fn get_component_environment(
        &self,
        component: &str,
        environment: Option<&str>,
    ) -> AtsResult<Arc<ComponentEnvironment>> {
        let template = self.get_component(&self.default_caller, component)?;
        template
            .environment(environment)
            .cloned()
            .ok_or_else(|| {
                ComponentError::NoSuchEnvironment {
                    component: component.to_string(),
                    environment: environment.unwrap_or("default").to_string(),
                }
                .into()
            })
    }

    /// Template components, sorted by name.
    pub fn components(&self) -> AtsResult<Vec<Arc<Component>>> {
        let components = self.components.read()?;
        let mut all: Vec<Arc<Component>> = components
            .get(&self.default_caller)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(all)
    }

    pub fn component_names(&self) -> AtsResult<Vec<String>> {
        Ok(self
            .components()?
            .iter()
            .map(|c| c.name().to_string())
            .collect())
    }

    /// Callers holding private copies, the default caller excluded.
    pub fn callers(&self) -> AtsResult<Vec<CallerId>> {
        let components = self.components.read()?;
        let mut callers: Vec<CallerId> = components
            .keys()
            .filter(|c| **c != self.default_caller)
            .cloned()
            .collect();
        callers.sort();
        Ok(callers)
    }

    /// Run every initialization handler, then take a first backup of every
    /// environment. Failures are logged per component and never stop the sweep.
    pub fn initialize_all_components(&self) -> AtsResult<()> {
        for component in self.components()? {
            if let Some(handler) = component.action_map().initialization_handler() {
                tracing::info!(component = %component.name(), "Initializing component");
                run_handler(component.name(), "initialization", || {
                    handler.initialize_component()
                });
            }
            for environment in component.environments() {
                if let Err(e) = environment.backup_only_if_not_already_done() {
                    tracing::error!(
                        component = %component.name(),
                        environment = %environment.name(),
                        error = %e,
                        "Could not backup environment"
                    );
                }
            }
        }
        Ok(())
    }

    /// Run every finalization handler. Failures are logged per component.
    pub fn finalize_all_components(&self) -> AtsResult<()> {
        for component in self.components()? {
            if let Some(handler) = component.action_map().finalization_handler() {
                tracing::info!(component = %component.name(), "Finalizing component");
                run_handler(component.name(), "finalization", || {
                    handler.finalize_component()
                });
            }
        }
        Ok(())
    }

    /// Forget every component of every caller.
    pub fn clear(&self) -> AtsResult<()> {
        let mut components = self.components.write()?;
        components.clear();
        components.insert(self.default_caller.clone(), HashMap::new());
        self.creation_locks.clear();
        tracing::info!("Cleared component repository");
        Ok(())
    }
}

fn run_handler<F>(component: &str, kind: &str, handler: F)
where
    F: FnOnce() -> Result<(), BoxError>,
{
    match catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(
            component = %component,
            handler = %kind,
            error = %e,
            "Component handler failed"
        ),
        Err(panic) => tracing::error!(
            component = %component,
            handler = %kind,
            panic = %panic_message(panic.as_ref()),
            "Component handler panicked"
        ),
    }
}

// =============================================================================
// TESTS
// =============================================================================
