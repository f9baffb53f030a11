//! Components and their action maps

use super::action::{ActionClass, ActionInstance, ActionMethod};
use super::container::ActionMethodContainer;
use crate::environment::ComponentEnvironment;
use ats_core::{ActionError, ArgType, AtsResult, BoxError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Shared, lockable action class instance.
pub type SharedInstance = Arc<Mutex<ActionInstance>>;

// =============================================================================
// LIFECYCLE HANDLERS
// =============================================================================

/// Runs once when the agent initializes its components.
pub trait InitializationHandler: Send + Sync {
    fn initialize_component(&self) -> Result<(), BoxError>;
}

/// Runs once when the agent shuts its components down.
pub trait FinalizationHandler: Send + Sync {
    fn finalize_component(&self) -> Result<(), BoxError>;
}

/// Runs after an environment of the component is restored.
pub trait EnvironmentCleanupHandler: Send + Sync {
    fn clean(&self) -> Result<(), BoxError>;
}

// =============================================================================
// COMPONENT ACTION MAP
// =============================================================================

/// Actions of one component, plus the instance cache of its action classes.
pub struct ComponentActionMap {
    component: String,
    actions: HashMap<String, ActionMethodContainer>,
    /// Class name -> instance, created on first use and kept while the map lives
    instances: Mutex<HashMap<String, SharedInstance>>,
    initialization_handler: Option<Arc<dyn InitializationHandler>>,
    finalization_handler: Option<Arc<dyn FinalizationHandler>>,
    cleanup_handler: Option<Arc<dyn EnvironmentCleanupHandler>>,
}

impl std::fmt::Debug for ComponentActionMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentActionMap")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl ComponentActionMap {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            actions: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
            initialization_handler: None,
            finalization_handler: None,
            cleanup_handler: None,
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    /// Register every action of `class`. A duplicate overload is logged and
    /// skipped; the remaining actions are still registered.
    pub fn register_action_class(&mut self, class: ActionClass) {
        for def in &class.actions {
            let method = Arc::new(ActionMethod::new(&self.component, class.info.clone(), def));
            let action = method.action().to_string();
            let container = self
                .actions
                .entry(action.clone())
                .or_insert_with(|| ActionMethodContainer::new(&self.component, &action));
            match container.add(method) {
                Ok(()) => tracing::debug!(
                    component = %self.component,
                    class = %class.name(),
                    action = %action,
                    "Registered action"
                ),
                Err(e) => tracing::error!(
                    component = %self.component,
                    class = %class.name(),
                    error = %e,
                    "Could not register action"
                ),
            }
        }
    }

    pub fn set_initialization_handler(&mut self, handler: Arc<dyn InitializationHandler>) {
        self.initialization_handler = Some(handler);
    }

    pub fn set_finalization_handler(&mut self, handler: Arc<dyn FinalizationHandler>) {
        self.finalization_handler = Some(handler);
    }

    pub fn set_cleanup_handler(&mut self, handler: Arc<dyn EnvironmentCleanupHandler>) {
        self.cleanup_handler = Some(handler);
    }

    pub fn initialization_handler(&self) -> Option<&Arc<dyn InitializationHandler>> {
        self.initialization_handler.as_ref()
    }

    pub fn finalization_handler(&self) -> Option<&Arc<dyn FinalizationHandler>> {
        self.finalization_handler.as_ref()
    }

    pub fn cleanup_handler(&self) -> Option<&Arc<dyn EnvironmentCleanupHandler>> {
        self.cleanup_handler.as_ref()
    }

    pub fn has_action(&self, action: &str) -> bool {
        self.actions.contains_key(action)
    }

    pub fn action_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of overloads registered under `action`.
    pub fn overload_count(&self, action: &str) -> usize {
        self.actions.get(action).map_or(0, |c| c.len())
    }

    /// Resolve the overload of `action` best matching `arg_types`.
    pub fn get_action_method(
        &self,
        action: &str,
        arg_types: &[ArgType],
    ) -> AtsResult<Arc<ActionMethod>> {
        let container = self
            .actions
            .get(action)
            .ok_or_else(|| ActionError::NoSuchAction {
                component: self.component.clone(),
                action: action.to_string(),
            })?;
        container.get(arg_types)
    }

    /// Cached instance of the class implementing `method`, created on first use.
    ///
    /// The constructor runs outside the cache lock; when two calls race, the
    /// first instance stored wins.
    pub fn cached_instance(&self, method: &ActionMethod) -> AtsResult<SharedInstance> {
        let class = method.class();
        if let Some(instance) = self.instances.lock()?.get(class.name()) {
            return Ok(instance.clone());
        }
        let created = Arc::new(Mutex::new(class.create_instance(&self.component)?));
        let mut instances = self.instances.lock()?;
        Ok(instances
            .entry(class.name().to_string())
            .or_insert(created)
            .clone())
    }

    pub fn cached_instance_count(&self) -> usize {
        self.instances.lock().map(|i| i.len()).unwrap_or(0)
    }

    /// Copy with the same actions and handlers but an empty instance cache.
    pub fn new_copy(&self) -> Self {
        Self {
            component: self.component.clone(),
            actions: self.actions.clone(),
            instances: Mutex::new(HashMap::new()),
            initialization_handler: self.initialization_handler.clone(),
            finalization_handler: self.finalization_handler.clone(),
            cleanup_handler: self.cleanup_handler.clone(),
        }
    }
}

// =============================================================================
// COMPONENT
// =============================================================================

/// A named bundle of actions, lifecycle handlers and environments.
pub struct Component {
    name: String,
    action_map: Arc<ComponentActionMap>,
    environments: Vec<Arc<ComponentEnvironment>>,
}

impl Component {
    pub fn builder(name: &str) -> ComponentBuilder {
        ComponentBuilder {
            name: name.to_string(),
            action_map: ComponentActionMap::new(name),
            environments: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_map(&self) -> &Arc<ComponentActionMap> {
        &self.action_map
    }

    pub fn environments(&self) -> &[Arc<ComponentEnvironment>] {
        &self.environments
    }

    /// Environment by name; `None` selects the first (default) one.
    pub fn environment(&self, name: Option<&str>) -> Option<&Arc<ComponentEnvironment>> {
        match name {
            None => self.environments.first(),
            Some(name) => self.environments.iter().find(|e| e.name() == name),
        }
    }

    /// Deep copy for another caller: fresh instance cache, copied environments.
    pub fn new_copy(&self) -> Self {
        Self {
            name: self.name.clone(),
            action_map: Arc::new(self.action_map.new_copy()),
            environments: self
                .environments
                .iter()
                .map(|e| Arc::new(e.new_copy()))
                .collect(),
        }
    }
}

/// Builder for a [`Component`].
pub struct ComponentBuilder {
    name: String,
    action_map: ComponentActionMap,
    environments: Vec<ComponentEnvironment>,
}

impl ComponentBuilder {
    pub fn action_class(mut self, class: ActionClass) -> Self {
        self.action_map.register_action_class(class);
        self
    }

    pub fn initialization_handler(mut self, handler: Arc<dyn InitializationHandler>) -> Self {
        self.action_map.set_initialization_handler(handler);
        self
    }

    pub fn finalization_handler(mut self, handler: Arc<dyn FinalizationHandler>) -> Self {
        self.action_map.set_finalization_handler(handler);
        self
    }

    pub fn cleanup_handler(mut self, handler: Arc<dyn EnvironmentCleanupHandler>) -> Self {
        self.action_map.set_cleanup_handler(handler);
        self
    }

    pub fn environment(mut self, environment: ComponentEnvironment) -> Self {
        self.environments.push(environment);
        self
    }

    pub fn build(self) -> Component {
        Component {
            name: self.name,
            action_map: Arc::new(self.action_map),
            environments: self.environments.into_iter().map(Arc::new).collect(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::action::ActionSpec;
    use ats_core::{ArgValue, AtsError, ParamType};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_class(created: Arc<AtomicUsize>) -> ActionClass {
        ActionClass::builder("Calc", move || {
            created.fetch_add(1, Ordering::SeqCst);
        })
        .action(
            ActionSpec::new("add")
                .param("a", ParamType::Int)
                .param("b", ParamType::Int),
            |_: &mut (), args| Ok(ArgValue::Int(args.int(0)? + args.int(1)?)),
        )
        .action(
            ActionSpec::new("add")
                .param("x", ParamType::Int)
                .param("y", ParamType::Int),
            |_: &mut (), _| Ok(ArgValue::Null),
        )
        .build()
    }

    #[test]
    fn test_duplicate_overload_is_skipped_not_fatal() {
        let mut map = ComponentActionMap::new("Calc");
        map.register_action_class(counting_class(Arc::new(AtomicUsize::new(0))));
        assert!(map.has_action("add"));
        assert_eq!(map.overload_count("add"), 1);
    }

    #[test]
    fn test_unknown_action() {
        let map = ComponentActionMap::new("Calc");
        let err = map.get_action_method("sub", &[]).unwrap_err();
        assert!(matches!(err, AtsError::Action(ActionError::NoSuchAction { .. })));
    }

    #[test]
    fn test_instance_created_once_per_map() -> AtsResult<()> {
        let created = Arc::new(AtomicUsize::new(0));
        let mut map = ComponentActionMap::new("Calc");
        map.register_action_class(counting_class(created.clone()));
        let method = map.get_action_method("add", &[ArgType::Int, ArgType::Int])?;
        let first = map.cached_instance(&method)?;
        let second = map.cached_instance(&method)?;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn test_panicking_constructor_leaves_cache_usable() -> AtsResult<()> {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let mut map = ComponentActionMap::new("Calc");
        map.register_action_class(
            ActionClass::builder("Calc", move || {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first construction fails");
                }
            })
            .action(ActionSpec::new("ping"), |_: &mut (), _| Ok(ArgValue::Null))
            .build(),
        );
        let method = map.get_action_method("ping", &[])?;

        let err = map.cached_instance(&method).unwrap_err();
        assert!(matches!(err, AtsError::Action(ActionError::Execution { .. })));
        assert!(map.cached_instance(&method).is_ok());
        assert_eq!(map.cached_instance_count(), 1);
        Ok(())
    }

    #[test]
    fn test_new_copy_has_empty_cache() -> AtsResult<()> {
        let created = Arc::new(AtomicUsize::new(0));
        let mut map = ComponentActionMap::new("Calc");
        map.register_action_class(counting_class(created.clone()));
        let method = map.get_action_method("add", &[ArgType::Int, ArgType::Int])?;
        map.cached_instance(&method)?;

        let copy = map.new_copy();
        assert_eq!(copy.cached_instance_count(), 0);
        assert!(copy.has_action("add"));
        copy.cached_instance(&method)?;
        assert_eq!(created.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
