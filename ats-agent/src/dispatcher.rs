//! Action dispatch for single calls

use crate::registry::ComponentRepository;
use ats_core::{ActionRequest, ArgValue, AtsError, AtsResult, CallerId, ComponentError};
use std::sync::Arc;

/// Resolves and invokes single actions on behalf of callers.
#[derive(Clone)]
pub struct ActionDispatcher {
    repository: Arc<ComponentRepository>,
}

impl ActionDispatcher {
    pub fn new(repository: Arc<ComponentRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> &Arc<ComponentRepository> {
        &self.repository
    }

    /// Resolve `action` of `component` for the given arguments and invoke it
    /// on the caller's cached action class instance.
    pub fn execute_action(
        &self,
        caller: &CallerId,
        component: &str,
        action: &str,
        args: &[ArgValue],
    ) -> AtsResult<ArgValue> {
        let action_map = self.repository.get_component_action_map(caller, component)?;
        let arg_types: Vec<_> = args.iter().map(ArgValue::arg_type).collect();
        let method = action_map.get_action_method(action, &arg_types)?;
        let instance = action_map.cached_instance(&method)?;
        let mut instance = instance.lock()?;
        method.invoke(instance.as_mut(), args)
    }

    pub fn execute(&self, caller: &CallerId, request: &ActionRequest) -> AtsResult<ArgValue> {
        self.execute_action(caller, request.component(), request.action(), request.args())
    }

    /// Whether `component` resolves for `caller`.
    pub fn is_component_loaded(&self, caller: &CallerId, component: &str) -> bool {
        match self.repository.get_component_action_map(caller, component) {
            Ok(_) => true,
            Err(AtsError::Component(ComponentError::NoSuchComponent { .. })) => false,
            Err(e) => {
                tracing::warn!(component = %component, error = %e, "Could not check component");
                false
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
