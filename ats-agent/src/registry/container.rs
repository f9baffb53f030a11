//! Overload resolution for one action name
//!
//! Every overload whose signature accepts the runtime argument types is scored
//! by its per-argument conversion costs. The winner is chosen by a total order:
//!
//! 1. fixed-arity overloads before variadic ones
//! 2. lowest summed conversion cost
//! 3. lexicographically smallest cost vector (left-most cheaper argument wins)
//! 4. earliest registration
//!
//! Identical signatures cannot be registered twice, so the order never ties.

use super::action::ActionMethod;
use ats_core::{ActionError, ArgType, AtsResult};
use std::sync::Arc;

/// All overloads registered under one action name.
#[derive(Debug, Clone)]
pub struct ActionMethodContainer {
    component: String,
    action: String,
    methods: Vec<Arc<ActionMethod>>,
}

impl ActionMethodContainer {
    pub fn new(component: &str, action: &str) -> Self {
        Self {
            component: component.to_string(),
            action: action.to_string(),
            methods: Vec::new(),
        }
    }

    /// Register an overload. Fails when one with the same parameter types exists.
    pub fn add(&mut self, method: Arc<ActionMethod>) -> AtsResult<()> {
        let key = method.signature().type_key();
        if self
            .methods
            .iter()
            .any(|existing| existing.signature().type_key() == key)
        {
            return Err(ActionError::ActionAlreadyDefined {
                component: self.component.clone(),
                action: self.action.clone(),
                signature: method.signature().to_string(),
            }
            .into());
        }
        self.methods.push(method);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn methods(&self) -> &[Arc<ActionMethod>] {
        &self.methods
    }

    /// Resolve the overload best matching `arg_types`.
    pub fn get(&self, arg_types: &[ArgType]) -> AtsResult<Arc<ActionMethod>> {
        let best = self
            .methods
            .iter()
            .enumerate()
            .filter_map(|(order, method)| {
                method.signature().match_costs(arg_types).map(|costs| {
                    let total: u32 = costs.iter().sum();
                    ((method.signature().is_varargs(), total, costs, order), method)
                })
            })
            .min_by(|(a, _), (b, _)| a.cmp(b));

        match best {
            Some((_, method)) => Ok(method.clone()),
            None => Err(ActionError::NoCompatibleMethod {
                component: self.component.clone(),
                action: self.action.clone(),
                arg_types: arg_types.iter().map(|t| t.to_string()).collect(),
                reason: format!(
                    "Could not find compatible action method among {}",
                    self.describe_overloads()
                ),
            }
            .into()),
        }
    }

    fn describe_overloads(&self) -> String {
        let all: Vec<String> = self
            .methods
            .iter()
            .map(|m| format!("{}{}", self.action, m.signature()))
            .collect();
        all.join(", ")
    }
}

// =============================================================================
// TESTS
// =============================================================================
