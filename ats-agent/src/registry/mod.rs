//! Component registry: components, action maps and overload resolution

mod action;
mod component;
mod container;
mod repository;

pub use action::{
    is_internal_action, ActionArgs, ActionClass, ActionClassBuilder, ActionInstance, ActionMethod,
    ActionSpec, ArgumentError, ClassInfo, ParamSpec, Signature,
};
pub use component::{
    Component, ComponentActionMap, ComponentBuilder, EnvironmentCleanupHandler,
    FinalizationHandler, InitializationHandler, SharedInstance,
};
pub use container::ActionMethodContainer;
pub use repository::ComponentRepository;

pub(crate) use action::panic_message;
