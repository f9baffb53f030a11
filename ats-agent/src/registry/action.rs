//! Action classes, action methods and their invocation
//!
//! An [`ActionClass`] groups the actions implemented by one stateful type.
//! Each action is registered with a declared [`Signature`] and a typed
//! closure; the closure is erased into an [`ActionMethod`] so the registry can
//! resolve and invoke it by name and argument types at runtime.

use ats_core::{
    ActionError, ArgType, ArgValue, AtsError, AtsResult, BoxError, ParamType,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;

/// Type-erased instance of an action class.
pub type ActionInstance = Box<dyn Any + Send>;

type InstanceFactory = dyn Fn() -> Result<ActionInstance, BoxError> + Send + Sync;
type Invoker = dyn Fn(&mut (dyn Any + Send + 'static), &ActionArgs) -> Result<ArgValue, BoxError> + Send + Sync;

/// Housekeeping actions invoked by the framework itself are logged at debug level.
static INTERNAL_ACTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Internal.*Operations.*").expect("Invalid internal action regex"));
const INTERNAL_PROCESS_TALKER_PREFIX: &str = "InternalProcessTalker";

// =============================================================================
// SIGNATURES
// =============================================================================

/// A named, typed action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
}

impl ParamSpec {
    pub fn new(name: &str, ty: ParamType) -> Self {
        Self {
            name: name.to_string(),
            ty,
        }
    }
}

/// Declared parameters of an action, optionally ending in a variadic one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<ParamSpec>,
    pub varargs: Option<ParamSpec>,
}

impl Signature {
    /// Parameter types only; two signatures with the same key collide.
    pub fn type_key(&self) -> (Vec<ParamType>, Option<ParamType>) {
        (
            self.params.iter().map(|p| p.ty.clone()).collect(),
            self.varargs.as_ref().map(|p| p.ty.clone()),
        )
    }

    pub fn is_varargs(&self) -> bool {
        self.varargs.is_some()
    }

    /// Per-argument conversion costs, or `None` when the arguments do not fit.
    pub fn match_costs(&self, args: &[ArgType]) -> Option<Vec<u32>> {
        let fixed = self.params.len();
        match &self.varargs {
            None if args.len() != fixed => return None,
            Some(_) if args.len() < fixed => return None,
            _ => {}
        }

        let mut costs = Vec::with_capacity(args.len());
        for (param, arg) in self.params.iter().zip(args) {
            costs.push(param.ty.conversion_cost(*arg)?);
        }
        if let Some(varargs) = &self.varargs {
            let rest = &args[fixed..];
            // an explicit list in the variadic position is passed as is
            if matches!(rest, [ArgType::List]) && varargs.ty != ParamType::List {
                costs.push(ats_core::COST_EXACT);
            } else {
                for arg in rest {
                    costs.push(varargs.ty.conversion_cost(*arg)?);
                }
            }
        }
        Some(costs)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", p.ty, p.name)?;
        }
        if let Some(v) = &self.varargs {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{}... {}", v.ty, v.name)?;
        }
        write!(f, ")")
    }
}

/// Declaration of one action: name, parameters and metadata.
#[derive(Debug, Clone)]
pub struct ActionSpec {
    name: String,
    signature: Signature,
    transfer_unit: Option<String>,
    register_execution: bool,
    register_in_queue_execution_time: bool,
    deprecated: bool,
}

impl ActionSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            signature: Signature::default(),
            transfer_unit: None,
            register_execution: true,
            register_in_queue_execution_time: true,
            deprecated: false,
        }
    }

    pub fn param(mut self, name: &str, ty: ParamType) -> Self {
        self.signature.params.push(ParamSpec::new(name, ty));
        self
    }

    pub fn varargs(mut self, name: &str, ty: ParamType) -> Self {
        self.signature.varargs = Some(ParamSpec::new(name, ty));
        self
    }

    /// Unit of the amount returned by the action, reported as `<unit>/sec`.
    pub fn transfer_unit(mut self, unit: &str) -> Self {
        self.transfer_unit = Some(unit.to_string());
        self
    }

    pub fn not_registered(mut self) -> Self {
        self.register_execution = false;
        self
    }

    /// Keep the action out of the queue execution time.
    pub fn outside_queue_time(mut self) -> Self {
        self.register_in_queue_execution_time = false;
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }
}

// =============================================================================
// ACTION CLASSES
// =============================================================================

/// Name and constructor of an action class.
pub struct ClassInfo {
    name: String,
    factory: Box<InstanceFactory>,
}

impl ClassInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Construct a fresh instance. A failing or panicking factory becomes an
    /// execution error.
    pub fn create_instance(&self, component: &str) -> AtsResult<ActionInstance> {
        let reason = match catch_unwind(AssertUnwindSafe(|| (self.factory)())) {
            Ok(Ok(instance)) => return Ok(instance),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("constructor panicked: {}", panic_message(panic.as_ref())),
        };
        Err(AtsError::from(ActionError::Execution {
            component: component.to_string(),
            action: self.name.clone(),
            reason: format!("could not instantiate action class '{}': {}", self.name, reason),
        }))
    }
}

impl fmt::Debug for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassInfo").field("name", &self.name).finish()
    }
}

pub(crate) struct ActionDef {
    pub(crate) spec: ActionSpec,
    pub(crate) invoker: Arc<Invoker>,
}

/// A type implementing a set of actions, registered with a component.
pub struct ActionClass {
    pub(crate) info: Arc<ClassInfo>,
    pub(crate) actions: Vec<ActionDef>,
}

impl ActionClass {
    /// Start building an action class whose instances are made by `factory`.
    pub fn builder<T, F>(name: &str, factory: F) -> ActionClassBuilder<T>
    where
        T: Send + 'static,
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::try_builder(name, move || Ok(factory()))
    }

    /// Like [`ActionClass::builder`] with a constructor that may fail.
    pub fn try_builder<T, F>(name: &str, factory: F) -> ActionClassBuilder<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let factory = move || factory().map(|t| Box::new(t) as ActionInstance);
        ActionClassBuilder {
            class: ActionClass {
                info: Arc::new(ClassInfo {
                    name: name.to_string(),
                    factory: Box::new(factory),
                }),
                actions: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }
}

/// Typed builder for an [`ActionClass`].
pub struct ActionClassBuilder<T> {
    class: ActionClass,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + 'static> ActionClassBuilder<T> {
    pub fn action<F>(mut self, spec: ActionSpec, body: F) -> Self
    where
        F: Fn(&mut T, &ActionArgs) -> Result<ArgValue, BoxError> + Send + Sync + 'static,
    {
        let class_name = self.class.info.name.clone();
        let invoker = move |instance: &mut (dyn Any + Send + 'static), args: &ActionArgs| {
            let this = instance.downcast_mut::<T>().ok_or_else(|| -> BoxError {
                format!("instance is not of action class '{}'", class_name).into()
            })?;
            body(this, args)
        };
        self.class.actions.push(ActionDef {
            spec,
            invoker: Arc::new(invoker),
        });
        self
    }

    pub fn build(self) -> ActionClass {
        self.class
    }
}

// =============================================================================
// ACTION ARGUMENTS
// =============================================================================

/// Argument accessor failure inside an action body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Missing argument at position {index}")]
    Missing { index: usize },

    #[error("Argument at position {index} is not a {expected}, got {found}")]
    WrongType {
        index: usize,
        expected: &'static str,
        found: ArgType,
    },
}

/// Converted arguments handed to an action body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs {
    names: Vec<String>,
    values: Vec<ArgValue>,
}

impl ActionArgs {
    pub fn new(names: Vec<String>, values: Vec<ArgValue>) -> Self {
        Self { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index)
    }

    /// Value of the parameter declared under `name`.
    pub fn by_name(&self, name: &str) -> Option<&ArgValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| self.values.get(i))
    }

    fn at(&self, index: usize) -> Result<&ArgValue, ArgumentError> {
        self.values.get(index).ok_or(ArgumentError::Missing { index })
    }

    fn wrong(&self, index: usize, expected: &'static str, value: &ArgValue) -> ArgumentError {
        ArgumentError::WrongType {
            index,
            expected,
            found: value.arg_type(),
        }
    }

    pub fn bool(&self, index: usize) -> Result<bool, ArgumentError> {
        let v = self.at(index)?;
        v.as_bool().ok_or_else(|| self.wrong(index, "bool", v))
    }

    pub fn int(&self, index: usize) -> Result<i32, ArgumentError> {
        let v = self.at(index)?;
        v.as_i32().ok_or_else(|| self.wrong(index, "int", v))
    }

    pub fn long(&self, index: usize) -> Result<i64, ArgumentError> {
        let v = self.at(index)?;
        v.as_i64().ok_or_else(|| self.wrong(index, "long", v))
    }

    pub fn double(&self, index: usize) -> Result<f64, ArgumentError> {
        let v = self.at(index)?;
        v.as_f64().ok_or_else(|| self.wrong(index, "double", v))
    }

    pub fn str(&self, index: usize) -> Result<&str, ArgumentError> {
        let v = self.at(index)?;
        v.as_str().ok_or_else(|| self.wrong(index, "string", v))
    }

    /// String or `null`.
    pub fn opt_str(&self, index: usize) -> Result<Option<&str>, ArgumentError> {
        match self.at(index)? {
            ArgValue::Null => Ok(None),
            v => v.as_str().map(Some).ok_or_else(|| self.wrong(index, "string", v)),
        }
    }

    /// Integer or `null`.
    pub fn opt_int(&self, index: usize) -> Result<Option<i32>, ArgumentError> {
        match self.at(index)? {
            ArgValue::Null => Ok(None),
            v => v.as_i32().map(Some).ok_or_else(|| self.wrong(index, "int", v)),
        }
    }

    pub fn bytes(&self, index: usize) -> Result<&[u8], ArgumentError> {
        let v = self.at(index)?;
        v.as_bytes().ok_or_else(|| self.wrong(index, "bytes", v))
    }

    pub fn list(&self, index: usize) -> Result<&[ArgValue], ArgumentError> {
        let v = self.at(index)?;
        v.as_list().ok_or_else(|| self.wrong(index, "list", v))
    }
}

// =============================================================================
// ACTION METHODS
// =============================================================================

/// One registered action bound to its class and signature. Immutable.
pub struct ActionMethod {
    component: String,
    action: String,
    class: Arc<ClassInfo>,
    spec: ActionSpec,
    invoker: Arc<Invoker>,
}

impl ActionMethod {
    pub(crate) fn new(component: &str, class: Arc<ClassInfo>, def: &ActionDef) -> Self {
        Self {
            component: component.to_string(),
            action: def.spec.name.clone(),
            class,
            spec: def.spec.clone(),
            invoker: def.invoker.clone(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn class(&self) -> &Arc<ClassInfo> {
        &self.class
    }

    pub fn signature(&self) -> &Signature {
        &self.spec.signature
    }

    /// Declared parameter names, the variadic one last.
    pub fn parameter_names(&self) -> Vec<String> {
        let sig = &self.spec.signature;
        sig.params
            .iter()
            .chain(sig.varargs.iter())
            .map(|p| p.name.clone())
            .collect()
    }

    /// Transfer rate unit, e.g. `KB/sec`.
    pub fn transfer_rate_unit(&self) -> Option<String> {
        self.spec
            .transfer_unit
            .as_ref()
            .map(|unit| format!("{}/sec", unit))
    }

    pub fn register_execution(&self) -> bool {
        self.spec.register_execution
    }

    pub fn register_in_queue_execution_time(&self) -> bool {
        self.spec.register_in_queue_execution_time
    }

    pub fn is_deprecated(&self) -> bool {
        self.spec.deprecated
    }

    /// Convert raw arguments to the declared parameter types.
    pub fn prepare_args(&self, args: &[ArgValue]) -> AtsResult<ActionArgs> {
        let sig = &self.spec.signature;
        let mut values = Vec::with_capacity(sig.params.len() + 1);
        for (param, value) in sig.params.iter().zip(args) {
            values.push(self.convert(&param.ty, value)?);
        }
        if let Some(varargs) = &sig.varargs {
            let rest = &args[sig.params.len().min(args.len())..];
            let elements = match rest {
                [ArgValue::List(items)] if varargs.ty != ParamType::List => items.as_slice(),
                _ => rest,
            };
            let collected = elements
                .iter()
                .enumerate()
                .map(|(i, v)| self.convert_vararg(&varargs.ty, i, v))
                .collect::<AtsResult<Vec<_>>>()?;
            values.push(ArgValue::List(collected));
        }
        Ok(ActionArgs::new(self.parameter_names(), values))
    }

    /// Variadic elements may arrive inside a list, so their types are checked here.
    fn convert_vararg(&self, ty: &ParamType, index: usize, value: &ArgValue) -> AtsResult<ArgValue> {
        if ty.conversion_cost(value.arg_type()).is_none() {
            return Err(ActionError::Execution {
                component: self.component.clone(),
                action: self.action.clone(),
                reason: format!(
                    "variadic argument {} is {}, expected {}",
                    index,
                    value.arg_type(),
                    ty
                ),
            }
            .into());
        }
        self.convert(ty, value)
    }

    fn convert(&self, ty: &ParamType, value: &ArgValue) -> AtsResult<ArgValue> {
        let converted = match (ty, value) {
            (_, ArgValue::Null) => ArgValue::Null,
            (ParamType::Long, ArgValue::Int(v)) => ArgValue::Long(i64::from(*v)),
            (ParamType::Double, v @ (ArgValue::Int(_) | ArgValue::Long(_))) => {
                ArgValue::Double(v.as_f64().unwrap_or_default())
            }
            (ParamType::Enum { name, variants }, ArgValue::Str(s)) => {
                if !variants.iter().any(|variant| variant == s) {
                    return Err(ActionError::Execution {
                        component: self.component.clone(),
                        action: self.action.clone(),
                        reason: format!("'{}' is not a constant of enum {}", s, name),
                    }
                    .into());
                }
                value.clone()
            }
            _ => value.clone(),
        };
        Ok(converted)
    }

    /// Invoke the action body on `instance`.
    ///
    /// A failure returned by the body becomes an internal component error that
    /// keeps the original error as its source; a panic becomes an execution error.
    pub fn invoke(
        &self,
        instance: &mut (dyn Any + Send + 'static),
        args: &[ArgValue],
    ) -> AtsResult<ArgValue> {
        self.log_execution(args);
        let prepared = self.prepare_args(args)?;
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.invoker)(instance, &prepared)));
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(cause)) => Err(ActionError::internal(&self.component, &self.action, cause).into()),
            Err(panic) => Err(ActionError::Execution {
                component: self.component.clone(),
                action: self.action.clone(),
                reason: format!("action panicked: {}", panic_message(panic.as_ref())),
            }
            .into()),
        }
    }

    fn log_execution(&self, args: &[ArgValue]) {
        if self.spec.deprecated {
            tracing::warn!(
                component = %self.component,
                action = %self.action,
                "Action is deprecated and will be removed in a future release"
            );
        }
        let rendered: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let rendered = rendered.join(", ");
        if is_internal_action(&self.action) {
            tracing::debug!(component = %self.component, "Executing '{}' with arguments {}", self.action, rendered);
        } else {
            tracing::info!(component = %self.component, "Executing '{}' with arguments {}", self.action, rendered);
        }
    }
}

impl fmt::Debug for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionMethod")
            .field("component", &self.component)
            .field("action", &self.action)
            .field("class", &self.class.name)
            .field("signature", &self.spec.signature)
            .finish()
    }
}

/// Whether the action is framework housekeeping.
pub fn is_internal_action(action: &str) -> bool {
    INTERNAL_ACTION.is_match(action) || action.starts_with(INTERNAL_PROCESS_TALKER_PREFIX)
}

pub(crate) fn panic_message(panic: &(dyn Any + Send + 'static)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    struct Counter {
        value: i64,
    }

    fn counter_class() -> ActionClass {
        ActionClass::builder("Counter", || Counter { value: 0 })
            .action(
                ActionSpec::new("increment").param("by", ParamType::Long),
                |c: &mut Counter, args| {
                    c.value += args.long(0)?;
                    Ok(ArgValue::Long(c.value))
                },
            )
            .action(ActionSpec::new("fail"), |_c: &mut Counter, _args| {
                Err("boom".into())
            })
            .action(
                ActionSpec::new("paint").param(
                    "color",
                    ParamType::enumeration("Color", &["RED", "GREEN"]),
                ),
                |_c: &mut Counter, args| Ok(ArgValue::from(args.str(0)?.to_lowercase())),
            )
            .build()
    }

    fn method(class: &ActionClass, name: &str) -> ActionMethod {
        let def = class
            .actions
            .iter()
            .find(|d| d.spec.name == name)
            .expect("action defined");
        ActionMethod::new("Tools", class.info.clone(), def)
    }

    #[test]
    fn test_invoke_widens_int_to_long() -> AtsResult<()> {
        let class = counter_class();
        let m = method(&class, "increment");
        let mut instance = class.info.create_instance("Tools")?;
        let result = m.invoke(instance.as_mut(), &[ArgValue::Int(3)])?;
        assert_eq!(result, ArgValue::Long(3));
        let result = m.invoke(instance.as_mut(), &[ArgValue::Int(4)])?;
        assert_eq!(result, ArgValue::Long(7));
        Ok(())
    }

    #[test]
    fn test_body_error_becomes_internal_component_error() -> AtsResult<()> {
        let class = counter_class();
        let m = method(&class, "fail");
        let mut instance = class.info.create_instance("Tools")?;
        let err = m.invoke(instance.as_mut(), &[]).unwrap_err();
        match &err {
            AtsError::Action(inner @ ActionError::InternalComponent { .. }) => {
                let source = inner.source().expect("source kept");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn test_unknown_enum_constant_is_execution_error() -> AtsResult<()> {
        let class = counter_class();
        let m = method(&class, "paint");
        let mut instance = class.info.create_instance("Tools")?;
        assert_eq!(
            m.invoke(instance.as_mut(), &["RED".into()])?,
            ArgValue::from("red")
        );
        let err = m.invoke(instance.as_mut(), &["BLUE".into()]).unwrap_err();
        assert!(matches!(err, AtsError::Action(ActionError::Execution { .. })));
        Ok(())
    }

    #[test]
    fn test_panic_is_contained() -> AtsResult<()> {
        let class = ActionClass::builder("Bad", || ())
            .action(ActionSpec::new("explode"), |_: &mut (), _| panic!("kaboom"))
            .build();
        let m = method(&class, "explode");
        let mut instance = class.info.create_instance("Tools")?;
        let err = m.invoke(instance.as_mut(), &[]).unwrap_err();
        assert!(err.to_string().contains("kaboom"));
        Ok(())
    }

    #[test]
    fn test_failing_factory_is_execution_error() {
        let class = ActionClass::try_builder::<(), _>("Broken", || Err("no db".into())).build();
        let err = class.info.create_instance("Tools").unwrap_err();
        assert!(err.to_string().contains("no db"));
    }

    #[test]
    fn test_varargs_collects_trailing_args() -> AtsResult<()> {
        let class = ActionClass::builder("Joiner", || ())
            .action(
                ActionSpec::new("join")
                    .param("sep", ParamType::Str)
                    .varargs("parts", ParamType::Str),
                |_: &mut (), args| {
                    let sep = args.str(0)?;
                    let parts: Vec<String> =
                        args.list(1)?.iter().map(|p| p.to_string()).collect();
                    Ok(ArgValue::from(parts.join(sep)))
                },
            )
            .build();
        let m = method(&class, "join");
        let mut instance = class.info.create_instance("Tools")?;
        let out = m.invoke(instance.as_mut(), &["-".into(), "a".into(), "b".into()])?;
        assert_eq!(out, ArgValue::from("a-b"));
        Ok(())
    }

    #[test]
    fn test_panicking_factory_is_execution_error() {
        let class = ActionClass::builder::<(), _>("Fragile", || panic!("no config")).build();
        let err = class.info.create_instance("Tools").unwrap_err();
        assert!(matches!(err, AtsError::Action(ActionError::Execution { .. })));
        assert!(err.to_string().contains("no config"));
    }

    #[test]
    fn test_varargs_list_elements_are_checked() -> AtsResult<()> {
        let class = ActionClass::builder("Summer", || ())
            .action(
                ActionSpec::new("sum").varargs("values", ParamType::Long),
                |_: &mut (), args| {
                    let mut total = 0;
                    for value in args.list(0)? {
                        if let ArgValue::Long(v) = value {
                            total += v;
                        }
                    }
                    Ok(ArgValue::Long(total))
                },
            )
            .build();
        let m = method(&class, "sum");
        let mut instance = class.info.create_instance("Tools")?;

        let numbers = ArgValue::List(vec![ArgValue::Int(2), ArgValue::Long(3)]);
        assert_eq!(m.invoke(instance.as_mut(), &[numbers])?, ArgValue::Long(5));

        let mixed = ArgValue::List(vec![ArgValue::Long(1), ArgValue::from("x")]);
        let err = m.invoke(instance.as_mut(), &[mixed]).unwrap_err();
        assert!(matches!(err, AtsError::Action(ActionError::Execution { .. })));
        assert!(err.to_string().contains("variadic argument 1"));
        Ok(())
    }

    #[test]
    fn test_signature_match_costs_arity() {
        let sig = Signature {
            params: vec![ParamSpec::new("a", ParamType::Int)],
            varargs: None,
        };
        assert_eq!(sig.match_costs(&[ArgType::Int]), Some(vec![0]));
        assert_eq!(sig.match_costs(&[ArgType::Int, ArgType::Int]), None);
        assert_eq!(sig.match_costs(&[]), None);
    }

    #[test]
    fn test_internal_action_detection() {
        assert!(is_internal_action("InternalSystemOperations_getInfo"));
        assert!(is_internal_action("InternalProcessTalker_read"));
        assert!(!is_internal_action("add"));
    }

    #[test]
    fn test_transfer_rate_unit() {
        let class = ActionClass::builder("Files", || ())
            .action(
                ActionSpec::new("download").transfer_unit("KB"),
                |_: &mut (), _| Ok(ArgValue::Long(10)),
            )
            .build();
        assert_eq!(
            method(&class, "download").transfer_rate_unit().as_deref(),
            Some("KB/sec")
        );
    }
}
