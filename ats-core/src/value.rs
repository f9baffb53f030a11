//! Argument values and the type lattice used for action overload resolution

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// RUNTIME VALUES
// =============================================================================

/// A dynamically typed argument or result crossing the dispatch boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum ArgValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<ArgValue>),
}

impl ArgValue {
    /// Runtime type of this value. `Null` maps to the null placeholder type.
    pub fn arg_type(&self) -> ArgType {
        match self {
            ArgValue::Null => ArgType::Null,
            ArgValue::Bool(_) => ArgType::Bool,
            ArgValue::Int(_) => ArgType::Int,
            ArgValue::Long(_) => ArgType::Long,
            ArgValue::Double(_) => ArgType::Double,
            ArgValue::Str(_) => ArgType::Str,
            ArgValue::Bytes(_) => ArgType::Bytes,
            ArgValue::List(_) => ArgType::List,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ArgValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            ArgValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view, widening `Int`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ArgValue::Int(v) => Some(i64::from(*v)),
            ArgValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Floating point view, widening `Int` and `Long`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ArgValue::Int(v) => Some(f64::from(*v)),
            ArgValue::Long(v) => Some(*v as f64),
            ArgValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ArgValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ArgValue]> {
        match self {
            ArgValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => write!(f, "null"),
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Int(v) => write!(f, "{}", v),
            ArgValue::Long(v) => write!(f, "{}", v),
            ArgValue::Double(v) => write!(f, "{}", v),
            ArgValue::Str(s) => write!(f, "{}", s),
            ArgValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            ArgValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(v)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Long(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Double(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl From<Vec<u8>> for ArgValue {
    fn from(v: Vec<u8>) -> Self {
        ArgValue::Bytes(v)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ArgValue::Null, Into::into)
    }
}

/// Runtime type tag of an [`ArgValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgType {
    /// Placeholder for a `null` argument; matches any nullable parameter
    Null,
    Bool,
    Int,
    Long,
    Double,
    Str,
    Bytes,
    List,
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArgType::Null => "null",
            ArgType::Bool => "bool",
            ArgType::Int => "int",
            ArgType::Long => "long",
            ArgType::Double => "double",
            ArgType::Str => "string",
            ArgType::Bytes => "bytes",
            ArgType::List => "list",
        };
        f.write_str(name)
    }
}

// =============================================================================
// DECLARED PARAMETER TYPES
// =============================================================================

/// Conversion cost of passing an argument unchanged.
pub const COST_EXACT: u32 = 0;
/// Conversion cost per primitive widening step (int -> long -> double).
pub const COST_WIDENING_STEP: u32 = 1;
/// Conversion cost of boxing a primitive into its nullable form.
pub const COST_BOXING: u32 = 3;
/// Conversion cost of passing `null` to a nullable parameter.
pub const COST_NULL: u32 = 4;
/// Conversion cost of a string naming an enum variant.
pub const COST_STRING_TO_ENUM: u32 = 5;
/// Conversion cost of passing anything to an untyped parameter.
pub const COST_ANY: u32 = 6;

/// Declared type of an action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamType {
    Bool,
    Int,
    Long,
    Double,
    Str,
    Bytes,
    List,
    /// Nullable wrapper around a primitive
    Nullable(Box<ParamType>),
    /// Enumeration given by its type name and variant names
    Enum { name: String, variants: Vec<String> },
    /// Accepts any value
    Any,
}

impl ParamType {
    pub fn nullable(inner: ParamType) -> Self {
        ParamType::Nullable(Box::new(inner))
    }

    pub fn enumeration(name: &str, variants: &[&str]) -> Self {
        ParamType::Enum {
            name: name.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    /// Whether `null` may be passed for this parameter.
    pub fn accepts_null(&self) -> bool {
        !matches!(
            self,
            ParamType::Bool | ParamType::Int | ParamType::Long | ParamType::Double
        )
    }

    /// Cost of passing an argument of type `arg` to this parameter, or `None`
    /// when the argument is not assignable.
    pub fn conversion_cost(&self, arg: ArgType) -> Option<u32> {
        if arg == ArgType::Null {
            return match self {
                ParamType::Any => Some(COST_ANY),
                p if p.accepts_null() => Some(COST_NULL),
                _ => None,
            };
        }
        match (self, arg) {
            (ParamType::Bool, ArgType::Bool)
            | (ParamType::Int, ArgType::Int)
            | (ParamType::Long, ArgType::Long)
            | (ParamType::Double, ArgType::Double)
            | (ParamType::Str, ArgType::Str)
            | (ParamType::Bytes, ArgType::Bytes)
            | (ParamType::List, ArgType::List) => Some(COST_EXACT),
            (ParamType::Long, ArgType::Int) | (ParamType::Double, ArgType::Long) => {
                Some(COST_WIDENING_STEP)
            }
            (ParamType::Double, ArgType::Int) => Some(2 * COST_WIDENING_STEP),
            // boxing never combines with widening
            (ParamType::Nullable(inner), a) => match inner.conversion_cost(a) {
                Some(COST_EXACT) => Some(COST_BOXING),
                _ => None,
            },
            (ParamType::Enum { .. }, ArgType::Str) => Some(COST_STRING_TO_ENUM),
            (ParamType::Any, _) => Some(COST_ANY),
            _ => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Bool => f.write_str("bool"),
            ParamType::Int => f.write_str("int"),
            ParamType::Long => f.write_str("long"),
            ParamType::Double => f.write_str("double"),
            ParamType::Str => f.write_str("string"),
            ParamType::Bytes => f.write_str("bytes"),
            ParamType::List => f.write_str("list"),
            ParamType::Nullable(inner) => write!(f, "{}?", inner),
            ParamType::Enum { name, .. } => write!(f, "enum {}", name),
            ParamType::Any => f.write_str("any"),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_match_is_cheapest() {
        assert_eq!(ParamType::Int.conversion_cost(ArgType::Int), Some(COST_EXACT));
        assert!(ParamType::Long.conversion_cost(ArgType::Int) > Some(COST_EXACT));
    }

    #[test]
    fn test_primitive_rejects_null() {
        assert_eq!(ParamType::Int.conversion_cost(ArgType::Null), None);
        assert_eq!(ParamType::Str.conversion_cost(ArgType::Null), Some(COST_NULL));
        assert_eq!(
            ParamType::nullable(ParamType::Int).conversion_cost(ArgType::Null),
            Some(COST_NULL)
        );
    }

    #[test]
    fn test_no_narrowing() {
        assert_eq!(ParamType::Int.conversion_cost(ArgType::Long), None);
        assert_eq!(ParamType::Long.conversion_cost(ArgType::Double), None);
    }

    #[test]
    fn test_boxing_does_not_widen() {
        let boxed_long = ParamType::nullable(ParamType::Long);
        assert_eq!(boxed_long.conversion_cost(ArgType::Long), Some(COST_BOXING));
        assert_eq!(boxed_long.conversion_cost(ArgType::Int), None);
    }

    #[test]
    fn test_string_matches_enum() {
        let color = ParamType::enumeration("Color", &["RED", "GREEN"]);
        assert_eq!(color.conversion_cost(ArgType::Str), Some(COST_STRING_TO_ENUM));
        assert_eq!(color.conversion_cost(ArgType::Int), None);
    }

    #[test]
    fn test_display_list() {
        let v = ArgValue::List(vec![ArgValue::Int(1), ArgValue::from("a"), ArgValue::Null]);
        assert_eq!(v.to_string(), "[1, a, null]");
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(ArgValue::from(None::<i32>), ArgValue::Null);
        assert_eq!(ArgValue::from(Some(7)), ArgValue::Int(7));
    }

    fn arb_arg_type() -> impl Strategy<Value = ArgType> {
        prop_oneof![
            Just(ArgType::Null),
            Just(ArgType::Bool),
            Just(ArgType::Int),
            Just(ArgType::Long),
            Just(ArgType::Double),
            Just(ArgType::Str),
            Just(ArgType::Bytes),
            Just(ArgType::List),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Any parameter accepts every argument type at a cost no lower than an exact match.
        #[test]
        fn prop_any_accepts_everything(arg in arb_arg_type()) {
            prop_assert_eq!(ParamType::Any.conversion_cost(arg), Some(COST_ANY));
        }

        /// Widening integers never loses the value.
        #[test]
        fn prop_int_widening_preserves_value(v in any::<i32>()) {
            let value = ArgValue::Int(v);
            prop_assert_eq!(value.as_i64(), Some(i64::from(v)));
            prop_assert_eq!(value.as_f64(), Some(f64::from(v)));
        }
    }
}
