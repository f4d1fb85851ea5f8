//! Dynamic values manipulated by Jac programs.
//!
//! Jac is dynamically typed. Every context field, local variable, report entry
//! and stack operand is a [`Value`]. Graph elements appear as
//! [`Value::Element`] references so that values never own graph objects.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::ElementId;

/// Errors raised while operating on values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// Binary operator applied to operands it does not support.
    #[error("unsupported operand types for {op}: '{lhs}' and '{rhs}'")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    /// Unary operator applied to an operand it does not support.
    #[error("bad operand type for unary {op}: '{operand}'")]
    UnaryMismatch { op: &'static str, operand: &'static str },

    /// Division or modulo by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Integer arithmetic left the 64-bit range.
    #[error("integer overflow in {op}")]
    Overflow { op: &'static str },

    /// A cast between types failed.
    #[error("invalid cast of {from} to {to}: {reason}")]
    InvalidCast {
        from: &'static str,
        to: JacType,
        reason: String,
    },

    /// Index or key not present.
    #[error("{0}")]
    Lookup(String),
}

/// Type tags usable as values (`int`, `str`, `node`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JacType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Dict,
    Node,
    Edge,
    Type,
}

impl JacType {
    pub fn name(&self) -> &'static str {
        match self {
            JacType::Null => "null",
            JacType::Bool => "bool",
            JacType::Int => "int",
            JacType::Float => "float",
            JacType::Str => "str",
            JacType::List => "list",
            JacType::Dict => "dict",
            JacType::Node => "node",
            JacType::Edge => "edge",
            JacType::Type => "type",
        }
    }
}

impl fmt::Display for JacType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Jac runtime value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
    /// Reference to a graph element held in the store.
    Element(ElementId),
    Type(JacType),
}

impl Value {
    pub fn str(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    /// Name of the value's dynamic type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Dict(_) => "dict",
            Value::Element(_) => "element",
            Value::Type(_) => "type",
        }
    }

    /// Truthiness used by conditions and logical operators.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Element(_) | Value::Type(_) => true,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Numeric view of ints, floats and bools.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<ElementId> {
        match self {
            Value::Element(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Vec<Value>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Collect element ids from a single element or a list of elements.
    ///
    /// Returns `None` if any member is not an element.
    pub fn element_ids(&self) -> Option<Vec<ElementId>> {
        match self {
            Value::Element(id) => Some(vec![*id]),
            Value::List(items) => items.iter().map(Value::as_element).collect(),
            _ => None,
        }
    }

    /// Convert to plain JSON for reports.
    ///
    /// Elements render as their `urn:uuid:` reference and type tags by name.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Dict(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Element(id) => Json::String(id.urn()),
            Value::Type(t) => Json::String(t.name().to_string()),
        }
    }

    /// Build a value from JSON. Strings are never reinterpreted as elements.
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(map) => Value::Dict(
                map.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Cast to a primitive type tag.
    ///
    /// Node and edge casts need the graph and are resolved by the runtime.
    pub fn cast(&self, to: JacType) -> Result<Value, ValueError> {
        let invalid = |reason: &str| ValueError::InvalidCast {
            from: self.type_name(),
            to,
            reason: reason.to_string(),
        };
        match to {
            JacType::Null => Ok(Value::Null),
            JacType::Bool => Ok(Value::Bool(self.is_truthy())),
            JacType::Int => match self {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Bool(b) => Ok(Value::Int(*b as i64)),
                Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|e| invalid(&e.to_string())),
                _ => Err(invalid("not a number")),
            },
            JacType::Float => match self {
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|e| invalid(&e.to_string())),
                other => other
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| invalid("not a number")),
            },
            JacType::Str => match self {
                Value::Dict(_) | Value::List(_) => Ok(Value::Str(self.to_json().to_string())),
                other => Ok(Value::Str(other.to_string())),
            },
            JacType::List => match self {
                Value::List(items) => Ok(Value::List(items.clone())),
                Value::Str(s) => Ok(Value::List(
                    s.chars().map(|c| Value::Str(c.to_string())).collect(),
                )),
                Value::Dict(map) => Ok(Value::List(
                    map.keys().map(|k| Value::Str(k.clone())).collect(),
                )),
                _ => Err(invalid("not iterable")),
            },
            JacType::Dict => match self {
                Value::Dict(map) => Ok(Value::Dict(map.clone())),
                Value::Str(s) => {
                    let json: serde_json::Value =
                        serde_json::from_str(s).map_err(|e| invalid(&e.to_string()))?;
                    match Value::from_json(&json) {
                        dict @ Value::Dict(_) => Ok(dict),
                        _ => Err(invalid("json text is not an object")),
                    }
                }
                _ => Err(invalid("not a mapping")),
            },
            JacType::Type => Ok(Value::Type(self.primitive_type())),
            JacType::Node | JacType::Edge => Err(invalid("graph casts need a graph context")),
        }
    }

    /// Best-effort type tag of this value.
    pub fn primitive_type(&self) -> JacType {
        match self {
            Value::Null => JacType::Null,
            Value::Bool(_) => JacType::Bool,
            Value::Int(_) => JacType::Int,
            Value::Float(_) => JacType::Float,
            Value::Str(_) => JacType::Str,
            Value::List(_) => JacType::List,
            Value::Dict(_) => JacType::Dict,
            Value::Element(_) => JacType::Node,
            Value::Type(_) => JacType::Type,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => f.write_str(s),
            Value::Element(id) => f.write_str(&id.urn()),
            Value::Type(t) => write!(f, "{t}"),
            Value::List(_) | Value::Dict(_) => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<ElementId> for Value {
    fn from(id: ElementId) -> Self {
        Value::Element(id)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Dict(map)
    }
}
