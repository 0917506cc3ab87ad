//! Property values
//!
//! The closed set of value shapes an element property can hold. Anything that
//! is not a boolean, number or string is carried as an opaque structured
//! payload and stored in the blob column.

use crate::error::{GraphError, GraphResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Boolean(bool),
    Float(f32),
    Double(f64),
    Long(i64),
    Integer(i32),
    String(String),
    /// Structured payload, serialized into the blob column
    Object(Value),
}

impl PropertyValue {
    /// Serialize any value into an opaque payload
    pub fn object<T: Serialize>(value: &T) -> GraphResult<Self> {
        Ok(Self::Object(serde_json::to_value(value)?))
    }

    /// Classify a dynamically typed JSON value
    ///
    /// `null` has no representation and maps to `None`, which property setters
    /// treat as removal. Integers that fit 64 bits become [`PropertyValue::Long`],
    /// other numbers [`PropertyValue::Double`]; arrays and maps fall back to
    /// [`PropertyValue::Object`].
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Boolean(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Long(i)),
                None => n.as_f64().map(Self::Double),
            },
            Value::String(s) => Some(Self::String(s)),
            other => Some(Self::Object(other)),
        }
    }

    /// Reclassify a JSON payload by its runtime shape
    ///
    /// `Object(null)` has no stored form and yields `None`. JSON booleans,
    /// numbers and strings move to their own kind; arrays and maps stay
    /// opaque. Every other variant is returned unchanged.
    pub fn normalize(self) -> Option<Self> {
        match self {
            Self::Object(value) => Self::from_json(value),
            other => Some(other),
        }
    }

    /// Deserialize an opaque payload into a concrete type
    ///
    /// Primitive values are also accepted, so a property written as a string
    /// can be read back as `String`. NaN and infinite floats have no JSON form
    /// and are an encoding error.
    pub fn to_object<T: DeserializeOwned>(&self) -> GraphResult<T> {
        let non_finite = match self {
            Self::Float(f) => !f.is_finite(),
            Self::Double(d) => !d.is_finite(),
            _ => false,
        };
        if non_finite {
            return Err(GraphError::Encoding(format!(
                "{:?} has no JSON representation",
                self
            )));
        }
        Ok(serde_json::from_value(self.to_json())?)
    }

    /// Lossy view as a JSON value; NaN and infinite floats become `null`
    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Float(f) => serde_json::Number::from_f64(f64::from(*f))
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Double(d) => serde_json::Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Long(l) => Value::from(*l),
            Self::Integer(i) => Value::from(*i),
            Self::String(s) => Value::String(s.clone()),
            Self::Object(v) => v.clone(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer view over both integer widths
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Long(l) => Some(*l),
            Self::Integer(i) => Some(i64::from(*i)),
            _ => None,
        }
    }

    /// Floating point view over both precisions
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Float(f) => Some(f64::from(*f)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f32> for PropertyValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::Long(i64::from(value))
    }
}

macro_rules! integer_property {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    Self::Integer(i32::from(value))
                }
            }
        )*
    };
}

integer_property!(i32, i16, i8, u16, u8);

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<Value> for PropertyValue {
    /// Wraps the JSON value as a payload; property writes reclassify it with
    /// [`PropertyValue::normalize`], so `null` removes and scalars get their kind
    fn from(value: Value) -> Self {
        Self::Object(value)
    }
}
