//! Dynamic values stored in reactive containers.
//!
//! Primitives are compared by value. Containers have reference identity:
//! two `Value::Object`s are identical only if they are handles to the same
//! object, regardless of contents. This is what makes in-place mutation
//! observable while still letting an unchanged write be a no-op.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::array::ReactiveArray;
use super::cell::Trackable;
use super::object::ReactiveObject;
use super::{observe, traverse, Observer};
use crate::error::{ReactiveError, Result};

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// A number. All numbers are doubles.
    Number(f64),
    /// An immutable string.
    String(Arc<str>),
    /// A keyed container.
    Object(ReactiveObject),
    /// A sequence container.
    Array(ReactiveArray),
}

impl Value {
    /// Build a plain (not yet observed) object.
    pub fn object<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Object(ReactiveObject::from_entries(entries))
    }

    /// Build a plain (not yet observed) array.
    pub fn array<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Value::Array(ReactiveArray::from_vec(items.into_iter().collect()))
    }

    /// Name of the value's kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
        }
    }

    /// `true` for objects and arrays.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    /// Strict identity: primitives by value, containers by reference.
    /// `NaN` is not identical to itself.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Identity used by writes: like [`is_identical`](Self::is_identical),
    /// except that two `NaN`s count as the same value.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.is_identical(other),
        }
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as an integer, if this is an integral number.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The object handle, if this is an object.
    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// The array handle, if this is an array.
    pub fn as_array(&self) -> Option<&ReactiveArray> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// The container's observer, if it is an observed container.
    pub fn observer(&self) -> Option<Observer> {
        match self {
            Value::Object(obj) => obj.observer(),
            Value::Array(arr) => arr.observer(),
            _ => None,
        }
    }

    /// Address of the container, for identity-keyed bookkeeping.
    pub(crate) fn container_addr(&self) -> Option<usize> {
        match self {
            Value::Object(obj) => Some(obj.addr()),
            Value::Array(arr) => Some(arr.addr()),
            _ => None,
        }
    }

    /// Snapshot the value as JSON.
    ///
    /// Reads go through the tracked accessors, so calling this inside a
    /// watcher subscribes it to everything serialized. Fails with
    /// [`ReactiveError::CyclicValue`] if a container contains itself.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut ancestors = HashSet::new();
        self.to_json_inner(&mut ancestors)
    }

    fn to_json_inner(&self, ancestors: &mut HashSet<usize>) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.to_string()),
            Value::Object(obj) => {
                if !ancestors.insert(obj.addr()) {
                    return Err(ReactiveError::CyclicValue);
                }
                let mut map = serde_json::Map::new();
                for key in obj.keys() {
                    let value = obj.get(&key).unwrap_or_default();
                    map.insert(key, value.to_json_inner(ancestors)?);
                }
                ancestors.remove(&obj.addr());
                serde_json::Value::Object(map)
            }
            Value::Array(arr) => {
                if !ancestors.insert(arr.addr()) {
                    return Err(ReactiveError::CyclicValue);
                }
                let items = arr
                    .to_vec()
                    .iter()
                    .map(|item| item.to_json_inner(ancestors))
                    .collect::<Result<Vec<_>>>()?;
                ancestors.remove(&arr.addr());
                serde_json::Value::Array(items)
            }
        })
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        return serde_json::Value::from(n as i64);
    }
    serde_json::Number::from_f64(n)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.is_identical(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            // Containers may be cyclic; stay shallow.
            Value::Object(obj) => write!(f, "{obj:?}"),
            Value::Array(arr) => write!(f, "{arr:?}"),
        }
    }
}

impl Trackable for Value {
    fn same_value(&self, other: &Self) -> bool {
        Value::same_value(self, other)
    }

    fn observe_child(&self) -> Option<Observer> {
        observe(self, false)
    }

    fn depend_elements(&self) {
        if let Value::Array(arr) = self {
            traverse::depend_array(&arr.items_untracked());
        }
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Value::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<ReactiveObject> for Value {
    fn from(obj: ReactiveObject) -> Self {
        Value::Object(obj)
    }
}

impl From<ReactiveArray> for Value {
    fn from(arr: ReactiveArray) -> Self {
        Value::Array(arr)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or_default()
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::from(s),
            serde_json::Value::Array(items) => Value::array(items.into_iter().map(Value::from)),
            serde_json::Value::Object(map) => {
                Value::object(map.into_iter().map(|(k, v)| (k, Value::from(v))))
            }
        }
    }
}
