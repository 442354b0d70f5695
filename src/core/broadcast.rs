//! Purpose: Normalize per-element arguments to the length of their target sequence.
//! Exports: `Broadcast`, `broadcast`, `broadcast_value`.
//! Role: Pure shape layer used by every operation taking params/weights/delays.
//! Invariants: Only two replication cases exist: an atomic value, or a one-item sequence.
//! Invariants: Never truncates or pads; every other length mismatch is an error.
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ParamMap, Value, ValueKind};

/// Argument shape resolved once at the API boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Broadcast<T> {
    Scalar(T),
    Sequence(Vec<T>),
}

impl<T> Broadcast<T> {
    pub fn scalar(value: T) -> Self {
        Broadcast::Scalar(value)
    }

    pub fn sequence(values: impl IntoIterator<Item = T>) -> Self {
        Broadcast::Sequence(values.into_iter().collect())
    }

    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Broadcast<U> {
        match self {
            Broadcast::Scalar(value) => Broadcast::Scalar(f(value)),
            Broadcast::Sequence(values) => Broadcast::Sequence(values.into_iter().map(f).collect()),
        }
    }
}

impl From<f64> for Broadcast<f64> {
    fn from(value: f64) -> Self {
        Broadcast::Scalar(value)
    }
}

impl From<ParamMap> for Broadcast<ParamMap> {
    fn from(value: ParamMap) -> Self {
        Broadcast::Scalar(value)
    }
}

impl From<Value> for Broadcast<Value> {
    fn from(value: Value) -> Self {
        Broadcast::Scalar(value)
    }
}

impl<T> From<Vec<T>> for Broadcast<T> {
    fn from(values: Vec<T>) -> Self {
        Broadcast::Sequence(values)
    }
}

pub fn broadcast<T: Clone>(value: Broadcast<T>, length: usize, name: &str) -> Result<Vec<T>, Error> {
    match value {
        Broadcast::Scalar(item) => Ok(vec![item; length]),
        Broadcast::Sequence(mut items) => {
            if items.len() == 1 {
                let item = items.remove(0);
                Ok(vec![item; length])
            } else if items.len() == length {
                Ok(items)
            } else {
                Err(shape_error(name, length, items.len()))
            }
        }
    }
}

/// Untyped form: a value whose kind is in `atomic` counts as a scalar; arrays are
/// sequences; anything else without a usable length is a type mismatch.
pub fn broadcast_value(
    value: Value,
    length: usize,
    atomic: &[ValueKind],
    name: &str,
) -> Result<Vec<Value>, Error> {
    if atomic.contains(&value.kind()) {
        return broadcast(Broadcast::Scalar(value), length, name);
    }
    match value {
        Value::Array(items) => broadcast(Broadcast::Sequence(items), length, name),
        other => Err(Error::new(ErrorKind::TypeMismatch).with_message(format!(
            "'{name}' must be one of {atomic:?} or a sequence, got {:?}",
            other.kind()
        ))),
    }
}

fn shape_error(name: &str, length: usize, received: usize) -> Error {
    Error::new(ErrorKind::ArgumentShape).with_message(format!(
        "'{name}' must be a single value, a list with one element or a list with {length} elements (got {received})"
    ))
}
