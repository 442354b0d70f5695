//! Purpose: Model the datum exchanged with the interpreter's operand stack.
//! Exports: `Value`, `ValueKind`, `ParamMap`, `ElementId`, JSON conversion helpers.
//! Role: Single typed vocabulary for everything pushed or popped by the marshaller.
//! Invariants: Literals are only produced by the marshaller (model names, keys, filters).
//! Invariants: JSON conversion is lossless except for literal/string and connection/array.
use std::collections::BTreeMap;

use serde_json::{Map, Number};

use crate::core::connection::CONN_LEN;
use crate::core::error::{Error, ErrorKind};

/// Identifier of one simulation element (node, device, or container).
pub type ElementId = u64;

pub type ParamMap = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ValueKind {
    Bool,
    Int,
    Double,
    String,
    Literal,
    Array,
    Dict,
    Connection,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Literal(String),
    Array(Vec<Value>),
    Dict(ParamMap),
    Connection([i64; CONN_LEN]),
}

impl Value {
    pub fn literal(name: impl Into<String>) -> Self {
        Value::Literal(name.into())
    }

    pub fn id(id: ElementId) -> Result<Self, Error> {
        id_to_int(id).map(Value::Int)
    }

    pub fn ids(ids: &[ElementId]) -> Result<Self, Error> {
        ids.iter()
            .map(|&id| Value::id(id))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Double(_) => ValueKind::Double,
            Value::String(_) => ValueKind::String,
            Value::Literal(_) => ValueKind::Literal,
            Value::Array(_) => ValueKind::Array,
            Value::Dict(_) => ValueKind::Dict,
            Value::Connection(_) => ValueKind::Connection,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric view; integers widen to doubles.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Double(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(text) | Value::Literal(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&ParamMap> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn into_int(self, what: &str) -> Result<i64, Error> {
        match self {
            Value::Int(value) => Ok(value),
            other => Err(unexpected(what, "integer", &other)),
        }
    }

    pub fn into_id(self, what: &str) -> Result<ElementId, Error> {
        let value = self.into_int(what)?;
        ElementId::try_from(value).map_err(|_| {
            Error::new(ErrorKind::Protocol)
                .with_message(format!("{what} must be a non-negative id, got {value}"))
        })
    }

    pub fn into_array(self, what: &str) -> Result<Vec<Value>, Error> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(unexpected(what, "array", &other)),
        }
    }

    pub fn into_dict(self, what: &str) -> Result<ParamMap, Error> {
        match self {
            Value::Dict(map) => Ok(map),
            other => Err(unexpected(what, "dictionary", &other)),
        }
    }

    pub fn into_ids(self, what: &str) -> Result<Vec<ElementId>, Error> {
        self.into_array(what)?
            .into_iter()
            .map(|item| item.into_id(what))
            .collect()
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self, Error> {
        match value {
            serde_json::Value::Null => Err(Error::new(ErrorKind::TypeMismatch)
                .with_message("null cannot be pushed onto the operand stack")),
            serde_json::Value::Bool(flag) => Ok(Value::Bool(*flag)),
            serde_json::Value::Number(number) => Ok(number_value(number)),
            serde_json::Value::String(text) => Ok(Value::String(text.clone())),
            serde_json::Value::Array(items) => items
                .iter()
                .map(Value::from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            serde_json::Value::Object(map) => map_from_json(map).map(Value::Dict),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(flag) => serde_json::Value::Bool(*flag),
            Value::Int(value) => serde_json::Value::from(*value),
            Value::Double(value) => Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(text) | Value::Literal(text) => serde_json::Value::String(text.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Dict(map) => serde_json::Value::Object(map_to_json(map)),
            Value::Connection(fields) => {
                serde_json::Value::Array(fields.iter().map(|f| serde_json::Value::from(*f)).collect())
            }
        }
    }
}

/// Channel integer for an element id; ids above `i64::MAX` have no encoding.
pub fn id_to_int(id: ElementId) -> Result<i64, Error> {
    i64::try_from(id).map_err(|_| {
        Error::new(ErrorKind::Protocol)
            .with_message(format!("element id {id} exceeds the channel integer range"))
    })
}

pub fn map_from_json(map: &Map<String, serde_json::Value>) -> Result<ParamMap, Error> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), Value::from_json(value)?)))
        .collect()
}

pub fn map_to_json(map: &ParamMap) -> Map<String, serde_json::Value> {
    map.iter()
        .map(|(key, value)| (key.clone(), value.to_json()))
        .collect()
}

fn number_value(number: &Number) -> Value {
    if let Some(value) = number.as_i64() {
        Value::Int(value)
    } else {
        Value::Double(number.as_f64().unwrap_or(f64::NAN))
    }
}

fn unexpected(what: &str, expected: &str, got: &Value) -> Error {
    Error::new(ErrorKind::Protocol).with_message(format!(
        "{what}: expected {expected} from channel, got {:?}",
        got.kind()
    ))
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<ParamMap> for Value {
    fn from(value: ParamMap) -> Self {
        Value::Dict(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{ElementId, ParamMap, Value, ValueKind};
    use crate::core::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_kind() {
        assert_eq!(Value::from_json(&json!(3)).expect("int"), Value::Int(3));
        assert_eq!(Value::from_json(&json!(2.5)).expect("double"), Value::Double(2.5));
    }

    #[test]
    fn json_objects_become_param_maps() {
        let value = Value::from_json(&json!({"weight": 2.0, "label": "exc"})).expect("dict");
        let map = value.as_dict().expect("dict");
        assert_eq!(map.get("weight"), Some(&Value::Double(2.0)));
        assert_eq!(map.get("label"), Some(&Value::String("exc".to_string())));
    }

    #[test]
    fn json_null_is_rejected() {
        let err = Value::from_json(&json!({"x": null})).expect_err("null");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn literals_serialize_as_strings() {
        let mut map = ParamMap::new();
        map.insert("model".to_string(), Value::literal("iaf_neuron"));
        assert_eq!(Value::Dict(map).to_json(), json!({"model": "iaf_neuron"}));
    }

    #[test]
    fn negative_ids_are_protocol_errors() {
        let err = Value::Int(-1).into_id("last id").expect_err("negative");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert_eq!(Value::Int(7).into_id("last id").expect("id"), 7);
    }

    #[test]
    fn ids_beyond_the_integer_range_are_rejected() {
        let err = Value::id(1 << 63).expect_err("too large");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        let err = Value::ids(&[1, ElementId::MAX]).expect_err("too large");
        assert_eq!(err.kind(), ErrorKind::Protocol);
        let max = i64::MAX as ElementId;
        assert_eq!(Value::id(max).expect("max"), Value::Int(i64::MAX));
        assert_eq!(Value::Connection([0; 5]).kind(), ValueKind::Connection);
    }
}
