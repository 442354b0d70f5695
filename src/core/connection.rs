// Connection handle record and its stack encoding.
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ElementId, ParamMap, Value, id_to_int};

/// Number of fields in a connection handle record.
pub const CONN_LEN: usize = 5;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle {
    pub source: ElementId,
    pub target: ElementId,
    pub target_thread: i64,
    pub synapse_model_id: i64,
    pub port: i64,
}

impl ConnectionHandle {
    pub fn encode(&self) -> Result<Value, Error> {
        self.fields().map(Value::Connection)
    }

    /// Accepts the channel's connection datum, a flat array of `CONN_LEN` numbers
    /// (doubles are truncated to integers), or a mapping with named fields.
    pub fn decode(value: &Value) -> Result<Self, Error> {
        match value {
            Value::Connection(fields) => Self::from_fields(*fields),
            Value::Array(items) if items.len() == CONN_LEN => {
                let mut fields = [0i64; CONN_LEN];
                for (slot, item) in fields.iter_mut().zip(items) {
                    *slot = coerce_field(item)?;
                }
                Self::from_fields(fields)
            }
            Value::Dict(map) => Self::from_map(map),
            other => Err(Error::new(ErrorKind::Protocol).with_message(format!(
                "connection handle must be a {CONN_LEN}-field record, got {:?}",
                other.kind()
            ))),
        }
    }

    pub fn fields(&self) -> Result<[i64; CONN_LEN], Error> {
        Ok([
            id_to_int(self.source)?,
            id_to_int(self.target)?,
            self.target_thread,
            self.synapse_model_id,
            self.port,
        ])
    }

    fn from_fields(fields: [i64; CONN_LEN]) -> Result<Self, Error> {
        let [source, target, target_thread, synapse_model_id, port] = fields;
        Ok(Self {
            source: element_field("source", source)?,
            target: element_field("target", target)?,
            target_thread,
            synapse_model_id,
            port,
        })
    }

    fn from_map(map: &ParamMap) -> Result<Self, Error> {
        let field = |key: &str| -> Result<i64, Error> {
            map.get(key).map(coerce_field).unwrap_or_else(|| {
                Err(Error::new(ErrorKind::Protocol)
                    .with_message(format!("connection mapping is missing '{key}'")))
            })
        };
        Self::from_fields([
            field("source")?,
            field("target")?,
            field("target_thread")?,
            field("synapse_modelid")?,
            field("port")?,
        ])
    }
}

/// True when `value` structurally looks like a connection target rather than an element id.
pub fn is_connection_like(value: &Value) -> bool {
    match value {
        Value::Connection(_) | Value::Dict(_) => true,
        Value::Array(items) => items.len() == CONN_LEN,
        _ => false,
    }
}

pub fn decode_all(values: Vec<Value>) -> Result<Vec<ConnectionHandle>, Error> {
    values.iter().map(ConnectionHandle::decode).collect()
}

pub fn encode_all(handles: &[ConnectionHandle]) -> Result<Value, Error> {
    handles
        .iter()
        .map(ConnectionHandle::encode)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn coerce_field(value: &Value) -> Result<i64, Error> {
    match value {
        Value::Int(field) => Ok(*field),
        Value::Double(field) if field.is_finite() => Ok(field.trunc() as i64),
        other => Err(Error::new(ErrorKind::Protocol).with_message(format!(
            "connection field must be numeric, got {:?}",
            other.kind()
        ))),
    }
}

fn element_field(name: &str, value: i64) -> Result<ElementId, Error> {
    ElementId::try_from(value).map_err(|_| {
        Error::new(ErrorKind::Protocol)
            .with_message(format!("connection {name} must be non-negative, got {value}"))
    })
}
