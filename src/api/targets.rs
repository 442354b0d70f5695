//! Purpose: Typed argument and reply shapes for status and creation operations.
//! Exports: `Targets`, `StatusKeys`, `StatusParams`, `StatusReply`, `StatusEntry`, `CreateParams`.
//! Role: Resolve caller input once at the API boundary; downstream code never re-inspects shape.
//! Invariants: Element targets are non-negative ids; connection targets are decoded handles.
//! Invariants: Reply variants match the key shape that was requested.
#![allow(clippy::result_large_err)]

use crate::core::broadcast::{Broadcast, broadcast};
use crate::core::connection::{ConnectionHandle, encode_all, is_connection_like};
use crate::core::error::{Error, ErrorKind};
use crate::core::value::{ElementId, ParamMap, Value, map_to_json};

use super::ApiResult;

/// Linear sequence of status targets: either elements or connections, never mixed.
#[derive(Clone, Debug, PartialEq)]
pub enum Targets {
    Elements(Vec<ElementId>),
    Connections(Vec<ConnectionHandle>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Elements(ids) => ids.len(),
            Targets::Connections(handles) => handles.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Capability check for untyped input: must be an array, either of non-negative
    /// integers or of connection-shaped records.
    pub fn from_value(value: &Value) -> ApiResult<Self> {
        let Some(items) = value.as_array() else {
            return Err(Error::new(ErrorKind::TypeMismatch)
                .with_message("targets must be a list of elements or connections"));
        };
        match items.first() {
            None => Ok(Targets::Elements(Vec::new())),
            Some(first) if is_connection_like(first) => items
                .iter()
                .map(|item| {
                    ConnectionHandle::decode(item).map_err(|err| {
                        Error::new(ErrorKind::TypeMismatch)
                            .with_message("targets mix connections with other values")
                            .with_source(err)
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Targets::Connections),
            Some(_) => items
                .iter()
                .map(|item| match item {
                    Value::Int(id) if *id >= 0 => Ok(*id as ElementId),
                    _ => Err(Error::new(ErrorKind::TypeMismatch)
                        .with_message("element ids must be non-negative integers")),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Targets::Elements),
        }
    }

    pub(crate) fn encode(&self) -> ApiResult<Value> {
        match self {
            Targets::Elements(ids) => Value::ids(ids),
            Targets::Connections(handles) => encode_all(handles),
        }
    }
}

impl From<Vec<ElementId>> for Targets {
    fn from(ids: Vec<ElementId>) -> Self {
        Targets::Elements(ids)
    }
}

impl From<&[ElementId]> for Targets {
    fn from(ids: &[ElementId]) -> Self {
        Targets::Elements(ids.to_vec())
    }
}

impl From<Vec<ConnectionHandle>> for Targets {
    fn from(handles: Vec<ConnectionHandle>) -> Self {
        Targets::Connections(handles)
    }
}

impl From<&[ConnectionHandle]> for Targets {
    fn from(handles: &[ConnectionHandle]) -> Self {
        Targets::Connections(handles.to_vec())
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum StatusKeys {
    #[default]
    All,
    One(String),
    Many(Vec<String>),
}

impl StatusKeys {
    pub fn one(key: impl Into<String>) -> Self {
        StatusKeys::One(key.into())
    }

    pub fn many<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StatusKeys::Many(keys.into_iter().map(Into::into).collect())
    }

    pub fn from_value(value: Option<&Value>) -> ApiResult<Self> {
        match value {
            None => Ok(StatusKeys::All),
            Some(Value::String(key) | Value::Literal(key)) => Ok(StatusKeys::One(key.clone())),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(StatusKeys::Many)
                .ok_or_else(keys_type_error),
            Some(_) => Err(keys_type_error()),
        }
    }

    /// Apply the key selection to one full status mapping.
    pub fn select(&self, mut map: ParamMap) -> ApiResult<StatusEntry> {
        match self {
            StatusKeys::All => Ok(StatusEntry::Map(map)),
            StatusKeys::One(key) => map.remove(key).map(StatusEntry::Value).ok_or_else(|| unknown_key(key)),
            StatusKeys::Many(keys) => keys
                .iter()
                .map(|key| map.get(key).cloned().ok_or_else(|| unknown_key(key)))
                .collect::<Result<Vec<_>, _>>()
                .map(StatusEntry::Row),
        }
    }

    pub(crate) fn empty_reply(&self) -> StatusReply {
        match self {
            StatusKeys::All => StatusReply::Maps(Vec::new()),
            StatusKeys::One(_) => StatusReply::Values(Vec::new()),
            StatusKeys::Many(_) => StatusReply::Rows(Vec::new()),
        }
    }
}

fn keys_type_error() -> Error {
    Error::new(ErrorKind::TypeMismatch).with_message("keys should be either a string or an iterable")
}

fn unknown_key(key: &str) -> Error {
    Error::new(ErrorKind::Usage).with_message(format!("unknown status key '{key}'"))
}

/// Per-target status read back from the channel.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusReply {
    Maps(Vec<ParamMap>),
    Values(Vec<Value>),
    Rows(Vec<Vec<Value>>),
}

impl StatusReply {
    pub fn len(&self) -> usize {
        match self {
            StatusReply::Maps(items) => items.len(),
            StatusReply::Values(items) => items.len(),
            StatusReply::Rows(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_values(self) -> Option<Vec<Value>> {
        match self {
            StatusReply::Values(values) => Some(values),
            _ => None,
        }
    }

    pub fn into_maps(self) -> Option<Vec<ParamMap>> {
        match self {
            StatusReply::Maps(maps) => Some(maps),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            StatusReply::Maps(maps) => serde_json::Value::Array(
                maps.iter()
                    .map(|map| serde_json::Value::Object(map_to_json(map)))
                    .collect(),
            ),
            StatusReply::Values(values) => {
                serde_json::Value::Array(values.iter().map(Value::to_json).collect())
            }
            StatusReply::Rows(rows) => serde_json::Value::Array(
                rows.iter()
                    .map(|row| serde_json::Value::Array(row.iter().map(Value::to_json).collect()))
                    .collect(),
            ),
        }
    }
}

/// Status of a single model or of the kernel.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusEntry {
    Map(ParamMap),
    Value(Value),
    Row(Vec<Value>),
}

impl StatusEntry {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            StatusEntry::Map(map) => serde_json::Value::Object(map_to_json(map)),
            StatusEntry::Value(value) => value.to_json(),
            StatusEntry::Row(row) => serde_json::Value::Array(row.iter().map(Value::to_json).collect()),
        }
    }
}

/// Parameters written by SetStatus/SetDefaults.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusParams {
    Maps(Broadcast<ParamMap>),
    /// `{key: value}` per target; a value sequence yields one mapping per item.
    Keyed { key: String, value: Broadcast<Value> },
}

impl StatusParams {
    pub fn keyed(key: impl Into<String>, value: impl Into<Broadcast<Value>>) -> Self {
        StatusParams::Keyed {
            key: key.into(),
            value: value.into(),
        }
    }

    pub(crate) fn into_maps(self, length: usize) -> ApiResult<Vec<ParamMap>> {
        let maps = match self {
            StatusParams::Maps(maps) => maps,
            StatusParams::Keyed { key, value } => value.map(|item| single_entry(&key, item)),
        };
        broadcast(maps, length, "params")
    }

    /// Collapse to exactly one mapping. A keyed value sequence becomes one
    /// list-valued entry; only a sequence of several mappings is rejected.
    pub(crate) fn into_single(self) -> ApiResult<ParamMap> {
        match self {
            StatusParams::Maps(Broadcast::Scalar(map)) => Ok(map),
            StatusParams::Maps(Broadcast::Sequence(mut maps)) if maps.len() == 1 => {
                Ok(maps.remove(0))
            }
            StatusParams::Keyed { key, value } => {
                let value = match value {
                    Broadcast::Scalar(value) => value,
                    Broadcast::Sequence(items) => Value::Array(items),
                };
                Ok(single_entry(&key, value))
            }
            StatusParams::Maps(Broadcast::Sequence(maps)) => Err(Error::new(ErrorKind::TypeMismatch)
                .with_message(format!(
                    "params must be a single mapping or a single key/value pair, got {} mappings",
                    maps.len()
                ))),
        }
    }
}

impl From<ParamMap> for StatusParams {
    fn from(map: ParamMap) -> Self {
        StatusParams::Maps(Broadcast::Scalar(map))
    }
}

impl From<Vec<ParamMap>> for StatusParams {
    fn from(maps: Vec<ParamMap>) -> Self {
        StatusParams::Maps(Broadcast::Sequence(maps))
    }
}

impl From<Broadcast<ParamMap>> for StatusParams {
    fn from(maps: Broadcast<ParamMap>) -> Self {
        StatusParams::Maps(maps)
    }
}

fn single_entry(key: &str, value: Value) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert(key.to_string(), value);
    map
}

/// Parameters for freshly created elements.
#[derive(Clone, Debug, PartialEq)]
pub enum CreateParams {
    /// Pushed once with the create command.
    Shared(ParamMap),
    /// Applied per element through SetStatus after creation.
    PerElement(Vec<ParamMap>),
}

#[cfg(test)]
mod tests {
    use super::{StatusEntry, StatusKeys, StatusParams, Targets};
    use crate::core::broadcast::Broadcast;
    use crate::core::connection::ConnectionHandle;
    use crate::core::error::ErrorKind;
    use crate::core::value::{ParamMap, Value};

    #[test]
    fn int_arrays_are_element_targets() {
        let value = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(Targets::from_value(&value).expect("targets"), Targets::Elements(vec![1, 2]));
    }

    #[test]
    fn connection_records_are_connection_targets() {
        let value = Value::Array(vec![Value::Connection([1, 2, 0, 0, 0])]);
        let targets = Targets::from_value(&value).expect("targets");
        assert_eq!(
            targets,
            Targets::Connections(vec![ConnectionHandle {
                source: 1,
                target: 2,
                target_thread: 0,
                synapse_model_id: 0,
                port: 0
            }])
        );
    }

    #[test]
    fn non_sequences_are_rejected() {
        let err = Targets::from_value(&Value::Int(3)).expect_err("scalar");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        let err = Targets::from_value(&Value::Array(vec![Value::Int(-2)])).expect_err("negative");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn keys_accept_names_and_name_lists_only() {
        assert_eq!(StatusKeys::from_value(None).expect("all"), StatusKeys::All);
        assert_eq!(
            StatusKeys::from_value(Some(&Value::from("V_m"))).expect("one"),
            StatusKeys::one("V_m")
        );
        let many = Value::Array(vec![Value::from("V_m"), Value::from("C_m")]);
        assert_eq!(
            StatusKeys::from_value(Some(&many)).expect("many"),
            StatusKeys::many(["V_m", "C_m"])
        );
        let err = StatusKeys::from_value(Some(&Value::Int(1))).expect_err("int");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn select_preserves_key_order() {
        let mut map = ParamMap::new();
        map.insert("a".to_string(), Value::Int(1));
        map.insert("b".to_string(), Value::Int(2));
        let entry = StatusKeys::many(["b", "a"]).select(map).expect("select");
        assert_eq!(entry, StatusEntry::Row(vec![Value::Int(2), Value::Int(1)]));
    }

    #[test]
    fn keyed_sequence_expands_per_target() {
        let params = StatusParams::keyed("V_m", Broadcast::sequence([Value::Double(-70.0), Value::Double(-60.0)]));
        let maps = params.into_maps(2).expect("maps");
        assert_eq!(maps[1].get("V_m"), Some(&Value::Double(-60.0)));
    }

    #[test]
    fn keyed_sequence_collapses_to_a_list_entry() {
        let params = StatusParams::keyed(
            "record_from",
            Broadcast::sequence([Value::literal("V_m"), Value::literal("I_e")]),
        );
        let map = params.into_single().expect("single");
        assert_eq!(
            map.get("record_from"),
            Some(&Value::Array(vec![Value::literal("V_m"), Value::literal("I_e")]))
        );
        let map = StatusParams::from(vec![ParamMap::new()])
            .into_single()
            .expect("one mapping");
        assert!(map.is_empty());
    }

    #[test]
    fn single_mapping_rejects_sequences() {
        let err = StatusParams::from(vec![ParamMap::new(), ParamMap::new()])
            .into_single()
            .expect_err("sequence");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }
}
