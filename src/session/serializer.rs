//! Pluggable payload serializers.
//!
//! Callers only see [`SessionSerializer`]; the store picks a concrete
//! implementation from configuration through [`create_serializer`].

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map as JsonMap, Number, Value as JsonValue};

use super::types::{DataMap, Key, Session, Value};

/// Error type for payload encoding
#[derive(Debug, thiserror::Error)]
pub enum SerializerError {
    #[error("Non-string key value, cannot serialize session to JSON: {0}")]
    NonStringKey(Key),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("Unknown serializer: {0}")]
    Unknown(String),
}

/// Converts a session payload to and from bytes.
///
/// `deserialize` merges the decoded entries into the session; on error the
/// session is left untouched.
pub trait SessionSerializer: Send + Sync {
    fn kind(&self) -> SerializerKind;

    fn serialize(&self, session: &Session) -> Result<Vec<u8>, SerializerError>;

    fn deserialize(&self, data: &[u8], session: &mut Session) -> Result<(), SerializerError>;

    fn serialize_data(&self, data: &DataMap) -> Result<Vec<u8>, SerializerError>;

    fn deserialize_data(&self, data: &[u8]) -> Result<DataMap, SerializerError>;
}

/// Serializer selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializerKind {
    Json,
    MessagePack,
}

impl SerializerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SerializerKind::Json => "json",
            SerializerKind::MessagePack => "msgpack",
        }
    }
}

impl FromStr for SerializerKind {
    type Err = SerializerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(SerializerKind::Json),
            "msgpack" | "messagepack" | "binary" => Ok(SerializerKind::MessagePack),
            other => Err(SerializerError::Unknown(other.to_string())),
        }
    }
}

/// Create a serializer for the given kind
pub fn create_serializer(kind: SerializerKind) -> Arc<dyn SessionSerializer> {
    match kind {
        SerializerKind::Json => Arc::new(JsonSerializer),
        SerializerKind::MessagePack => Arc::new(MessagePackSerializer),
    }
}

/// JSON payload encoding.
///
/// Portable, but lossy in two documented ways: `Value::Bytes` comes back as
/// a `Value::List` of integers, and integers outside the `i64` range come
/// back as `Value::Float`. Keys must be strings at every nesting level.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Value {
    /// Convert to a JSON value; fails on non-string map keys.
    ///
    /// Bytes become an array of numbers.
    pub fn to_json(&self) -> Result<JsonValue, SerializerError> {
        Ok(match self {
            Value::Nil => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            // serde_json writes non-finite floats as null as well
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::Bytes(bytes) => {
                JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect())
            }
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(Value::to_json)
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Value::Map(map) => {
                let mut object = JsonMap::with_capacity(map.len());
                for (key, value) in map {
                    object.insert(JsonSerializer::string_key(key)?, Value::to_json(value)?);
                }
                JsonValue::Object(object)
            }
        })
    }

    pub fn from_json(value: JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::Nil,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Value::Str(s),
            JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from_json).collect()),
            JsonValue::Object(object) => Value::Map(
                object
                    .into_iter()
                    .map(|(k, v)| (Key::Str(k), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl JsonSerializer {
    fn string_key(key: &Key) -> Result<String, SerializerError> {
        match key {
            Key::Str(s) => Ok(s.clone()),
            other => Err(SerializerError::NonStringKey(other.clone())),
        }
    }

    fn encode_object<'a>(
        entries: impl Iterator<Item = (String, &'a Value)>,
    ) -> Result<Vec<u8>, SerializerError> {
        let mut object = JsonMap::new();
        for (key, value) in entries {
            object.insert(key, value.to_json()?);
        }
        Ok(serde_json::to_vec(&JsonValue::Object(object))?)
    }

    fn decode_object(data: &[u8]) -> Result<JsonMap<String, JsonValue>, SerializerError> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl SessionSerializer for JsonSerializer {
    fn kind(&self) -> SerializerKind {
        SerializerKind::Json
    }

    fn serialize(&self, session: &Session) -> Result<Vec<u8>, SerializerError> {
        let entries = session
            .values
            .iter()
            .map(|(k, v)| Self::string_key(k).map(|k| (k, v)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::encode_object(entries.into_iter())
    }

    fn deserialize(&self, data: &[u8], session: &mut Session) -> Result<(), SerializerError> {
        let object = Self::decode_object(data)?;
        for (key, value) in object {
            session.values.insert(Key::Str(key), Value::from_json(value));
        }
        Ok(())
    }

    fn serialize_data(&self, data: &DataMap) -> Result<Vec<u8>, SerializerError> {
        Self::encode_object(data.iter().map(|(k, v)| (k.clone(), v)))
    }

    fn deserialize_data(&self, data: &[u8]) -> Result<DataMap, SerializerError> {
        Ok(Self::decode_object(data)?
            .into_iter()
            .map(|(k, v)| (k, Value::from_json(v)))
            .collect())
    }
}

/// MessagePack payload encoding.
///
/// Keeps every `Key` and `Value` variant exactly, at the cost of a format
/// only this crate's types read back.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessagePackSerializer;

impl SessionSerializer for MessagePackSerializer {
    fn kind(&self) -> SerializerKind {
        SerializerKind::MessagePack
    }

    fn serialize(&self, session: &Session) -> Result<Vec<u8>, SerializerError> {
        Ok(rmp_serde::to_vec(&session.values)?)
    }

    fn deserialize(&self, data: &[u8], session: &mut Session) -> Result<(), SerializerError> {
        let values: HashMap<Key, Value> = rmp_serde::from_slice(data)?;
        session.values.extend(values);
        Ok(())
    }

    fn serialize_data(&self, data: &DataMap) -> Result<Vec<u8>, SerializerError> {
        Ok(rmp_serde::to_vec(data)?)
    }

    fn deserialize_data(&self, data: &[u8]) -> Result<DataMap, SerializerError> {
        Ok(rmp_serde::from_slice(data)?)
    }
}
