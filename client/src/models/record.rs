//! Record trait shared by every cached entity

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

/// Primary key of a record, normalized to its string form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(String);

impl RecordKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Numbers and strings are valid keys; `7` and `"7"` are the same key.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self(n.to_string())),
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RecordKey {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

/// A server entity identified by a primary key.
///
/// Records serialize every field (absent values as `null`) so that
/// [`Record::merge`] can tell known fields from unknown ones.
pub trait Record: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    /// Record type name as used in list payloads, e.g. `chat_message`
    const KIND: &'static str;

    /// Name of the primary key property
    const PRIMARY_KEY: &'static str;

    fn key(&self) -> RecordKey;

    /// Primary key carried by a raw payload, if any
    fn key_of(payload: &Value) -> Option<RecordKey> {
        payload.get(Self::PRIMARY_KEY).and_then(RecordKey::from_value)
    }

    /// Build a record from a server payload. Unknown properties are ignored.
    fn from_payload(payload: &Value) -> AppResult<Self> {
        if Self::key_of(payload).is_none() {
            return Err(AppError::Malformed(format!(
                "{} is missing primary key property {}",
                Self::KIND,
                Self::PRIMARY_KEY
            )));
        }
        serde_json::from_value(payload.clone()).map_err(|e| AppError::TypeMismatch {
            record: Self::KIND,
            field: Self::mismatched_field(payload),
            reason: e.to_string(),
        })
    }

    /// First property of `payload` that does not fit this record, or an
    /// empty name when none can be singled out
    fn mismatched_field(payload: &Value) -> String {
        let Some(properties) = payload.as_object() else {
            return String::new();
        };
        let Some(key) = properties.get(Self::PRIMARY_KEY) else {
            return String::new();
        };
        let single = |name: &str, value: &Value| {
            let mut map = Map::new();
            map.insert(name.to_string(), value.clone());
            Value::Object(map)
        };
        let Ok(base) = serde_json::from_value::<Self>(single(Self::PRIMARY_KEY, key)) else {
            return Self::PRIMARY_KEY.to_string();
        };
        properties
            .iter()
            .find(|(name, value)| base.clone().merge(&single(name, value)).is_err())
            .map(|(name, _)| name.clone())
            .unwrap_or_default()
    }

    /// Overwrite the fields present in `patch`, leaving the others untouched.
    ///
    /// Unknown properties are ignored. If any patched value has the wrong
    /// type the record is left unchanged.
    fn merge(&mut self, patch: &Value) -> AppResult<()> {
        let patch = patch
            .as_object()
            .ok_or_else(|| AppError::Malformed(format!("{} update is not an object", Self::KIND)))?;

        let mut current = serde_json::to_value(&*self)?;
        let fields = current
            .as_object_mut()
            .ok_or_else(|| AppError::Internal(format!("{} does not serialize to an object", Self::KIND)))?;

        let mut touched = Vec::new();
        for (name, value) in patch {
            if let Some(slot) = fields.get_mut(name) {
                *slot = value.clone();
                touched.push(name.as_str());
            } else {
                tracing::trace!("ignoring unknown property {} on {}", name, Self::KIND);
            }
        }
        if touched.is_empty() {
            return Ok(());
        }

        let merged: Self = serde_json::from_value(current).map_err(|e| AppError::TypeMismatch {
            record: Self::KIND,
            field: touched.join(","),
            reason: e.to_string(),
        })?;
        *self = merged;
        Ok(())
    }
}
