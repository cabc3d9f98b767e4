//! Keyed live updates
//!
//! The upstream publisher multiplexes one update object per routing key into
//! a single JSON envelope. Each update is an open object that must carry a
//! `time` field. `time` is only compared for equality, so any JSON value is
//! accepted (integer or float milliseconds, a datetime string). Every other
//! field is relayed to clients untouched and in publisher order.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::RelayError;

/// Name of the de-duplication field.
pub const TIME_FIELD: &str = "time";

/// One decoded per-key update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyedUpdate {
    /// Aggregation timestamp, used to coalesce re-flushed buckets
    pub time: Value,
    /// Remaining payload fields, relayed verbatim
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl KeyedUpdate {
    pub fn new(time: impl Into<Value>) -> Self {
        Self {
            time: time.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Whether `other` carries the same aggregation timestamp.
    ///
    /// Numbers compare by value, so `5` and `5.0` are the same bucket.
    pub fn same_time(&self, other: &KeyedUpdate) -> bool {
        match (self.time.as_f64(), other.time.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => self.time == other.time,
        }
    }

    /// Decode the update object published under `key`.
    pub fn from_value(key: &str, value: Value) -> Result<Self, RelayError> {
        let invalid = |reason: &str| RelayError::InvalidUpdate {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let Value::Object(object) = value else {
            return Err(invalid("update is not a JSON object"));
        };

        let mut time = None;
        let mut fields = Map::new();
        for (name, value) in object {
            if name == TIME_FIELD {
                time = Some(value);
            } else {
                fields.insert(name, value);
            }
        }

        match time {
            Some(time) if !time.is_null() => Ok(Self { time, fields }),
            _ => Err(invalid("missing `time` field")),
        }
    }
}
