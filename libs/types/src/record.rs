//! Time-stamped record type
//!
//! A record is a flat mapping from field name to numeric value with a
//! mandatory `time` field. On the wire it is a single JSON object:
//!
//! ```text
//! {"time": 1708123456789, "temperature": 21.5, "humidity": 40}
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::WindowError;

/// Name of the mandatory time field.
pub const TIME_FIELD: &str = "time";

/// One record of a time series.
///
/// `time` is kept out of `fields` so it can never be missing; `entries()`
/// yields it alongside the other fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeData {
    /// Record timestamp (Unix milliseconds by convention).
    pub time: f64,
    /// Every other numeric field, keyed by name.
    #[serde(flatten)]
    pub fields: BTreeMap<String, f64>,
}

impl TimeData {
    /// Create a record with only a time field.
    pub fn new(time: f64) -> Self {
        Self {
            time,
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field. Setting `time` moves the timestamp.
    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        if name == TIME_FIELD {
            self.time = value;
        } else {
            self.fields.insert(name, value);
        }
    }

    /// Look up a field by name, `time` included.
    pub fn get(&self, name: &str) -> Option<f64> {
        if name == TIME_FIELD {
            Some(self.time)
        } else {
            self.fields.get(name).copied()
        }
    }

    /// All `(name, value)` pairs, starting with `time`.
    pub fn entries(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        std::iter::once((TIME_FIELD, self.time))
            .chain(self.fields.iter().map(|(k, v)| (k.as_str(), *v)))
    }

    /// Parse a serialized live payload.
    pub fn from_json(payload: &str) -> Result<Self, WindowError> {
        serde_json::from_str(payload).map_err(|err| WindowError::Decode {
            reason: err.to_string(),
        })
    }

    /// Serialize to the wire format.
    pub fn to_json(&self) -> String {
        // A map of f64 keyed by String cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }
}
