//! Identifier types for window instances
//!
//! Windows are tagged with a UUID v7 so that log lines from a main window and
//! the temporary forward windows it absorbs sort roughly in creation order.
//! The total order also fixes the lock order when two windows are merged.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a window instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(Uuid);

impl WindowId {
    /// Create a new WindowId with current timestamp
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for WindowId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_id_creation() {
        let id1 = WindowId::new();
        let id2 = WindowId::new();
        assert_ne!(id1, id2, "WindowIds should be unique");
    }

    #[test]
    fn test_window_id_serialization() {
        let id = WindowId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: WindowId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }
}
