//! Live channel event definitions
//!
//! A live feed delivers one `Connected` event, then zero or more `Record`
//! events, each carrying one serialized `TimeData` in non-decreasing time
//! order. Payloads are decoded by the window, not by the feed.

use serde::{Deserialize, Serialize};
use types::errors::WindowError;
use types::record::TimeData;

/// Event delivered on a live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    /// The channel is open; anything newer than this point will be pushed.
    Connected,
    /// One serialized record.
    Record(String),
}

impl StreamEvent {
    /// Wrap a record as a `Record` event.
    pub fn record(data: &TimeData) -> Self {
        StreamEvent::Record(data.to_json())
    }

    /// Decode the payload of a `Record` event. `Connected` yields `None`.
    pub fn decode(&self) -> Option<Result<TimeData, WindowError>> {
        match self {
            StreamEvent::Connected => None,
            StreamEvent::Record(payload) => Some(TimeData::from_json(payload)),
        }
    }

    /// Get the event type as a string label for logging.
    pub fn event_type_label(&self) -> &'static str {
        match self {
            StreamEvent::Connected => "Connected",
            StreamEvent::Record(_) => "Record",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_event_decodes() {
        let event = StreamEvent::record(&TimeData::new(100.0).with("value", 2.0));
        let decoded = event.decode().unwrap().unwrap();
        assert_eq!(decoded.time, 100.0);
        assert_eq!(decoded.get("value"), Some(2.0));
    }

    #[test]
    fn test_connected_has_no_payload() {
        assert!(StreamEvent::Connected.decode().is_none());
    }

    #[test]
    fn test_bad_payload_is_decode_error() {
        let event = StreamEvent::Record("not json".to_string());
        assert!(matches!(
            event.decode(),
            Some(Err(WindowError::Decode { .. }))
        ));
    }

    #[test]
    fn test_event_type_label() {
        assert_eq!(StreamEvent::Connected.event_type_label(), "Connected");
        assert_eq!(
            StreamEvent::Record("{}".to_string()).event_type_label(),
            "Record"
        );
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(StreamEvent::Record("{\"time\":1}".to_string())).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "record", "data": "{\"time\":1}"})
        );
    }
}
