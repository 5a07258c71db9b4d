use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::CaptureError;

/// Kind of event stream. Decides the schema, the log partition root and the
/// index partition an event goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    ChannelEvents,
    ScteEvents,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::ChannelEvents, Category::ScteEvents];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ChannelEvents => "channel-events",
            Category::ScteEvents => "scte-events",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| CaptureError::UnknownCategory(s.to_owned()))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRequest {
    /// Batch of events
    Batch(Vec<Value>),
    /// Single event
    One(Value),
}

impl RawRequest {
    fn events(self) -> Vec<Value> {
        match self {
            RawRequest::Batch(events) => events,
            RawRequest::One(event) => vec![event],
        }
    }
}

/// Decodes an ingest body into its events. Producers post either one event or
/// an array of them. An empty body decodes as a single `null` event, which the
/// validator will then reject into the dead-letter store.
pub fn decode_events(body: &Bytes) -> Result<Vec<Value>, CaptureError> {
    tracing::debug!(len = body.len(), "decoding ingest payload");

    let payload = std::str::from_utf8(body).map_err(|e| {
        tracing::warn!("failed to decode body: {}", e);
        CaptureError::RequestDecodingError(String::from("invalid body encoding"))
    })?;

    if payload.is_empty() {
        return Ok(vec![Value::Null]);
    }
    Ok(serde_json::from_str::<RawRequest>(payload)?.events())
}

/// Reads a top-level field as text. Strings are taken as-is, other scalars use
/// their JSON rendering. Null and empty strings count as absent.
pub fn field_text(event: &Value, field: &str) -> Option<String> {
    match event.get(field)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_round_trips_through_its_name() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert!(matches!(
            "billing-events".parse::<Category>(),
            Err(CaptureError::UnknownCategory(name)) if name == "billing-events"
        ));
    }

    #[test]
    fn decodes_single_event_and_batches() {
        let one = decode_events(&Bytes::from(r#"{"uuid":"1"}"#)).unwrap();
        assert_eq!(one, vec![json!({"uuid": "1"})]);

        let batch = decode_events(&Bytes::from(r#"[{"uuid":"1"},{"uuid":"2"},3]"#)).unwrap();
        assert_eq!(batch, vec![json!({"uuid": "1"}), json!({"uuid": "2"}), json!(3)]);
    }

    #[test]
    fn empty_body_is_a_null_event() {
        assert_eq!(decode_events(&Bytes::new()).unwrap(), vec![Value::Null]);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            decode_events(&Bytes::from("{not json")),
            Err(CaptureError::RequestParsingError(_))
        ));
        assert!(matches!(
            decode_events(&Bytes::from(vec![0xff, 0xfe])),
            Err(CaptureError::RequestDecodingError(_))
        ));
    }

    #[test]
    fn field_text_renders_scalars() {
        let event = json!({"uuid": 42, "label": "", "timestamp": "2025-09-06T12:00:00Z", "x": null});
        assert_eq!(field_text(&event, "uuid"), Some("42".to_string()));
        assert_eq!(field_text(&event, "label"), None);
        assert_eq!(field_text(&event, "x"), None);
        assert_eq!(field_text(&event, "missing"), None);
        assert_eq!(
            field_text(&event, "timestamp"),
            Some("2025-09-06T12:00:00Z".to_string())
        );
    }
}
