//! Wire types exchanged with RFID readers and alert sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Client identifier announced in the initialization frame.
pub const CLIENT_NAME: &str = "stockpulse";

// ── Push (WebSocket) frames ──────────────────────────────────────────

/// A decoded inbound frame from a streaming reader.
///
/// Frames are tagged by their `event_type` field. Unknown event types
/// decode to [`ReaderFrame::Other`] rather than failing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ReaderFrame {
    /// A batch of tags seen together by the reader.
    Scan {
        #[serde(default)]
        rfid_tags: Vec<String>,
    },
    /// Reader self-reported status.
    Status {
        #[serde(default)]
        status: Option<serde_json::Value>,
    },
    /// Reader-side fault report.
    Error {
        #[serde(default)]
        error_message: Option<String>,
    },
    #[serde(other)]
    Other,
}

impl ReaderFrame {
    /// Decode a text frame.
    ///
    /// Valid JSON objects without an `event_type` are treated as
    /// [`ReaderFrame::Other`]; anything that is not a JSON object, or whose
    /// known event carries ill-typed fields, is a decode error.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let malformed = |e: serde_json::Error| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        };

        let value: serde_json::Value = serde_json::from_str(text).map_err(malformed)?;
        let tagged = value.get("event_type").map(serde_json::Value::is_string);
        match tagged {
            Some(true) => serde_json::from_value(value).map_err(malformed),
            None if value.is_object() => Ok(Self::Other),
            _ => Err(Error::Deserialization {
                message: "expected a JSON object with a string event_type".into(),
                body: text.to_owned(),
            }),
        }
    }
}

/// Frame sent once the connection opens so the reader knows who is listening.
#[derive(Debug, Clone, Serialize)]
pub struct InitFrame<'a> {
    pub action: &'static str,
    pub reader_id: &'a str,
    pub client: &'static str,
}

impl<'a> InitFrame<'a> {
    pub fn new(reader_id: &'a str) -> Self {
        Self {
            action: "initialize",
            reader_id,
            client: CLIENT_NAME,
        }
    }
}

// ── Poll (HTTP) payloads ─────────────────────────────────────────────

/// Body returned by a reader's polling endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub scans: Vec<ScanRecord>,
}

/// One scan reported by a polling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScanRecord {
    /// Monotonic identifier assigned by the reader.
    #[serde(default)]
    pub scan_id: Option<u64>,
    #[serde(default)]
    pub rfid_tags: Vec<String>,
}

// ── Alert payload ────────────────────────────────────────────────────

/// JSON body delivered to an alert webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub source: String,
    pub severity: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn scan_frame_decodes_tags() {
        let frame = ReaderFrame::parse(r#"{"event_type":"scan","rfid_tags":["T1","T2"]}"#).unwrap();
        assert_eq!(
            frame,
            ReaderFrame::Scan {
                rfid_tags: vec!["T1".into(), "T2".into()]
            }
        );
    }

    #[test]
    fn scan_frame_without_tags_is_empty() {
        let frame = ReaderFrame::parse(r#"{"event_type":"scan"}"#).unwrap();
        assert_eq!(frame, ReaderFrame::Scan { rfid_tags: vec![] });
    }

    #[test]
    fn error_frame_carries_message() {
        let frame =
            ReaderFrame::parse(r#"{"event_type":"error","error_message":"antenna 2 fault"}"#)
                .unwrap();
        assert_eq!(
            frame,
            ReaderFrame::Error {
                error_message: Some("antenna 2 fault".into())
            }
        );
    }

    #[test]
    fn unknown_event_type_is_other() {
        let frame = ReaderFrame::parse(r#"{"event_type":"heartbeat","seq":4}"#).unwrap();
        assert_eq!(frame, ReaderFrame::Other);
    }

    #[test]
    fn object_without_event_type_is_other() {
        let frame = ReaderFrame::parse(r#"{"hello":"reader"}"#).unwrap();
        assert_eq!(frame, ReaderFrame::Other);
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(ReaderFrame::parse("[1,2,3]").is_err());
        assert!(ReaderFrame::parse(r#"{"event_type":"scan","rfid_tags":"T1"}"#).is_err());
    }

    #[test]
    fn malformed_frame_keeps_body() {
        let err = ReaderFrame::parse("not json at all").unwrap_err();
        match err {
            Error::Deserialization { body, .. } => assert_eq!(body, "not json at all"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn init_frame_shape() {
        let json = serde_json::to_value(InitFrame::new("entrance")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "action": "initialize",
                "reader_id": "entrance",
                "client": "stockpulse"
            })
        );
    }

    #[test]
    fn poll_response_tolerates_missing_fields() {
        let resp: PollResponse = serde_json::from_str(
            r#"{"scans":[{"scan_id":4,"rfid_tags":["A"]},{"rfid_tags":["B"]}]}"#,
        )
        .unwrap();
        assert_eq!(resp.scans.len(), 2);
        assert_eq!(resp.scans[0].scan_id, Some(4));
        assert_eq!(resp.scans[1].scan_id, None);

        let empty: PollResponse = serde_json::from_str("{}").unwrap();
        assert!(empty.scans.is_empty());
    }
}
