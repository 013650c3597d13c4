//! Decoding of messages posted by the embedded SCORM runtime.
//!
//! The runtime is opaque and cross-origin; the only contract is a payload
//! (object or string-encoded JSON object) carrying a `messageType` and, for
//! progress kinds, a `progress` fraction in `[0, 1]`. Anything outside that
//! documented shape decodes to [`MalformedEvent`].

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::percentage_from_fraction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MalformedEvent {
    #[error("payload string is not JSON: {0}")]
    NotJson(String),

    #[error("payload is not an object")]
    NotAnObject,

    #[error("payload does not match the runtime message shape: {0}")]
    Shape(String),

    #[error("payload has no messageType")]
    MissingType,

    #[error("unrecognized messageType")]
    UnknownType,

    #[error("progress message without a numeric progress value")]
    MissingProgress,

    #[error("progress value is not finite")]
    InvalidProgress,
}

/// `messageType` values emitted by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MessageType {
    ScoProgress,
    CourseProgress,
    ScoCompleted,
    CourseCompleted,
    CoursePassed,
    PlayerExit,
    SessionEnded,
    #[serde(other)]
    Unknown,
}

/// A runtime message reduced to what the reconciler cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    Progress { percentage: u8 },
    Completed,
    SessionEnded,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(rename = "messageType", default)]
    message_type: Option<MessageType>,
    #[serde(default)]
    progress: Option<f64>,
}

/// Decodes one runtime payload.
///
/// # Errors
///
/// Returns `MalformedEvent` when the payload cannot be decoded or classified.
pub fn decode_message(data: &Value) -> Result<RuntimeEvent, MalformedEvent> {
    match data {
        Value::String(raw) => {
            let parsed: Value =
                serde_json::from_str(raw).map_err(|e| MalformedEvent::NotJson(e.to_string()))?;
            // One level of string encoding only; a string inside a string is junk.
            if !parsed.is_object() {
                return Err(MalformedEvent::NotAnObject);
            }
            classify(&parsed)
        }
        Value::Object(_) => classify(data),
        _ => Err(MalformedEvent::NotAnObject),
    }
}

fn classify(object: &Value) -> Result<RuntimeEvent, MalformedEvent> {
    let raw = RawMessage::deserialize(object).map_err(|e| MalformedEvent::Shape(e.to_string()))?;
    let kind = raw.message_type.ok_or(MalformedEvent::MissingType)?;

    match kind {
        MessageType::ScoProgress | MessageType::CourseProgress => {
            let fraction = raw.progress.ok_or(MalformedEvent::MissingProgress)?;
            let percentage =
                percentage_from_fraction(fraction).ok_or(MalformedEvent::InvalidProgress)?;
            Ok(RuntimeEvent::Progress { percentage })
        }
        MessageType::ScoCompleted | MessageType::CourseCompleted | MessageType::CoursePassed => {
            Ok(RuntimeEvent::Completed)
        }
        MessageType::PlayerExit | MessageType::SessionEnded => Ok(RuntimeEvent::SessionEnded),
        MessageType::Unknown => Err(MalformedEvent::UnknownType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_object_progress() {
        let event = decode_message(&json!({"messageType": "ScoProgress", "progress": 0.4}));
        assert_eq!(event, Ok(RuntimeEvent::Progress { percentage: 40 }));
    }

    #[test]
    fn decodes_string_encoded_payload() {
        let raw = Value::String(r#"{"messageType":"CourseProgress","progress":0.66}"#.into());
        assert_eq!(
            decode_message(&raw),
            Ok(RuntimeEvent::Progress { percentage: 66 })
        );
    }

    #[test]
    fn completion_kinds_collapse() {
        for kind in ["ScoCompleted", "CourseCompleted", "CoursePassed"] {
            assert_eq!(
                decode_message(&json!({ "messageType": kind })),
                Ok(RuntimeEvent::Completed)
            );
        }
    }

    #[test]
    fn exit_kinds_end_the_session() {
        for kind in ["PlayerExit", "SessionEnded"] {
            assert_eq!(
                decode_message(&json!({ "messageType": kind })),
                Ok(RuntimeEvent::SessionEnded)
            );
        }
    }

    #[test]
    fn unknown_and_missing_types_are_malformed() {
        assert_eq!(
            decode_message(&json!({"messageType": "Heartbeat"})),
            Err(MalformedEvent::UnknownType)
        );
        assert_eq!(
            decode_message(&json!({"progress": 0.5})),
            Err(MalformedEvent::MissingType)
        );
    }

    #[test]
    fn junk_payloads_are_malformed() {
        assert!(matches!(
            decode_message(&Value::String("not json".into())),
            Err(MalformedEvent::NotJson(_))
        ));
        assert_eq!(decode_message(&json!(42)), Err(MalformedEvent::NotAnObject));
        assert_eq!(
            decode_message(&Value::String("\"nested\"".into())),
            Err(MalformedEvent::NotAnObject)
        );
        assert!(matches!(
            decode_message(&json!({"messageType": "ScoProgress", "progress": "half"})),
            Err(MalformedEvent::Shape(_))
        ));
        assert_eq!(
            decode_message(&json!({"messageType": "ScoProgress"})),
            Err(MalformedEvent::MissingProgress)
        );
    }
}
