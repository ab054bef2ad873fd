//! The encoding boundary. Inbound text frames become validated envelopes
//! here, outbound envelopes get their timestamp stamped here; nothing else
//! in the server touches raw JSON frames.

use protocol::Envelope;
use serde_json::Value;
use thiserror::Error;

/// Why an inbound frame was rejected. Rejections are logged and dropped,
/// the connection stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("envelope must be a JSON object")]
    NotAnObject,
    #[error("envelope is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("envelope field `{0}` has the wrong type")]
    BadField(&'static str),
}

/// Parses and validates one inbound frame. `type`, `payload` and
/// `timestamp` are required; `payload` must be an object.
pub fn parse(text: &str) -> Result<Envelope, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    let object = value.as_object().ok_or(ProtocolError::NotAnObject)?;

    let kind = object
        .get("type")
        .ok_or(ProtocolError::MissingField("type"))?
        .as_str()
        .ok_or(ProtocolError::BadField("type"))?
        .to_string();
    let payload = object
        .get("payload")
        .ok_or(ProtocolError::MissingField("payload"))?;
    if !payload.is_object() {
        return Err(ProtocolError::BadField("payload"));
    }
    let timestamp = object
        .get("timestamp")
        .ok_or(ProtocolError::MissingField("timestamp"))?
        .as_u64()
        .ok_or(ProtocolError::BadField("timestamp"))?;
    let client_id = match object.get("clientId") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_str()
                .ok_or(ProtocolError::BadField("clientId"))?
                .to_string(),
        ),
    };

    Ok(Envelope {
        kind,
        payload: payload.clone(),
        timestamp,
        client_id,
    })
}

/// Builds an outbound envelope stamped with the current wall clock.
pub fn create(kind: &str, payload: Value, client_id: Option<String>, now_ms: u64) -> Envelope {
    Envelope {
        kind: kind.to_string(),
        payload,
        timestamp: now_ms,
        client_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_complete_envelope() {
        let envelope =
            parse(r#"{"type":"MOVE","payload":{"dx":1,"dy":0},"timestamp":123}"#).unwrap();
        assert_eq!(envelope.kind, "MOVE");
        assert_eq!(envelope.payload["dx"], 1);
        assert_eq!(envelope.timestamp, 123);
        assert!(envelope.client_id.is_none());
    }

    #[test]
    fn rejects_missing_required_fields() {
        assert!(matches!(
            parse(r#"{"payload":{},"timestamp":1}"#),
            Err(ProtocolError::MissingField("type"))
        ));
        assert!(matches!(
            parse(r#"{"type":"PING","timestamp":1}"#),
            Err(ProtocolError::MissingField("payload"))
        ));
        assert!(matches!(
            parse(r#"{"type":"PING","payload":{}}"#),
            Err(ProtocolError::MissingField("timestamp"))
        ));
    }

    #[test]
    fn rejects_wrongly_typed_fields() {
        assert!(matches!(
            parse(r#"{"type":"PING","payload":[],"timestamp":1}"#),
            Err(ProtocolError::BadField("payload"))
        ));
        assert!(matches!(
            parse(r#"{"type":"PING","payload":{},"timestamp":"soon"}"#),
            Err(ProtocolError::BadField("timestamp"))
        ));
        assert!(matches!(parse("[1,2]"), Err(ProtocolError::NotAnObject)));
        assert!(matches!(parse("not json"), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn create_stamps_the_clock() {
        let envelope = create(protocol::PONG, json!({}), Some("c-1".into()), 9_000);
        assert_eq!(envelope.timestamp, 9_000);
        assert_eq!(envelope.kind, protocol::PONG);
        assert_eq!(envelope.client_id.as_deref(), Some("c-1"));
    }
}
