//! WebSocket wire envelope (spec §6): `{type, id, payload?, error?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Request,
    Response,
    Event,
    Error,
    Ping,
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn event(event_name: &str, mut payload: Value) -> Self {
        if let Value::Object(map) = &mut payload {
            map.insert("event".to_string(), Value::String(event_name.to_string()));
        }
        Self {
            kind: EnvelopeType::Event,
            id: uuid::Uuid::new_v4().to_string(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn response(id: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: EnvelopeType::Response,
            id: id.into(),
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeType::Error,
            id: id.into(),
            payload: None,
            error: Some(message.into()),
        }
    }

    pub fn pong(id: impl Into<String>) -> Self {
        Self {
            kind: EnvelopeType::Pong,
            id: id.into(),
            payload: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestPayload {
    pub input: String,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub options: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_through_json() {
        let envelope = Envelope::response("req-1", serde_json::json!({"status": "pending"}));
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"type\":\"response\""));
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "req-1");
    }

    #[test]
    fn request_payload_parses_minimal_body() {
        let payload: RequestPayload = serde_json::from_value(serde_json::json!({
            "input": "add a feature"
        }))
        .unwrap();
        assert_eq!(payload.input, "add a feature");
        assert!(payload.session_id.is_none());
    }
}
