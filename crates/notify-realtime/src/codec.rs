//! Push channel wire format: JSON text frames tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::types::{Notification, Result};

// ---------------------------------------------------------------------------
// Wire frame types
// ---------------------------------------------------------------------------

/// Control frames sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Heartbeat,
    Subscribe { notification_types: Vec<String> },
    Unsubscribe { notification_types: Vec<String> },
    RequestHistory { limit: u32 },
}

/// Frames pushed by the server. Any other `type` fails to decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Notification { notification: Notification },
    HeartbeatAck,
    ConnectionStatus { status: String },
}

// ---------------------------------------------------------------------------
// Encode / decode helpers
// ---------------------------------------------------------------------------

pub fn encode(frame: &ClientFrame) -> Result<String> {
    Ok(serde_json::to_string(frame)?)
}

pub fn decode(text: &str) -> Result<ServerFrame> {
    Ok(serde_json::from_str(text)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NotificationKind, NotificationStatus};

    #[test]
    fn encode_heartbeat() {
        let json = encode(&ClientFrame::Heartbeat).unwrap();
        assert_eq!(json, r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn encode_subscribe() {
        let frame = ClientFrame::Subscribe {
            notification_types: vec!["billing".to_string(), "security".to_string()],
        };
        let value: serde_json::Value = serde_json::from_str(&encode(&frame).unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "subscribe",
                "notification_types": ["billing", "security"],
            })
        );
    }

    #[test]
    fn encode_unsubscribe_and_history() {
        let unsub = encode(&ClientFrame::Unsubscribe {
            notification_types: vec!["billing".to_string()],
        })
        .unwrap();
        assert!(unsub.contains(r#""type":"unsubscribe""#));

        let history = encode(&ClientFrame::RequestHistory { limit: 50 }).unwrap();
        let value: serde_json::Value = serde_json::from_str(&history).unwrap();
        assert_eq!(value["type"], "request_history");
        assert_eq!(value["limit"], 50);
    }

    #[test]
    fn decode_notification() {
        let text = r#"{
            "type": "notification",
            "notification": {"id": 42, "type": "email", "title": "Hi", "status": "pending"}
        }"#;
        match decode(text).unwrap() {
            ServerFrame::Notification { notification } => {
                assert_eq!(notification.id, 42);
                assert_eq!(notification.kind, NotificationKind::Email);
                assert_eq!(notification.status, NotificationStatus::Pending);
            }
            other => panic!("expected Notification, got {other:?}"),
        }
    }

    #[test]
    fn decode_heartbeat_ack_with_extra_fields() {
        let frame = decode(r#"{"type":"heartbeat_ack","timestamp":"2024-01-01T00:00:00Z"}"#);
        assert_eq!(frame.unwrap(), ServerFrame::HeartbeatAck);
    }

    #[test]
    fn decode_connection_status() {
        let frame = decode(r#"{"type":"connection_status","status":"connected"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::ConnectionStatus {
                status: "connected".to_string()
            }
        );
    }

    #[test]
    fn decode_unknown_type_fails() {
        assert!(decode(r#"{"type":"presence","user":"x"}"#).is_err());
    }

    #[test]
    fn decode_missing_type_fails() {
        assert!(decode(r#"{"notification":{"id":1,"type":"sms"}}"#).is_err());
    }

    #[test]
    fn decode_not_json_fails() {
        assert!(decode("not json at all").is_err());
    }

    #[test]
    fn decode_notification_without_id_fails() {
        let text = r#"{"type":"notification","notification":{"type":"sms"}}"#;
        assert!(decode(text).is_err());
    }
}
