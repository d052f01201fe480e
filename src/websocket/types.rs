use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::message_models::MessageResponse;

/// Server-to-client frames.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    MessageCreated(MessageResponse),
    MessageRead(MessageReadPayload),
    Error(ErrorPayload),
    Ping,
    Pong,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageReadPayload {
    pub message_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

// Client-to-server messages
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    MarkMessageRead { message_id: Uuid },
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let id = Uuid::new_v4();
        let json = format!(r#"{{"type":"mark_message_read","message_id":"{}"}}"#, id);
        match serde_json::from_str::<ClientMessage>(&json).unwrap() {
            ClientMessage::MarkMessageRead { message_id } => assert_eq!(message_id, id),
            other => panic!("unexpected message: {:?}", other),
        }
        assert!(matches!(
            serde_json::from_str::<ClientMessage>(r#"{"type":"ping"}"#).unwrap(),
            ClientMessage::Ping
        ));
    }

    #[test]
    fn test_server_frames_are_tagged() {
        let json = serde_json::to_value(WsMessage::Pong).unwrap();
        assert_eq!(json["type"], "pong");
    }
}
