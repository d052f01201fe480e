use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Display name used when the sending user no longer exists.
pub const DEFAULT_SENDER_NAME: &str = "User";

/// Maximum message body length, in characters.
pub const MAX_BODY_LENGTH: usize = 255;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Option<Uuid>, // None once the sender's account is gone
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message joined with its sender's name (LEFT JOIN, so the name may be missing).
#[derive(Debug, Clone, FromRow)]
pub struct MessageWithSender {
    #[sqlx(flatten)]
    pub message: Message,
    pub sender_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Recipient {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct SenderInfo {
    pub id: Option<Uuid>,
    pub name: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub user_id: Option<Uuid>,
    pub body: String,
    pub sender: SenderInfo,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageResponse {
    pub fn new(message: Message, sender_name: Option<String>) -> Self {
        let sender = SenderInfo {
            id: message.user_id,
            name: sender_name.unwrap_or_else(|| DEFAULT_SENDER_NAME.to_string()),
        };

        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            user_id: message.user_id,
            body: message.body,
            sender,
            created_at: message.created_at,
            updated_at: message.updated_at,
        }
    }
}

impl From<MessageWithSender> for MessageResponse {
    fn from(row: MessageWithSender) -> Self {
        Self::new(row.message, row.sender_name)
    }
}

/// Which participants receive a Recipient row when a message is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecipientPolicy {
    /// Every participant, sender included, so read state is tracked symmetrically.
    #[default]
    IncludeSender,
    /// Everyone but the sender.
    ExcludeSender,
}

impl RecipientPolicy {
    pub fn select(&self, sender_id: Uuid, participants: &[Uuid]) -> Vec<Uuid> {
        match self {
            RecipientPolicy::IncludeSender => participants.to_vec(),
            RecipientPolicy::ExcludeSender => participants
                .iter()
                .copied()
                .filter(|id| *id != sender_id)
                .collect(),
        }
    }
}

impl FromStr for RecipientPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include_sender" => Ok(RecipientPolicy::IncludeSender),
            "exclude_sender" => Ok(RecipientPolicy::ExcludeSender),
            other => Err(format!("unknown recipient policy '{}'", other)),
        }
    }
}

impl std::fmt::Display for RecipientPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientPolicy::IncludeSender => write!(f, "include_sender"),
            RecipientPolicy::ExcludeSender => write!(f, "exclude_sender"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(user_id: Option<Uuid>) -> Message {
        let now = Utc::now();
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            user_id,
            body: "hi".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_missing_sender_uses_placeholder_name() {
        let response = MessageResponse::new(message(None), None);
        assert_eq!(response.sender.name, "User");
        assert_eq!(response.sender.id, None);
    }

    #[test]
    fn test_sender_name_is_kept() {
        let sender = Uuid::new_v4();
        let response = MessageResponse::new(message(Some(sender)), Some("Alice".into()));
        assert_eq!(
            response.sender,
            SenderInfo { id: Some(sender), name: "Alice".into() }
        );
    }

    #[test]
    fn test_include_sender_policy_keeps_everyone() {
        let sender = Uuid::new_v4();
        let other = Uuid::new_v4();
        let selected = RecipientPolicy::IncludeSender.select(sender, &[sender, other]);
        assert_eq!(selected, vec![sender, other]);
    }

    #[test]
    fn test_exclude_sender_policy_drops_sender() {
        let sender = Uuid::new_v4();
        let other = Uuid::new_v4();
        let selected = RecipientPolicy::ExcludeSender.select(sender, &[sender, other]);
        assert_eq!(selected, vec![other]);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("include_sender".parse::<RecipientPolicy>(), Ok(RecipientPolicy::IncludeSender));
        assert_eq!(" EXCLUDE_SENDER ".parse::<RecipientPolicy>(), Ok(RecipientPolicy::ExcludeSender));
        assert!("everyone".parse::<RecipientPolicy>().is_err());
        assert_eq!(RecipientPolicy::default(), RecipientPolicy::IncludeSender);
    }
}
