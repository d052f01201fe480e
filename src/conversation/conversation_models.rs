use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::message::message_models::MessageResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "conversation_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Peer,
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "participant_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Admin,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Conversation {
    pub id: Uuid,
    /// Creator of the conversation.
    pub user_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub label: Option<String>,
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Participant {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
}

/// Participant joined with the user's display name.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ParticipantInfo {
    pub user_id: Uuid,
    pub name: String,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
}

/// Row shape for the caller's conversation list.
#[derive(Debug, Clone, FromRow)]
pub struct ConversationListRow {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    #[sqlx(rename = "type")]
    pub kind: ConversationKind,
    pub label: Option<String>,
    pub last_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub unread_count: i64,
}

impl ConversationListRow {
    pub fn into_parts(self) -> (Conversation, i64) {
        let conversation = Conversation {
            id: self.id,
            user_id: self.user_id,
            kind: self.kind,
            label: self.label,
            last_message_id: self.last_message_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        (conversation, self.unread_count)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConversationResponse {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub user_id: Option<Uuid>,
    pub label: Option<String>,
    pub last_message_id: Option<Uuid>,
    pub participants: Vec<ParticipantInfo>,
    pub last_message: Option<MessageResponse>,
    pub unread_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationResponse {
    pub fn new(
        conversation: Conversation,
        participants: Vec<ParticipantInfo>,
        last_message: Option<MessageResponse>,
        unread_count: i64,
    ) -> Self {
        Self {
            id: conversation.id,
            kind: conversation.kind,
            user_id: conversation.user_id,
            label: conversation.label,
            last_message_id: conversation.last_message_id,
            participants,
            last_message,
            unread_count,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ConversationKind::Peer).unwrap();
        assert_eq!(json, "\"peer\"");
    }
}
