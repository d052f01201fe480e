use chrono::Utc;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, Result};
use super::{
    conversation_models::{Conversation, ConversationKind, ParticipantRole},
    conversation_repository::ConversationRepository,
};

/// Reported when a send names a conversation or user that does not exist.
pub const DANGLING_REFERENCE: &str = "conversation_id/user_id must reference existing rows";

/// Where a message goes: an existing conversation, or the peer conversation with a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendTarget {
    Conversation(Uuid),
    Peer(Uuid),
}

/// Advisory lock key for the unordered pair `{a, b}`.
pub fn peer_lock_key(a: Uuid, b: Uuid) -> String {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    format!("peer:{}:{}", low, high)
}

/// Finds or creates the conversation a message is sent into.
///
/// Always runs inside the caller's transaction. Peer creation is serialised per
/// user pair with `pg_advisory_xact_lock`, so two first-contact sends between the
/// same users cannot both miss the lookup and create two conversations: the
/// second one blocks on the lock and then finds the conversation the first one
/// committed.
#[derive(Clone)]
pub struct ConversationResolver {
    repo: ConversationRepository,
}

impl ConversationResolver {
    pub fn new(repo: ConversationRepository) -> Self {
        Self { repo }
    }

    pub async fn resolve(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sender_id: Uuid,
        target: SendTarget,
    ) -> Result<Conversation> {
        match target {
            SendTarget::Conversation(conversation_id) => self
                .repo
                .find_for_participant_with_tx(tx, conversation_id, sender_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Conversation not found".to_string())),
            SendTarget::Peer(user_id) => self.resolve_peer(tx, sender_id, user_id).await,
        }
    }

    async fn resolve_peer(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sender_id: Uuid,
        user_id: Uuid,
    ) -> Result<Conversation> {
        if sender_id == user_id {
            return Err(AppError::field("user_id", "cannot start a conversation with yourself"));
        }

        self.repo
            .lock_key_with_tx(tx, &peer_lock_key(sender_id, user_id))
            .await?;

        if let Some(conversation) = self.repo.find_peer_with_tx(tx, sender_id, user_id).await? {
            tracing::debug!(conversation_id = %conversation.id, "Reusing peer conversation");
            return Ok(conversation);
        }

        let conversation = self
            .repo
            .create_with_tx(tx, sender_id, ConversationKind::Peer, None)
            .await?;
        self.repo
            .attach_with_tx(
                tx,
                conversation.id,
                &[sender_id, user_id],
                ParticipantRole::Member,
                Utc::now(),
            )
            .await
            .map_err(|e| {
                // The target user was deleted after the request was checked
                if e.is_foreign_key_violation() {
                    AppError::field("user_id", DANGLING_REFERENCE)
                } else {
                    e
                }
            })?;

        tracing::info!(
            conversation_id = %conversation.id,
            sender_id = %sender_id,
            user_id = %user_id,
            "Created peer conversation"
        );

        Ok(conversation)
    }
}
