use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::{AppError, Result};
use super::conversation_models::{
    Conversation, ConversationKind, ConversationListRow, Participant, ParticipantInfo,
    ParticipantRole,
};

#[derive(Clone)]
pub struct ConversationRepository {
    pool: PgPool,
}

impl ConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // -- Send transaction --

    /// Conversation `conversation_id` if `user_id` participates in it, locked
    /// until the surrounding transaction ends.
    pub async fn find_for_participant_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT c.* FROM conversations c
             INNER JOIN participants p ON p.conversation_id = c.id AND p.user_id = $2
             WHERE c.id = $1
             FOR UPDATE OF c",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(conversation)
    }

    /// Takes the transaction-scoped advisory lock for `key`. Released on commit or rollback.
    pub async fn lock_key_with_tx(&self, tx: &mut Transaction<'_, Postgres>, key: &str) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key)
            .execute(&mut **tx)
            .await?;

        Ok(())
    }

    /// The peer conversation whose participants are exactly `{user_a, user_b}`,
    /// matched in either order. Locked like `find_for_participant_with_tx`.
    pub async fn find_peer_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        user_a: Uuid,
        user_b: Uuid,
    ) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT c.* FROM conversations c
             INNER JOIN participants p1 ON p1.conversation_id = c.id AND p1.user_id = $1
             INNER JOIN participants p2 ON p2.conversation_id = c.id AND p2.user_id = $2
             WHERE c.type = 'peer'
               AND (SELECT COUNT(*) FROM participants p3 WHERE p3.conversation_id = c.id) = 2
             ORDER BY c.created_at ASC
             LIMIT 1
             FOR UPDATE OF c",
        )
        .bind(user_a)
        .bind(user_b)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(conversation)
    }

    pub async fn create_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        creator_id: Uuid,
        kind: ConversationKind,
        label: Option<&str>,
    ) -> Result<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (user_id, type, label)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(creator_id)
        .bind(kind)
        .bind(label)
        .fetch_one(&mut **tx)
        .await?;

        Ok(conversation)
    }

    /// Attaches `user_ids` with one shared `role` and `joined_at`.
    pub async fn attach_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        user_ids: &[Uuid],
        role: ParticipantRole,
        joined_at: DateTime<Utc>,
    ) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO participants (conversation_id, user_id, role, joined_at)
             SELECT $1, ids.user_id, $3, $4
             FROM UNNEST($2::uuid[]) AS ids(user_id)",
        )
        .bind(conversation_id)
        .bind(user_ids)
        .bind(role)
        .bind(joined_at)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Participant snapshot as seen by the transaction.
    pub async fn participant_ids_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
    ) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM participants
             WHERE conversation_id = $1
             ORDER BY joined_at ASC, user_id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&mut **tx)
        .await?;

        Ok(ids)
    }

    /// Points the conversation at `message_id`, which must belong to it.
    pub async fn set_last_message_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE conversations
             SET last_message_id = $2, updated_at = NOW()
             WHERE id = $1
               AND EXISTS (SELECT 1 FROM messages WHERE id = $2 AND conversation_id = $1)",
        )
        .bind(conversation_id)
        .bind(message_id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(AppError::Internal(format!(
                "last message pointer of conversation {} not updated",
                conversation_id
            )));
        }

        Ok(())
    }

    // -- Directory --

    pub async fn exists(&self, conversation_id: Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM conversations WHERE id = $1)")
            .bind(conversation_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    pub async fn find_for_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT c.* FROM conversations c
             INNER JOIN participants p ON p.conversation_id = c.id AND p.user_id = $2
             WHERE c.id = $1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// The caller's conversations, most recent last message first.
    pub async fn find_user_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationListRow>> {
        let rows = sqlx::query_as::<_, ConversationListRow>(
            "SELECT c.*,
                    (SELECT COUNT(*) FROM recipients r
                     INNER JOIN messages m ON m.id = r.message_id
                     WHERE m.conversation_id = c.id
                       AND r.user_id = $1
                       AND r.read_at IS NULL
                       AND r.deleted_at IS NULL
                       AND m.user_id IS DISTINCT FROM $1) AS unread_count
             FROM conversations c
             INNER JOIN participants p ON p.conversation_id = c.id AND p.user_id = $1
             LEFT JOIN messages lm ON lm.id = c.last_message_id
             ORDER BY lm.created_at DESC NULLS LAST, c.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn count_unread(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM recipients r
             INNER JOIN messages m ON m.id = r.message_id
             WHERE m.conversation_id = $1
               AND r.user_id = $2
               AND r.read_at IS NULL
               AND r.deleted_at IS NULL
               AND m.user_id IS DISTINCT FROM $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Participants of every conversation in `conversation_ids`, keyed by conversation.
    pub async fn find_participants(
        &self,
        conversation_ids: &[Uuid],
    ) -> Result<Vec<(Uuid, ParticipantInfo)>> {
        let rows = sqlx::query_as::<_, (Uuid, Uuid, String, ParticipantRole, DateTime<Utc>)>(
            "SELECT p.conversation_id, p.user_id, u.name, p.role, p.joined_at
             FROM participants p
             INNER JOIN users u ON u.id = p.user_id
             WHERE p.conversation_id = ANY($1)
             ORDER BY p.joined_at ASC, u.name ASC",
        )
        .bind(conversation_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(conversation_id, user_id, name, role, joined_at)| {
                (
                    conversation_id,
                    ParticipantInfo {
                        user_id,
                        name,
                        role,
                        joined_at,
                    },
                )
            })
            .collect())
    }

    pub async fn find_role(&self, conversation_id: Uuid, user_id: Uuid) -> Result<Option<ParticipantRole>> {
        let role: Option<ParticipantRole> = sqlx::query_scalar(
            "SELECT role FROM participants WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role)
    }

    pub async fn add_participant(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: ParticipantRole,
    ) -> Result<Participant> {
        let participant = sqlx::query_as::<_, Participant>(
            "INSERT INTO participants (conversation_id, user_id, role, joined_at)
             VALUES ($1, $2, $3, NOW())
             RETURNING *",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;

        Ok(participant)
    }

    pub async fn remove_participant(&self, conversation_id: Uuid, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM participants WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
