use crate::{
    error::Result,
    message::message_models::{MessageWithSender, Recipient},
};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const SELECT_WITH_SENDER: &str = "SELECT m.*, u.name AS sender_name
     FROM messages m
     LEFT JOIN users u ON u.id = m.user_id";

// Hides messages the viewer ($2) removed from their own view.
const VISIBLE_TO_VIEWER: &str = "NOT EXISTS (
         SELECT 1 FROM recipients r
         WHERE r.message_id = m.id AND r.user_id = $2 AND r.deleted_at IS NOT NULL
     )";

#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        conversation_id: Uuid,
        sender_id: Uuid,
        body: &str,
    ) -> Result<MessageWithSender> {
        let message = sqlx::query_as::<_, MessageWithSender>(
            "WITH inserted AS (
                INSERT INTO messages (conversation_id, user_id, body)
                VALUES ($1, $2, $3)
                RETURNING *
             )
             SELECT inserted.*, u.name AS sender_name
             FROM inserted
             LEFT JOIN users u ON u.id = inserted.user_id",
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(body)
        .fetch_one(&mut **tx)
        .await?;

        Ok(message)
    }

    /// Inserts one recipient row per user in a single statement.
    pub async fn fan_out_with_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        message_id: Uuid,
        user_ids: &[Uuid],
    ) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO recipients (message_id, user_id)
             SELECT $1, ids.user_id
             FROM UNNEST($2::uuid[]) AS ids(user_id)",
        )
        .bind(message_id)
        .bind(user_ids)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn find_many_with_sender(&self, message_ids: &[Uuid]) -> Result<Vec<MessageWithSender>> {
        let messages = sqlx::query_as::<_, MessageWithSender>(&format!(
            "{} WHERE m.id = ANY($1)",
            SELECT_WITH_SENDER
        ))
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    pub async fn find_conversation_messages(
        &self,
        conversation_id: Uuid,
        viewer_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageWithSender>> {
        let messages = sqlx::query_as::<_, MessageWithSender>(&format!(
            "{} WHERE m.conversation_id = $1 AND {}
             ORDER BY m.created_at DESC, m.id DESC
             LIMIT $3 OFFSET $4",
            SELECT_WITH_SENDER, VISIBLE_TO_VIEWER
        ))
        .bind(conversation_id)
        .bind(viewer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    pub async fn count_conversation_messages(&self, conversation_id: Uuid, viewer_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM messages m WHERE m.conversation_id = $1 AND {}",
            VISIBLE_TO_VIEWER
        ))
        .bind(conversation_id)
        .bind(viewer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Soft-deletes the caller's copy. The first deletion time is kept.
    ///
    /// A caller without a recipient row (the sender under `exclude_sender`, or a
    /// member who joined later) gets one created already deleted, so the message
    /// leaves their history too. Messages the caller cannot see are left alone.
    pub async fn remove_for_recipient(&self, user_id: Uuid, message_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "INSERT INTO recipients (message_id, user_id, deleted_at)
             SELECT m.id, $1, NOW()
             FROM messages m
             WHERE m.id = $2
               AND (
                   m.user_id = $1
                   OR EXISTS (SELECT 1 FROM participants p
                              WHERE p.conversation_id = m.conversation_id AND p.user_id = $1)
                   OR EXISTS (SELECT 1 FROM recipients r
                              WHERE r.message_id = m.id AND r.user_id = $1)
               )
             ON CONFLICT (message_id, user_id)
             DO UPDATE SET deleted_at = COALESCE(recipients.deleted_at, EXCLUDED.deleted_at)",
        )
        .bind(user_id)
        .bind(message_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn mark_as_read(&self, user_id: Uuid, message_id: Uuid) -> Result<Option<Recipient>> {
        let recipient = sqlx::query_as::<_, Recipient>(
            "UPDATE recipients
             SET read_at = COALESCE(read_at, NOW())
             WHERE user_id = $1 AND message_id = $2
             RETURNING *",
        )
        .bind(user_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(recipient)
    }

    pub async fn mark_conversation_as_read(&self, user_id: Uuid, conversation_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE recipients r
             SET read_at = NOW()
             FROM messages m
             WHERE m.id = r.message_id
               AND m.conversation_id = $2
               AND r.user_id = $1
               AND r.read_at IS NULL",
        )
        .bind(user_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
