use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use crate::conversation::conversation_repository::ConversationRepository;
use crate::conversation::conversation_resolver::{
    ConversationResolver, SendTarget, DANGLING_REFERENCE,
};
use crate::error::{AppError, Result};
use crate::message::message_dto::{PaginatedResponse, SendMessageRequest, MESSAGES_PER_PAGE};
use crate::message::message_models::{MessageResponse, Recipient, RecipientPolicy};
use crate::message::message_repository::MessageRepository;
use crate::notification::{MessageCreated, MessagePublisher};
use crate::user::UserRepository;

#[derive(Clone)]
pub struct MessageService {
    pool: PgPool,
    repo: MessageRepository,
    conversations: ConversationRepository,
    resolver: ConversationResolver,
    users: UserRepository,
    publisher: MessagePublisher,
    policy: RecipientPolicy,
}

impl MessageService {
    pub fn new(
        pool: PgPool,
        repo: MessageRepository,
        conversations: ConversationRepository,
        users: UserRepository,
        publisher: MessagePublisher,
        policy: RecipientPolicy,
    ) -> Self {
        Self {
            pool,
            repo,
            resolver: ConversationResolver::new(conversations.clone()),
            conversations,
            users,
            publisher,
            policy,
        }
    }

    /// Sends `payload` as `sender_id`.
    ///
    /// Validation and reference checks run before any write. The rest runs on a
    /// spawned task: resolve the conversation, insert the message, fan out
    /// recipients and move the last-message pointer in one transaction, then
    /// publish. Dropping the returned future (client gone) does not interrupt
    /// that task, so the transaction always ends in commit or rollback.
    pub async fn send_message(
        &self,
        sender_id: Uuid,
        payload: SendMessageRequest,
    ) -> Result<MessageResponse> {
        payload.validate()?;
        let target = payload.target()?;
        self.check_references(target).await?;

        let service = self.clone();
        let body = payload.body;
        tokio::spawn(async move {
            let event = service.send_transaction(sender_id, target, &body).await?;
            let message = event.message.clone();
            service.publisher.publish(event);
            Ok::<_, AppError>(message)
        })
        .await
        .map_err(|e| AppError::Internal(format!("send task aborted: {}", e)))?
    }

    async fn check_references(&self, target: SendTarget) -> Result<()> {
        let exists = match target {
            SendTarget::Conversation(id) => self.conversations.exists(id).await?,
            SendTarget::Peer(id) => self.users.exists(id).await?,
        };
        if !exists {
            let field = match target {
                SendTarget::Conversation(_) => "conversation_id",
                SendTarget::Peer(_) => "user_id",
            };
            return Err(AppError::field(field, DANGLING_REFERENCE));
        }
        Ok(())
    }

    /// Runs the write path and commits. Nothing is published from here.
    pub(crate) async fn send_transaction(
        &self,
        sender_id: Uuid,
        target: SendTarget,
        body: &str,
    ) -> Result<MessageCreated> {
        let mut tx = self.pool.begin().await?;

        match self.write_message(&mut tx, sender_id, target, body).await {
            Ok(event) => {
                tx.commit().await?;
                tracing::info!(
                    message_id = %event.message.id,
                    conversation_id = %event.message.conversation_id,
                    sender_id = %sender_id,
                    recipients = event.recipient_ids.len(),
                    "Message sent"
                );
                Ok(event)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback failed after send error: {}", rollback_err);
                }
                tracing::warn!(sender_id = %sender_id, "Send rolled back: {}", e);
                Err(e)
            }
        }
    }

    async fn write_message(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        sender_id: Uuid,
        target: SendTarget,
        body: &str,
    ) -> Result<MessageCreated> {
        let conversation = self.resolver.resolve(tx, sender_id, target).await?;

        let created = self
            .repo
            .create_with_tx(tx, conversation.id, sender_id, body)
            .await?;
        let message_id = created.message.id;

        let participants = self
            .conversations
            .participant_ids_with_tx(tx, conversation.id)
            .await?;
        let recipient_ids = self.policy.select(sender_id, &participants);
        let inserted = self.repo.fan_out_with_tx(tx, message_id, &recipient_ids).await?;
        if inserted != recipient_ids.len() as u64 {
            return Err(AppError::Internal(format!(
                "fan-out for message {} inserted {} of {} recipients",
                message_id,
                inserted,
                recipient_ids.len()
            )));
        }

        self.conversations
            .set_last_message_with_tx(tx, conversation.id, message_id)
            .await?;

        Ok(MessageCreated {
            message: created.into(),
            recipient_ids,
        })
    }

    pub async fn get_conversation_messages(
        &self,
        user_id: Uuid,
        conversation_id: Uuid,
        page: u32,
    ) -> Result<PaginatedResponse<MessageResponse>> {
        self.conversations
            .find_for_participant(conversation_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        let limit = MESSAGES_PER_PAGE;
        let offset = (page.saturating_sub(1) as i64) * limit as i64;

        let messages = self
            .repo
            .find_conversation_messages(conversation_id, user_id, limit as i64, offset)
            .await?;
        let total = self
            .repo
            .count_conversation_messages(conversation_id, user_id)
            .await?;

        let data = messages.into_iter().map(MessageResponse::from).collect();
        Ok(PaginatedResponse::new(data, total, page, limit))
    }

    /// Hides `message_id` from `user_id`'s view only. Succeeds even if there was nothing to hide.
    pub async fn remove_for_recipient(&self, user_id: Uuid, message_id: Uuid) -> Result<()> {
        let affected = self.repo.remove_for_recipient(user_id, message_id).await?;
        tracing::debug!(
            user_id = %user_id,
            message_id = %message_id,
            affected,
            "Removed message for recipient"
        );
        Ok(())
    }

    pub async fn mark_read(&self, user_id: Uuid, message_id: Uuid) -> Result<Recipient> {
        self.repo
            .mark_as_read(user_id, message_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Message not found".to_string()))
    }

    pub async fn mark_conversation_read(&self, user_id: Uuid, conversation_id: Uuid) -> Result<u64> {
        self.conversations
            .find_for_participant(conversation_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))?;

        self.repo.mark_conversation_as_read(user_id, conversation_id).await
    }
}
