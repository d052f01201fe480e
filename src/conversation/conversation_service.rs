use std::collections::HashMap;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::message::message_models::MessageResponse;
use crate::message::MessageRepository;
use crate::user::UserRepository;
use super::{
    conversation_models::{
        Conversation, ConversationKind, ConversationResponse, Participant, ParticipantInfo,
        ParticipantRole,
    },
    conversation_repository::ConversationRepository,
};

const PEER_MEMBERSHIP_FIXED: &str = "peer conversations have exactly two participants";

/// Members of a new group besides its creator: duplicates and the creator removed,
/// first occurrence order kept.
fn group_members(creator_id: Uuid, user_ids: &[Uuid]) -> Vec<Uuid> {
    let mut members: Vec<Uuid> = Vec::with_capacity(user_ids.len());
    for id in user_ids {
        if *id != creator_id && !members.contains(id) {
            members.push(*id);
        }
    }
    members
}

#[derive(Clone)]
pub struct ConversationService {
    pool: PgPool,
    repo: ConversationRepository,
    messages: MessageRepository,
    users: UserRepository,
}

impl ConversationService {
    pub fn new(
        pool: PgPool,
        repo: ConversationRepository,
        messages: MessageRepository,
        users: UserRepository,
    ) -> Self {
        Self {
            pool,
            repo,
            messages,
            users,
        }
    }

    pub async fn list_conversations(&self, user_id: Uuid) -> Result<Vec<ConversationResponse>> {
        let rows = self.repo.find_user_conversations(user_id).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let last_ids: Vec<Uuid> = rows.iter().filter_map(|row| row.last_message_id).collect();

        let mut participants: HashMap<Uuid, Vec<ParticipantInfo>> = HashMap::new();
        for (conversation_id, info) in self.repo.find_participants(&ids).await? {
            participants.entry(conversation_id).or_default().push(info);
        }

        let mut last_messages: HashMap<Uuid, MessageResponse> = self
            .messages
            .find_many_with_sender(&last_ids)
            .await?
            .into_iter()
            .map(|m| (m.message.id, MessageResponse::from(m)))
            .collect();

        Ok(rows
            .into_iter()
            .map(|row| {
                let (conversation, unread) = row.into_parts();
                let last = conversation
                    .last_message_id
                    .and_then(|id| last_messages.remove(&id));
                let members = participants.remove(&conversation.id).unwrap_or_default();
                ConversationResponse::new(conversation, members, last, unread)
            })
            .collect())
    }

    pub async fn get_conversation(&self, user_id: Uuid, conversation_id: Uuid) -> Result<ConversationResponse> {
        let conversation = self.find_visible(user_id, conversation_id).await?;
        self.build_response(user_id, conversation).await
    }

    pub async fn create_group(
        &self,
        creator_id: Uuid,
        label: Option<String>,
        user_ids: Vec<Uuid>,
    ) -> Result<ConversationResponse> {
        let members = group_members(creator_id, &user_ids);
        if members.is_empty() {
            return Err(AppError::field("user_ids", "at least one other user required"));
        }

        let existing = self.users.existing_ids(&members).await?;
        if existing.len() != members.len() {
            return Err(AppError::field("user_ids", "user_ids must reference existing users"));
        }

        let joined_at = Utc::now();
        let mut tx = self.pool.begin().await?;
        let conversation = self
            .repo
            .create_with_tx(&mut tx, creator_id, ConversationKind::Group, label.as_deref())
            .await?;
        self.repo
            .attach_with_tx(&mut tx, conversation.id, &[creator_id], ParticipantRole::Admin, joined_at)
            .await?;
        self.repo
            .attach_with_tx(&mut tx, conversation.id, &members, ParticipantRole::Member, joined_at)
            .await?;
        tx.commit().await?;

        tracing::info!(
            conversation_id = %conversation.id,
            creator_id = %creator_id,
            members = members.len(),
            "Created group conversation"
        );

        self.build_response(creator_id, conversation).await
    }

    pub async fn add_participant(
        &self,
        actor_id: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Participant> {
        let conversation = self.find_visible(actor_id, conversation_id).await?;
        if conversation.kind == ConversationKind::Peer {
            return Err(AppError::field("user_id", PEER_MEMBERSHIP_FIXED));
        }
        if self.repo.find_role(conversation_id, actor_id).await? != Some(ParticipantRole::Admin) {
            return Err(AppError::Forbidden(
                "Only conversation admins can add participants".to_string(),
            ));
        }
        if !self.users.exists(user_id).await? {
            return Err(AppError::field("user_id", "user_id must reference an existing user"));
        }

        let participant = self
            .repo
            .add_participant(conversation_id, user_id, ParticipantRole::Member)
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => AppError::Conflict("User is already a participant".to_string()),
                other => other,
            })?;

        tracing::info!(
            conversation_id = %conversation_id,
            actor_id = %actor_id,
            user_id = %user_id,
            "Participant added"
        );

        Ok(participant)
    }

    pub async fn remove_participant(&self, actor_id: Uuid, conversation_id: Uuid, user_id: Uuid) -> Result<()> {
        let conversation = self.find_visible(actor_id, conversation_id).await?;
        if conversation.kind == ConversationKind::Peer {
            return Err(AppError::field("user_id", PEER_MEMBERSHIP_FIXED));
        }
        if actor_id != user_id
            && self.repo.find_role(conversation_id, actor_id).await? != Some(ParticipantRole::Admin)
        {
            return Err(AppError::Forbidden(
                "Only conversation admins can remove other participants".to_string(),
            ));
        }

        if self.repo.remove_participant(conversation_id, user_id).await? == 0 {
            return Err(AppError::NotFound("Participant not found".to_string()));
        }

        tracing::info!(
            conversation_id = %conversation_id,
            actor_id = %actor_id,
            user_id = %user_id,
            "Participant removed"
        );

        Ok(())
    }

    async fn find_visible(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Conversation> {
        self.repo
            .find_for_participant(conversation_id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Conversation not found".to_string()))
    }

    async fn build_response(&self, user_id: Uuid, conversation: Conversation) -> Result<ConversationResponse> {
        let participants = self
            .repo
            .find_participants(&[conversation.id])
            .await?
            .into_iter()
            .map(|(_, info)| info)
            .collect();

        let last_message = match conversation.last_message_id {
            Some(id) => self
                .messages
                .find_many_with_sender(&[id])
                .await?
                .into_iter()
                .next()
                .map(MessageResponse::from),
            None => None,
        };

        let unread = self.repo.count_unread(conversation.id, user_id).await?;

        Ok(ConversationResponse::new(conversation, participants, last_message, unread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_members_drops_creator_and_duplicates() {
        let creator = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(group_members(creator, &[a, creator, b, a]), vec![a, b]);
    }

    #[test]
    fn test_group_members_only_creator_is_empty() {
        let creator = Uuid::new_v4();
        assert!(group_members(creator, &[creator, creator]).is_empty());
    }

    async fn insert_user(pool: &PgPool, name: &str) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, 'x') RETURNING id",
        )
        .bind(name)
        .bind(format!("{}-{}@example.com", name, Uuid::new_v4()))
        .fetch_one(pool)
        .await
        .unwrap()
    }

    fn service(pool: &PgPool) -> ConversationService {
        ConversationService::new(
            pool.clone(),
            ConversationRepository::new(pool.clone()),
            MessageRepository::new(pool.clone()),
            UserRepository::new(pool.clone()),
        )
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn test_create_group_makes_creator_admin(pool: PgPool) {
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let carol = insert_user(&pool, "carol").await;
        let service = service(&pool);

        let group = service
            .create_group(alice, Some("team".to_string()), vec![bob, carol, alice, bob])
            .await
            .unwrap();

        assert_eq!(group.kind, ConversationKind::Group);
        assert_eq!(group.label.as_deref(), Some("team"));
        assert_eq!(group.participants.len(), 3);
        let admins: Vec<Uuid> = group
            .participants
            .iter()
            .filter(|p| p.role == ParticipantRole::Admin)
            .map(|p| p.user_id)
            .collect();
        assert_eq!(admins, vec![alice]);
        assert!(group.last_message.is_none());
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn test_create_group_rejects_unknown_users(pool: PgPool) {
        let alice = insert_user(&pool, "alice").await;
        let service = service(&pool);

        let result = service.create_group(alice, None, vec![Uuid::new_v4()]).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        let conversations: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(conversations, 0);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn test_membership_rules(pool: PgPool) {
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let carol = insert_user(&pool, "carol").await;
        let dave = insert_user(&pool, "dave").await;
        let service = service(&pool);

        let group = service.create_group(alice, None, vec![bob]).await.unwrap();

        assert!(matches!(
            service.add_participant(bob, group.id, carol).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            service.add_participant(dave, group.id, carol).await,
            Err(AppError::NotFound(_))
        ));

        let added = service.add_participant(alice, group.id, carol).await.unwrap();
        assert_eq!(added.role, ParticipantRole::Member);
        assert!(matches!(
            service.add_participant(alice, group.id, carol).await,
            Err(AppError::Conflict(_))
        ));

        assert!(matches!(
            service.remove_participant(bob, group.id, carol).await,
            Err(AppError::Forbidden(_))
        ));
        service.remove_participant(carol, group.id, carol).await.unwrap();
        service.remove_participant(alice, group.id, bob).await.unwrap();

        let remaining = service.get_conversation(alice, group.id).await.unwrap();
        assert_eq!(remaining.participants.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "requires DATABASE_URL pointing at Postgres"]
    async fn test_list_orders_by_last_message(pool: PgPool) {
        let alice = insert_user(&pool, "alice").await;
        let bob = insert_user(&pool, "bob").await;
        let carol = insert_user(&pool, "carol").await;
        let service = service(&pool);

        let quiet = service.create_group(alice, Some("quiet".to_string()), vec![bob]).await.unwrap();
        let busy = service.create_group(alice, Some("busy".to_string()), vec![carol]).await.unwrap();

        let messages = MessageRepository::new(pool.clone());
        let conversations = ConversationRepository::new(pool.clone());
        let mut tx = pool.begin().await.unwrap();
        let created = messages.create_with_tx(&mut tx, busy.id, carol, "ping").await.unwrap();
        messages
            .fan_out_with_tx(&mut tx, created.message.id, &[alice, carol])
            .await
            .unwrap();
        conversations
            .set_last_message_with_tx(&mut tx, busy.id, created.message.id)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let list = service.list_conversations(alice).await.unwrap();

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id, busy.id);
        assert_eq!(list[0].unread_count, 1);
        assert_eq!(list[0].last_message.as_ref().map(|m| m.body.as_str()), Some("ping"));
        assert_eq!(list[1].id, quiet.id);
        assert!(list[1].last_message.is_none());
    }
}
