use tokio::sync::broadcast;
use uuid::Uuid;

use crate::message::message_models::MessageResponse;

/// Emitted once per committed message.
#[derive(Debug, Clone)]
pub struct MessageCreated {
    pub message: MessageResponse,
    /// Users that received a recipient row for the message.
    pub recipient_ids: Vec<Uuid>,
}

impl MessageCreated {
    /// Everyone who should see the event: the recipients plus the sender.
    pub fn audience(&self) -> Vec<Uuid> {
        let mut users = self.recipient_ids.clone();
        if let Some(sender_id) = self.message.user_id {
            if !users.contains(&sender_id) {
                users.push(sender_id);
            }
        }
        users
    }

    pub fn is_for(&self, user_id: Uuid) -> bool {
        self.message.user_id == Some(user_id) || self.recipient_ids.contains(&user_id)
    }
}

/// In-process queue between the send transaction and the real-time transports.
///
/// Publishing never blocks and never fails the caller: with no subscribers the
/// event is dropped, and a slow subscriber loses the oldest events.
#[derive(Clone)]
pub struct MessagePublisher {
    tx: broadcast::Sender<MessageCreated>,
}

impl MessagePublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns how many subscribers the event was queued for.
    pub fn publish(&self, event: MessageCreated) -> usize {
        let message_id = event.message.id;
        match self.tx.send(event) {
            Ok(receivers) => {
                tracing::debug!(message_id = %message_id, receivers, "Published message event");
                receivers
            }
            Err(_) => {
                tracing::debug!(message_id = %message_id, "No subscribers for message event");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessageCreated> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::message::message_models::{Message, MessageResponse};
    use chrono::Utc;

    pub(crate) fn event(sender: Option<Uuid>, recipients: Vec<Uuid>) -> MessageCreated {
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            user_id: sender,
            body: "hi".to_string(),
            created_at: now,
            updated_at: now,
        };
        MessageCreated {
            message: MessageResponse::new(message, Some("Alice".to_string())),
            recipient_ids: recipients,
        }
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let publisher = MessagePublisher::new(8);
        assert_eq!(publisher.publish(event(None, vec![])), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_event() {
        let publisher = MessagePublisher::new(8);
        let mut rx = publisher.subscribe();
        let sent = event(Some(Uuid::new_v4()), vec![]);
        let id = sent.message.id;

        assert_eq!(publisher.publish(sent), 1);
        assert_eq!(rx.recv().await.unwrap().message.id, id);
    }

    #[test]
    fn test_audience_includes_sender_once() {
        let sender = Uuid::new_v4();
        let other = Uuid::new_v4();

        let included = event(Some(sender), vec![sender, other]);
        assert_eq!(included.audience(), vec![sender, other]);

        let excluded = event(Some(sender), vec![other]);
        assert_eq!(excluded.audience(), vec![other, sender]);
        assert!(excluded.is_for(sender));
        assert!(!excluded.is_for(Uuid::new_v4()));
    }
}
