use tokio::sync::broadcast::{self, error::RecvError};

use crate::websocket::{types::WsMessage, ConnectionManager};
use super::notification_publisher::MessageCreated;

/// Drains published events and pushes them to every connected session of the audience.
/// Returns once the publisher is dropped.
pub async fn start_notification_service(
    mut rx: broadcast::Receiver<MessageCreated>,
    connections: ConnectionManager,
) {
    tracing::info!("Notification dispatcher started");

    loop {
        match rx.recv().await {
            Ok(event) => {
                let frame = WsMessage::MessageCreated(event.message.clone());
                let mut delivered = 0;
                for user_id in event.audience() {
                    delivered += connections.send_to_user(&user_id, frame.clone());
                }
                tracing::debug!(
                    message_id = %event.message.id,
                    conversation_id = %event.message.conversation_id,
                    delivered,
                    "Dispatched message event"
                );
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notification dispatcher lagged; events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }

    tracing::info!("Notification dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::notification_publisher::{tests::event, MessagePublisher};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_dispatches_to_recipient_sessions_only() {
        let publisher = MessagePublisher::new(8);
        let connections = ConnectionManager::new();

        let recipient = Uuid::new_v4();
        let bystander = Uuid::new_v4();
        let (recipient_tx, mut recipient_rx) = mpsc::unbounded_channel();
        let (bystander_tx, mut bystander_rx) = mpsc::unbounded_channel();
        connections.add_connection(recipient, recipient_tx);
        connections.add_connection(bystander, bystander_tx);

        let rx = publisher.subscribe();
        let handle = tokio::spawn(start_notification_service(rx, connections.clone()));

        let sent = event(None, vec![recipient]);
        let id = sent.message.id;
        publisher.publish(sent);

        match recipient_rx.recv().await {
            Some(WsMessage::MessageCreated(message)) => assert_eq!(message.id, id),
            other => panic!("unexpected frame: {:?}", other),
        }

        drop(publisher);
        handle.await.unwrap();
        assert!(bystander_rx.try_recv().is_err());
    }
}
