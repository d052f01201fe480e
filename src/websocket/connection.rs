use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::types::WsMessage;

pub type WsSender = mpsc::UnboundedSender<WsMessage>;

/// Live websocket sessions, keyed by user. A user may hold several sessions.
#[derive(Clone, Default)]
pub struct ConnectionManager {
    connections: Arc<DashMap<Uuid, Vec<(Uuid, WsSender)>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session and returns its id, needed to remove it later.
    pub fn add_connection(&self, user_id: Uuid, tx: WsSender) -> Uuid {
        let connection_id = Uuid::new_v4();
        self.connections
            .entry(user_id)
            .or_default()
            .push((connection_id, tx));
        tracing::debug!(user_id = %user_id, connection_id = %connection_id, "Connection registered");
        connection_id
    }

    pub fn remove_connection(&self, user_id: &Uuid, connection_id: Uuid) {
        if let Some(mut sessions) = self.connections.get_mut(user_id) {
            sessions.retain(|(id, _)| *id != connection_id);
        }
        self.connections.remove_if(user_id, |_, sessions| sessions.is_empty());
    }

    /// Queues `message` on every session of `user_id`; closed sessions are pruned.
    /// Returns the number of sessions reached.
    pub fn send_to_user(&self, user_id: &Uuid, message: WsMessage) -> usize {
        let delivered = match self.connections.get_mut(user_id) {
            Some(mut sessions) => {
                sessions.retain(|(_, tx)| tx.send(message.clone()).is_ok());
                sessions.len()
            }
            None => 0,
        };
        if delivered == 0 {
            self.connections.remove_if(user_id, |_, sessions| sessions.is_empty());
        }
        delivered
    }

    pub fn is_online(&self, user_id: &Uuid) -> bool {
        self.connections
            .get(user_id)
            .map(|sessions| !sessions.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_reaches_every_session() {
        let manager = ConnectionManager::new();
        let user = Uuid::new_v4();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        manager.add_connection(user, tx1);
        manager.add_connection(user, tx2);

        assert_eq!(manager.send_to_user(&user, WsMessage::Ping), 2);
        assert!(matches!(rx1.try_recv(), Ok(WsMessage::Ping)));
        assert!(matches!(rx2.try_recv(), Ok(WsMessage::Ping)));
    }

    #[test]
    fn test_closed_sessions_are_pruned() {
        let manager = ConnectionManager::new();
        let user = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        manager.add_connection(user, tx);
        drop(rx);

        assert_eq!(manager.send_to_user(&user, WsMessage::Ping), 0);
        assert!(!manager.is_online(&user));
    }

    #[test]
    fn test_remove_connection_keeps_other_sessions() {
        let manager = ConnectionManager::new();
        let user = Uuid::new_v4();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, _rx2) = mpsc::unbounded_channel();
        let first = manager.add_connection(user, tx1);
        let second = manager.add_connection(user, tx2);

        manager.remove_connection(&user, first);
        assert!(manager.is_online(&user));
        manager.remove_connection(&user, second);
        assert!(!manager.is_online(&user));
    }

    #[test]
    fn test_unknown_user_gets_nothing() {
        let manager = ConnectionManager::new();
        assert_eq!(manager.send_to_user(&Uuid::new_v4(), WsMessage::Ping), 0);
    }
}
