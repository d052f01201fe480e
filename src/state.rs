use anyhow::Context;
use std::sync::Arc;

use crate::{
    conversation::ConversationService,
    message::{message_models::RecipientPolicy, MessageService},
    notification::MessagePublisher,
    user::UserRepository,
    websocket::ConnectionManager,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ws_connections: ConnectionManager,
    pub publisher: MessagePublisher,
    pub user_repository: UserRepository,
    pub message_service: MessageService,
    pub conversation_service: ConversationService,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub host: String,
    pub port: u16,
    pub database_max_connections: u32,
    pub recipient_policy: RecipientPolicy,
    pub cors_origins: Vec<String>,
    pub event_buffer: usize,
}

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{} must be set", key));
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            host: or_default("HOST", "127.0.0.1"),
            port: or_default("PORT", "3000")
                .parse()
                .context("PORT must be a port number")?,
            database_max_connections: or_default("DATABASE_MAX_CONNECTIONS", "10")
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a number")?,
            recipient_policy: or_default("RECIPIENT_POLICY", "include_sender")
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))
                .context("RECIPIENT_POLICY is invalid")?,
            cors_origins: or_default("CORS_ORIGINS", DEFAULT_CORS_ORIGINS)
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect(),
            event_buffer: or_default("EVENT_BUFFER", "256")
                .parse()
                .context("EVENT_BUFFER must be a number")?,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    const BASE: [(&str, &str); 2] = [
        ("DATABASE_URL", "postgres://localhost/chat"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn test_defaults() {
        let config = config(&BASE).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:3000");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.recipient_policy, RecipientPolicy::IncludeSender);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.event_buffer, 256);
    }

    #[test]
    fn test_missing_secret_fails() {
        let err = config(&[("DATABASE_URL", "postgres://localhost/chat")]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn test_overrides() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("PORT", "8080"),
            ("RECIPIENT_POLICY", "exclude_sender"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]);
        let config = config(&vars).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.recipient_policy, RecipientPolicy::ExcludeSender);
        assert_eq!(config.cors_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_invalid_port_fails() {
        let mut vars = BASE.to_vec();
        vars.push(("PORT", "not-a-port"));
        assert!(config(&vars).is_err());
    }
}
