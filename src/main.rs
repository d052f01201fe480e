mod auth;
mod conversation;
mod db;
mod error;
mod message;
mod middleware;
mod notification;
mod routes;
mod state;
mod user;
mod websocket;

use anyhow::Context;
use conversation::{ConversationRepository, ConversationService};
use db::{create_pool, redact_database_url, run_migrations};
use message::{MessageRepository, MessageService};
use notification::{start_notification_service, MessagePublisher};
use routes::create_router;
use state::{AppState, Config};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user::UserRepository;
use websocket::ConnectionManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chat_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let url_for_logging = redact_database_url(&config.database_url);

    tracing::info!("Connecting to database at {}...", url_for_logging);
    let db = create_pool(&config.database_url, config.database_max_connections)
        .await
        .with_context(|| format!("failed to connect to database at {}", url_for_logging))?;

    tracing::info!("Running migrations...");
    run_migrations(&db).await.context("failed to run migrations")?;

    let publisher = MessagePublisher::new(config.event_buffer);
    let ws_connections = ConnectionManager::new();

    // Subscribe before serving so no committed message is missed
    let dispatcher = tokio::spawn(start_notification_service(
        publisher.subscribe(),
        ws_connections.clone(),
    ));

    // Create repositories
    let user_repository = UserRepository::new(db.clone());
    let conversation_repository = ConversationRepository::new(db.clone());
    let message_repository = MessageRepository::new(db.clone());

    // Create services
    let message_service = MessageService::new(
        db.clone(),
        message_repository.clone(),
        conversation_repository.clone(),
        user_repository.clone(),
        publisher.clone(),
        config.recipient_policy,
    );
    let conversation_service = ConversationService::new(
        db.clone(),
        conversation_repository,
        message_repository,
        user_repository.clone(),
    );

    tracing::info!(policy = %config.recipient_policy, "Recipient policy");

    let state = AppState {
        config: config.clone(),
        ws_connections,
        publisher,
        user_repository,
        message_service,
        conversation_service,
    };

    let app = create_router(state);

    let addr = config.addr();
    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    dispatcher.abort();
    Ok(())
}
