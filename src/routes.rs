use crate::{
    conversation::{
        conversation_dto::{CreateGroupRequest, MarkReadResponse, ParticipantRequest},
        conversation_handlers,
        conversation_models::{
            ConversationKind, ConversationResponse, Participant, ParticipantInfo, ParticipantRole,
        },
    },
    message::{
        message_dto::{SendMessageRequest, StatusResponse},
        message_handlers,
        message_models::{MessageResponse, Recipient, SenderInfo},
    },
    middleware::auth_middleware,
    state::AppState,
};
use axum::{
    middleware,
    routing::{delete, get, patch, post},
    Router,
};
use axum::http::{header::{AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::message::message_handlers::send_message,
        crate::message::message_handlers::get_conversation_messages,
        crate::message::message_handlers::remove_message,
        crate::message::message_handlers::mark_message_read,
        crate::message::message_handlers::message_stream,
        crate::conversation::conversation_handlers::get_conversations,
        crate::conversation::conversation_handlers::get_conversation,
        crate::conversation::conversation_handlers::create_group,
        crate::conversation::conversation_handlers::mark_conversation_read,
        crate::conversation::conversation_handlers::add_participant,
        crate::conversation::conversation_handlers::remove_participant,
    ),
    components(
        schemas(
            SendMessageRequest,
            StatusResponse,
            MessageResponse,
            SenderInfo,
            Recipient,
            CreateGroupRequest,
            ParticipantRequest,
            MarkReadResponse,
            ConversationKind,
            ConversationResponse,
            Participant,
            ParticipantInfo,
            ParticipantRole,
        )
    ),
    tags(
        (name = "messages", description = "Sending and reading messages"),
        (name = "conversations", description = "Conversation directory and membership")
    ),
    modifiers(&SecurityAddon)
)]
struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            )
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_origins);

    let message_routes = Router::new()
        .route("/", post(message_handlers::send_message))
        .route("/stream", get(message_handlers::message_stream))
        .route("/:id", delete(message_handlers::remove_message))
        .route("/:id/read", patch(message_handlers::mark_message_read))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let conversation_routes = Router::new()
        .route(
            "/",
            get(conversation_handlers::get_conversations).post(conversation_handlers::create_group),
        )
        .route("/:id", get(conversation_handlers::get_conversation))
        .route("/:id/messages", get(message_handlers::get_conversation_messages))
        .route("/:id/read", patch(conversation_handlers::mark_conversation_read))
        .route(
            "/:id/participants",
            post(conversation_handlers::add_participant)
                .delete(conversation_handlers::remove_participant),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // WebSocket route
    let ws_routes = Router::new()
        .route("/ws", get(crate::websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api_routes = Router::new()
        .nest("/messages", message_routes)
        .nest("/conversations", conversation_routes)
        .merge(ws_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        conversation::{ConversationRepository, ConversationService},
        message::{message_models::RecipientPolicy, MessageRepository, MessageService},
        notification::MessagePublisher,
        state::Config,
        user::UserRepository,
        websocket::ConnectionManager,
    };
    use axum::{body::Body, http::{Request, StatusCode}};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;

    // The pool never connects; these requests are rejected before any query.
    fn test_state() -> AppState {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let publisher = MessagePublisher::new(8);
        let users = UserRepository::new(pool.clone());
        let conversations = ConversationRepository::new(pool.clone());
        let messages = MessageRepository::new(pool.clone());

        AppState {
            config: Arc::new(Config {
                database_url: "postgres://localhost/unused".to_string(),
                jwt_secret: "secret".to_string(),
                host: "127.0.0.1".to_string(),
                port: 3000,
                database_max_connections: 1,
                recipient_policy: RecipientPolicy::IncludeSender,
                cors_origins: vec!["http://localhost:3000".to_string()],
                event_buffer: 8,
            }),
            ws_connections: ConnectionManager::new(),
            publisher: publisher.clone(),
            user_repository: users.clone(),
            message_service: MessageService::new(
                pool.clone(),
                messages.clone(),
                conversations.clone(),
                users.clone(),
                publisher,
                RecipientPolicy::IncludeSender,
            ),
            conversation_service: ConversationService::new(pool, conversations, messages, users),
        }
    }

    #[tokio::test]
    async fn test_requests_without_token_are_unauthorized() {
        let app = create_router(test_state());

        let response = app
            .oneshot(Request::builder().uri("/api/conversations").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let app = create_router(test_state());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/messages")
                    .header("Authorization", "Bearer not-a-jwt")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"body":"hi"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_openapi_lists_message_routes() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/messages"));
        assert!(doc.paths.paths.contains_key("/api/conversations/{id}/participants"));
    }
}
