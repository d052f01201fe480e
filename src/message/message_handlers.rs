use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Sse,
    },
    Json,
};
use futures::stream::Stream;
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use uuid::Uuid;

use crate::{
    error::Result,
    middleware::AuthUser,
    state::AppState,
    message::{
        message_dto::{MessageQuery, PaginatedResponse, SendMessageRequest, StatusResponse},
        message_models::{MessageResponse, Recipient},
    },
};

/// Send a message into a conversation, or to a user (creating the peer conversation on first contact)
#[utoipa::path(
    post,
    path = "/api/messages",
    tag = "messages",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent successfully", body = MessageResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<SendMessageRequest>,
) -> Result<impl IntoResponse> {
    let message = state
        .message_service
        .send_message(user_id, payload)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Get a page of a conversation's messages, newest first
#[utoipa::path(
    get,
    path = "/api/conversations/{id}/messages",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Conversation ID"),
        MessageQuery
    ),
    responses(
        (status = 200, description = "Paginated conversation messages", body = PaginatedResponse<MessageResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation_messages(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> Result<impl IntoResponse> {
    let response = state
        .message_service
        .get_conversation_messages(user_id, conversation_id, query.page())
        .await?;

    Ok((StatusCode::OK, Json(response)))
}

/// Remove a message from the caller's own view
#[utoipa::path(
    delete,
    path = "/api/messages/{id}",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Message ID")
    ),
    responses(
        (status = 200, description = "Message removed for the caller", body = StatusResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn remove_message(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    state
        .message_service
        .remove_for_recipient(user_id, message_id)
        .await?;

    Ok((
        StatusCode::OK,
        Json(StatusResponse {
            message: "deleted".to_string(),
        }),
    ))
}

/// Mark a message as read
#[utoipa::path(
    patch,
    path = "/api/messages/{id}/read",
    tag = "messages",
    params(
        ("id" = Uuid, Path, description = "Message ID to mark as read")
    ),
    responses(
        (status = 200, description = "Message marked as read", body = Recipient),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Message not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_message_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let recipient = state
        .message_service
        .mark_read(user_id, message_id)
        .await?;

    Ok((StatusCode::OK, Json(recipient)))
}

/// Real-time stream of messages sent to or by the caller (SSE)
#[utoipa::path(
    get,
    path = "/api/messages/stream",
    tag = "messages",
    responses(
        (status = 200, description = "Message stream established"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn message_stream(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.publisher.subscribe();
    let stream = BroadcastStream::new(rx)
        .filter_map(move |result| match result {
            Ok(event) if event.is_for(user_id) => {
                let json = serde_json::to_string(&event.message).ok()?;
                Some(Ok(Event::default().event("message_created").data(json)))
            }
            _ => None,
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
