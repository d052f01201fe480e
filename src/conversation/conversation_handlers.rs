use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::Result,
    middleware::AuthUser,
    state::AppState,
    conversation::{
        conversation_dto::{CreateGroupRequest, MarkReadResponse, ParticipantRequest},
        conversation_models::{ConversationResponse, Participant},
    },
};

/// Get all conversations for the authenticated user
#[utoipa::path(
    get,
    path = "/api/conversations",
    tag = "conversations",
    responses(
        (status = 200, description = "Conversations retrieved successfully", body = Vec<ConversationResponse>),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversations(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let conversations = state.conversation_service.list_conversations(user_id).await?;
    Ok((StatusCode::OK, Json(conversations)))
}

/// Get a single conversation
#[utoipa::path(
    get,
    path = "/api/conversations/{id}",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Conversation retrieved successfully", body = ConversationResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let conversation = state
        .conversation_service
        .get_conversation(user_id, conversation_id)
        .await?;
    Ok((StatusCode::OK, Json(conversation)))
}

/// Create a group conversation
#[utoipa::path(
    post,
    path = "/api/conversations",
    tag = "conversations",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created successfully", body = ConversationResponse),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_group(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse> {
    payload.validate()?;

    let conversation = state
        .conversation_service
        .create_group(user_id, payload.label, payload.user_ids)
        .await?;

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Mark every message in a conversation as read
#[utoipa::path(
    patch,
    path = "/api/conversations/{id}/read",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    responses(
        (status = 200, description = "Messages marked as read", body = MarkReadResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Conversation not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let updated = state
        .message_service
        .mark_conversation_read(user_id, conversation_id)
        .await?;

    Ok((StatusCode::OK, Json(MarkReadResponse { updated })))
}

/// Add a participant to a group conversation (admins only)
#[utoipa::path(
    post,
    path = "/api/conversations/{id}/participants",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = ParticipantRequest,
    responses(
        (status = 201, description = "Participant added", body = Participant),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not an admin of this conversation"),
        (status = 404, description = "Conversation not found"),
        (status = 409, description = "User is already a participant")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn add_participant(
    State(state): State<AppState>,
    AuthUser(actor_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<ParticipantRequest>,
) -> Result<impl IntoResponse> {
    let participant = state
        .conversation_service
        .add_participant(actor_id, conversation_id, payload.user_id)
        .await?;

    Ok((StatusCode::CREATED, Json(participant)))
}

/// Remove a participant from a group conversation
#[utoipa::path(
    delete,
    path = "/api/conversations/{id}/participants",
    tag = "conversations",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = ParticipantRequest,
    responses(
        (status = 204, description = "Participant removed"),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Not allowed to remove this participant"),
        (status = 404, description = "Conversation or participant not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn remove_participant(
    State(state): State<AppState>,
    AuthUser(actor_id): AuthUser,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<ParticipantRequest>,
) -> Result<impl IntoResponse> {
    state
        .conversation_service
        .remove_participant(actor_id, conversation_id, payload.user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
