use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::conversation::conversation_resolver::SendTarget;
use crate::error::{AppError, Result};
use super::message_models::MAX_BODY_LENGTH;

/// Page size for conversation history.
pub const MESSAGES_PER_PAGE: u32 = 10;

#[derive(Clone, Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessageRequest {
    #[validate(custom(function = "validate_body"))]
    #[serde(default)]
    pub body: String,
    /// Existing conversation to post into.
    pub conversation_id: Option<Uuid>,
    /// Peer to message; the peer conversation is created on first contact.
    pub user_id: Option<Uuid>,
}

fn validate_body(body: &str) -> std::result::Result<(), ValidationError> {
    if body.trim().is_empty() {
        let mut err = ValidationError::new("required");
        err.message = Some("body required".into());
        return Err(err);
    }
    if body.chars().count() > MAX_BODY_LENGTH {
        let mut err = ValidationError::new("length");
        err.message = Some("body max length 255".into());
        return Err(err);
    }
    Ok(())
}

impl SendMessageRequest {
    pub fn target(&self) -> Result<SendTarget> {
        match (self.conversation_id, self.user_id) {
            (Some(conversation_id), None) => Ok(SendTarget::Conversation(conversation_id)),
            (None, Some(user_id)) => Ok(SendTarget::Peer(user_id)),
            (None, None) => Err(AppError::field(
                "conversation_id",
                "conversation_id or user_id required",
            )),
            (Some(_), Some(_)) => Err(AppError::field(
                "conversation_id",
                "conversation_id and user_id are mutually exclusive",
            )),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MessageQuery {
    /// 1-based page number (default: 1)
    pub page: Option<u32>,
}

impl MessageQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: i64, page: u32, limit: u32) -> Self {
        let total_pages = ((total as f64) / (limit as f64)).ceil() as u32;
        Self {
            data,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub message: String,
}
