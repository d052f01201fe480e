use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: Option<String>,
    /// Members besides the creator.
    #[validate(length(min = 1))]
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ParticipantRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_requires_members() {
        let req = CreateGroupRequest {
            label: Some("team".to_string()),
            user_ids: vec![],
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_group_label_optional() {
        let req: CreateGroupRequest =
            serde_json::from_str(&format!(r#"{{"user_ids":["{}"]}}"#, Uuid::new_v4())).unwrap();
        assert!(req.label.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_group_label_length() {
        let req = CreateGroupRequest {
            label: Some("x".repeat(256)),
            user_ids: vec![Uuid::new_v4()],
        };
        assert!(req.validate().is_err());
    }
}
