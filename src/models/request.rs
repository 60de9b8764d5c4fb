// src/models/request.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'contribution_requests' table.
///
/// Status state machine:
/// pending -> accepted | declined
/// accepted -> removed
/// removed -> accepted
/// 'declined' is terminal.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ContributionRequest {
    pub id: i64,
    pub project_id: i64,
    pub requester_id: i64,

    /// Free-text pitch from the requester.
    pub message: Option<String>,

    /// 'pending', 'accepted', 'declined' or 'removed'.
    pub status: String,

    /// Optional reply from the project owner, set at resolution.
    pub response_message: Option<String>,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Whether a request status counts against the one-active-request rule.
pub fn is_active_status(status: &str) -> bool {
    status == "pending" || status == "accepted"
}

/// Legality of an owner-initiated status transition.
pub fn is_legal_transition(from: &str, to: &str) -> bool {
    matches!(
        (from, to),
        ("pending", "accepted")
            | ("pending", "declined")
            | ("accepted", "removed")
            | ("removed", "accepted")
    )
}

/// DTO for submitting a contribution request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRequestPayload {
    #[validate(length(max = 2000, message = "Message must be at most 2000 characters"))]
    pub message: Option<String>,
}

/// DTO for the owner's decision on a pending request.
#[derive(Debug, Deserialize, Validate)]
pub struct ResolveRequestPayload {
    #[validate(custom(function = validate_decision))]
    pub decision: String,

    #[validate(length(max = 2000, message = "Response must be at most 2000 characters"))]
    pub response_message: Option<String>,
}

/// A request joined with the requester's profile summary,
/// for the owner's management view.
#[derive(Debug, Serialize, FromRow)]
pub struct RequestWithRequester {
    pub id: i64,
    pub project_id: i64,
    pub requester_id: i64,
    pub message: Option<String>,
    pub status: String,
    pub response_message: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub requester_username: String,
    pub requester_display_name: String,
    pub requester_avatar_url: Option<String>,
}

/// A request joined with its project summary, for the requester's own view.
#[derive(Debug, Serialize, FromRow)]
pub struct RequestWithProject {
    pub id: i64,
    pub project_id: i64,
    pub requester_id: i64,
    pub message: Option<String>,
    pub status: String,
    pub response_message: Option<String>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
    pub project_title: String,
    /// Hidden when the owner keeps the project status private.
    pub project_status: Option<String>,
    pub owner_username: String,
}

/// Restricts the decision to 'accepted' or 'declined'.
fn validate_decision(decision: &str) -> Result<(), validator::ValidationError> {
    if decision != "accepted" && decision != "declined" {
        return Err(validator::ValidationError::new("invalid_decision"));
    }
    Ok(())
}
