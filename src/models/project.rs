// src/models/project.rs

use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Represents the 'projects' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: String,

    /// Difficulty: 'beginner', 'intermediate' or 'advanced'.
    pub difficulty: String,

    /// Ordered list of programming languages.
    /// Stored as a JSON array in the database;
    /// `sqlx::types::Json` handles automatic serialization/deserialization.
    pub languages: Json<Vec<String>>,

    /// Ordered list of skills/technologies.
    pub skills: Json<Vec<String>>,

    pub estimated_time: Option<String>,

    /// Maximum number of simultaneously accepted contributors. 0 = unlimited.
    pub max_contributors: i32,
    pub show_contributor_count: bool,

    /// Lifecycle status: 'recruiting', 'working' or 'completed'.
    pub status: String,
    pub show_status: bool,

    pub accepted_count: i32,
    pub view_count: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Whether a project can take no further accepted contributors.
/// A zero `max_contributors` means unlimited capacity.
pub fn is_at_capacity(max_contributors: i32, accepted_count: i32) -> bool {
    max_contributors > 0 && accepted_count >= max_contributors
}

impl Project {
    pub fn is_at_capacity(&self) -> bool {
        is_at_capacity(self.max_contributors, self.accepted_count)
    }
}

/// A project row joined with its owner's public summary.
#[derive(Debug, FromRow)]
pub struct ProjectWithOwner {
    #[sqlx(flatten)]
    pub project: Project,
    pub owner_username: String,
    pub owner_display_name: String,
    pub owner_avatar_url: Option<String>,
}

/// Outward-facing project view.
///
/// `accepted_count` and `status` honor the owner's visibility switches:
/// they are nulled out for non-owner viewers when the switch is off.
#[derive(Debug, Serialize)]
pub struct ProjectResponse {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub languages: Vec<String>,
    pub skills: Vec<String>,
    pub estimated_time: Option<String>,
    pub max_contributors: i32,
    pub show_contributor_count: bool,
    pub accepted_count: Option<i32>,
    pub status: Option<String>,
    pub show_status: bool,
    pub view_count: i64,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ProjectResponse {
    pub fn for_viewer(project: Project, viewer_is_owner: bool) -> Self {
        let show_count = viewer_is_owner || project.show_contributor_count;
        let show_status = viewer_is_owner || project.show_status;

        Self {
            id: project.id,
            owner_id: project.owner_id,
            title: project.title,
            description: project.description,
            difficulty: project.difficulty,
            languages: project.languages.0,
            skills: project.skills.0,
            estimated_time: project.estimated_time,
            max_contributors: project.max_contributors,
            show_contributor_count: project.show_contributor_count,
            accepted_count: show_count.then_some(project.accepted_count),
            status: show_status.then(|| project.status),
            show_status: project.show_status,
            view_count: project.view_count,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

/// DTO for creating a new project.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 100, message = "Title length must be between 1 and 100 chars"))]
    pub title: String,

    #[validate(length(
        min = 1,
        max = 10000,
        message = "Description length must be between 1 and 10000 chars"
    ))]
    pub description: String,

    #[validate(custom(function = validate_difficulty))]
    pub difficulty: String,

    #[validate(custom(function = validate_tag_list))]
    #[serde(default)]
    pub languages: Vec<String>,

    #[validate(custom(function = validate_tag_list))]
    #[serde(default)]
    pub skills: Vec<String>,

    #[validate(length(max = 100))]
    pub estimated_time: Option<String>,

    /// 0 (or absent) = unlimited.
    #[validate(range(min = 0, max = 1000))]
    pub max_contributors: Option<i32>,

    pub show_contributor_count: Option<bool>,
    pub show_status: Option<bool>,
}

/// DTO for updating a project. Fields are optional.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 100))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 10000))]
    pub description: Option<String>,

    #[validate(custom(function = validate_difficulty))]
    pub difficulty: Option<String>,

    #[validate(custom(function = validate_tag_list))]
    pub languages: Option<Vec<String>>,

    #[validate(custom(function = validate_tag_list))]
    pub skills: Option<Vec<String>>,

    #[validate(length(max = 100))]
    pub estimated_time: Option<String>,

    #[validate(range(min = 0, max = 1000))]
    pub max_contributors: Option<i32>,

    pub show_contributor_count: Option<bool>,

    #[validate(custom(function = validate_status))]
    pub status: Option<String>,

    pub show_status: Option<bool>,
}

/// Query parameters for listing projects.
#[derive(Debug, Deserialize)]
pub struct ProjectListParams {
    /// Cursor for pagination: the created_at timestamp of the last project in the previous page.
    pub cursor: Option<chrono::DateTime<chrono::Utc>>,

    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,

    /// Filter by difficulty.
    pub difficulty: Option<String>,

    /// Filter by a programming language tag.
    pub language: Option<String>,

    /// Filter by lifecycle status. Matches only projects that expose it.
    pub status: Option<String>,

    /// Search keyword for title/description match.
    pub q: Option<String>,
}

/// Restricts difficulty to its three levels.
fn validate_difficulty(difficulty: &str) -> Result<(), validator::ValidationError> {
    if difficulty != "beginner" && difficulty != "intermediate" && difficulty != "advanced" {
        return Err(validator::ValidationError::new("invalid_difficulty"));
    }
    Ok(())
}

/// Restricts status to its three lifecycle values.
fn validate_status(status: &str) -> Result<(), validator::ValidationError> {
    if status != "recruiting" && status != "working" && status != "completed" {
        return Err(validator::ValidationError::new("invalid_status"));
    }
    Ok(())
}

/// Validates a tag collection (languages or skills).
fn validate_tag_list(tags: &[String]) -> Result<(), validator::ValidationError> {
    if tags.len() > 20 {
        return Err(validator::ValidationError::new("too_many_tags"));
    }
    for tag in tags {
        if tag.is_empty() || tag.len() > 50 {
            return Err(validator::ValidationError::new("invalid_tag_length"));
        }
    }
    Ok(())
}
