use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        project::{Project, ProjectResponse},
        user::{MeResponse, PublicProfile, UpdateProfileRequest},
    },
    utils::jwt::Claims,
};

/// Get current user's profile and statistics.
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    // Subqueries are cheap here given the indexes on owner_id and requester_id.
    let me = sqlx::query_as::<_, MeResponse>(
        r#"
        SELECT
            u.id, u.username, u.display_name, u.avatar_url, u.bio, u.location,
            u.website, u.github_handle, u.twitter_handle, u.created_at,
            (SELECT COUNT(*) FROM projects WHERE owner_id = u.id) as projects_count,
            (SELECT COUNT(*) FROM contribution_requests
             WHERE requester_id = u.id AND status = 'accepted') as contributions_count
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(me))
}

/// Update current user's profile fields. Absent fields are left untouched.
pub async fn update_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id();

    let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET ");
    let mut any_field = false;

    {
        let mut fields = builder.separated(", ");
        if let Some(v) = &payload.display_name {
            fields.push("display_name = ").push_bind_unseparated(v);
            any_field = true;
        }
        if let Some(v) = &payload.avatar_url {
            fields.push("avatar_url = ").push_bind_unseparated(v);
            any_field = true;
        }
        if let Some(v) = &payload.bio {
            fields.push("bio = ").push_bind_unseparated(v);
            any_field = true;
        }
        if let Some(v) = &payload.location {
            fields.push("location = ").push_bind_unseparated(v);
            any_field = true;
        }
        if let Some(v) = &payload.website {
            fields.push("website = ").push_bind_unseparated(v);
            any_field = true;
        }
        if let Some(v) = &payload.github_handle {
            fields.push("github_handle = ").push_bind_unseparated(v);
            any_field = true;
        }
        if let Some(v) = &payload.twitter_handle {
            fields.push("twitter_handle = ").push_bind_unseparated(v);
            any_field = true;
        }
    }

    if !any_field {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    builder.push(" WHERE id = ").push_bind(user_id);

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update profile: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    Ok(StatusCode::OK)
}

/// Get a user's public profile by ID.
pub async fn get_user(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let profile = sqlx::query_as::<_, PublicProfile>(
        r#"
        SELECT
            u.id, u.username, u.display_name, u.avatar_url, u.bio, u.location,
            u.website, u.github_handle, u.twitter_handle, u.created_at,
            (SELECT COUNT(*) FROM projects WHERE owner_id = u.id) as projects_count
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(profile))
}

/// List projects owned by the current user, with all fields visible.
pub async fn list_my_projects(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let projects = sqlx::query_as::<_, Project>(
        r#"
        SELECT id, owner_id, title, description, difficulty, languages, skills,
               estimated_time, max_contributors, show_contributor_count,
               status, show_status, accepted_count, view_count,
               created_at, updated_at
        FROM projects
        WHERE owner_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    let projects: Vec<ProjectResponse> = projects
        .into_iter()
        .map(|p| ProjectResponse::for_viewer(p, true))
        .collect();

    Ok(Json(projects))
}
