//! The contribution-request workflow: create, resolve, remove, re-accept,
//! and the two list views.
//!
//! Capacity is enforced at the storage layer. Acceptance increments the
//! project's accepted_count through a conditional UPDATE that checks the
//! limit in the same statement, and duplicate submissions are stopped by a
//! partial unique index, so neither check can be raced from application
//! memory.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, Transaction};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        project::Project,
        request::{
            ContributionRequest, CreateRequestPayload, RequestWithProject, RequestWithRequester,
            ResolveRequestPayload,
        },
    },
    utils::{
        html::clean_html,
        jwt::Claims,
        notify::{EVENT_REQUEST_CREATED, EVENT_REQUEST_RESOLVED, notify},
    },
};

const REQUEST_COLUMNS: &str =
    "id, project_id, requester_id, message, status, response_message, created_at, updated_at";

/// Submit a contribution request for a project.
///
/// The requester must not be the owner and must not already have an active
/// (pending or accepted) request. The capacity check here is advisory; the
/// binding one happens at acceptance time.
pub async fn create_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<i64>,
    Json(payload): Json<CreateRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id();

    let project = sqlx::query_as::<_, Project>(
        r#"
        SELECT id, owner_id, title, description, difficulty, languages, skills,
               estimated_time, max_contributors, show_contributor_count,
               status, show_status, accepted_count, view_count,
               created_at, updated_at
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Project not found".to_string()))?;

    if project.owner_id == user_id {
        return Err(AppError::Forbidden(
            "You cannot request to contribute to your own project".to_string(),
        ));
    }

    if project.is_at_capacity() {
        return Err(AppError::CapacityExceeded(
            "This project has reached its contributor limit".to_string(),
        ));
    }

    let message = payload.message.map(|m| clean_html(&m));

    let request = sqlx::query_as::<_, ContributionRequest>(&format!(
        r#"
        INSERT INTO contribution_requests (project_id, requester_id, message)
        VALUES ($1, $2, $3)
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(project_id)
    .bind(user_id)
    .bind(&message)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        // The partial unique index rejects a second active request for the
        // same (project, requester) pair, including the double-click case.
        if e.to_string().contains("idx_active_request_per_requester") {
            AppError::Conflict("You already have an active request for this project".to_string())
        } else {
            tracing::error!("Failed to create contribution request: {:?}", e);
            AppError::InternalServerError(e.to_string())
        }
    })?;

    notify(
        &pool,
        project.owner_id,
        EVENT_REQUEST_CREATED,
        serde_json::json!({
            "request_id": request.id,
            "project_id": project_id,
            "requester_id": user_id,
        }),
    )
    .await;

    Ok((StatusCode::CREATED, Json(request)))
}

/// Accept or decline a pending request. Owner only.
pub async fn resolve_request(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<i64>,
    Json(payload): Json<ResolveRequestPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id();

    let mut tx = pool.begin().await?;

    // Row lock: serializes concurrent resolutions of the same request.
    let request = sqlx::query_as::<_, ContributionRequest>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM contribution_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Request not found".to_string()))?;

    let owner_id: i64 = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = $1")
        .bind(request.project_id)
        .fetch_one(&mut *tx)
        .await?;

    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "Only the project owner can resolve requests".to_string(),
        ));
    }

    if request.status != "pending" {
        return Err(AppError::InvalidState(format!(
            "Request is '{}' and can no longer be resolved",
            request.status
        )));
    }

    if payload.decision == "accepted" {
        take_capacity_slot(&mut tx, request.project_id).await?;
    }

    let response_message = payload.response_message.map(|m| clean_html(&m));

    let request = sqlx::query_as::<_, ContributionRequest>(&format!(
        r#"
        UPDATE contribution_requests
        SET status = $1, response_message = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(&payload.decision)
    .bind(&response_message)
    .bind(request_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    notify(
        &pool,
        request.requester_id,
        EVENT_REQUEST_RESOLVED,
        serde_json::json!({
            "request_id": request.id,
            "project_id": request.project_id,
            "decision": payload.decision,
        }),
    )
    .await;

    Ok(Json(request))
}

/// Remove an accepted contributor, freeing one capacity slot. Owner only.
pub async fn remove_contributor(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let mut tx = pool.begin().await?;

    let request = sqlx::query_as::<_, ContributionRequest>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM contribution_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Request not found".to_string()))?;

    let owner_id: i64 = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = $1")
        .bind(request.project_id)
        .fetch_one(&mut *tx)
        .await?;

    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "Only the project owner can remove contributors".to_string(),
        ));
    }

    if request.status != "accepted" {
        return Err(AppError::InvalidState(format!(
            "Request is '{}'; only accepted contributors can be removed",
            request.status
        )));
    }

    sqlx::query(
        r#"
        UPDATE projects
        SET accepted_count = GREATEST(0, accepted_count - 1), updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(request.project_id)
    .execute(&mut *tx)
    .await?;

    let request = sqlx::query_as::<_, ContributionRequest>(&format!(
        r#"
        UPDATE contribution_requests
        SET status = 'removed', updated_at = NOW()
        WHERE id = $1
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(request_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Json(request))
}

/// Re-accept a previously removed contributor, if capacity allows. Owner only.
pub async fn reaccept_contributor(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(request_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let mut tx = pool.begin().await?;

    let request = sqlx::query_as::<_, ContributionRequest>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM contribution_requests WHERE id = $1 FOR UPDATE"
    ))
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("Request not found".to_string()))?;

    let owner_id: i64 = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = $1")
        .bind(request.project_id)
        .fetch_one(&mut *tx)
        .await?;

    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "Only the project owner can re-accept contributors".to_string(),
        ));
    }

    if request.status != "removed" {
        return Err(AppError::InvalidState(format!(
            "Request is '{}'; only removed contributors can be re-accepted",
            request.status
        )));
    }

    take_capacity_slot(&mut tx, request.project_id).await?;

    let request = sqlx::query_as::<_, ContributionRequest>(&format!(
        r#"
        UPDATE contribution_requests
        SET status = 'accepted', updated_at = NOW()
        WHERE id = $1
        RETURNING {REQUEST_COLUMNS}
        "#
    ))
    .bind(request_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    notify(
        &pool,
        request.requester_id,
        EVENT_REQUEST_RESOLVED,
        serde_json::json!({
            "request_id": request.id,
            "project_id": request.project_id,
            "decision": "accepted",
        }),
    )
    .await;

    Ok(Json(request))
}

/// List all requests for a project, newest first, joined with requester
/// summaries. Owner only.
pub async fn list_project_requests(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(project_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let owner_id: i64 = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = $1")
        .bind(project_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Project not found".to_string()))?;

    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "Only the project owner can view its requests".to_string(),
        ));
    }

    let requests = sqlx::query_as::<_, RequestWithRequester>(
        r#"
        SELECT r.id, r.project_id, r.requester_id, r.message, r.status,
               r.response_message, r.created_at, r.updated_at,
               u.username as requester_username,
               u.display_name as requester_display_name,
               u.avatar_url as requester_avatar_url
        FROM contribution_requests r
        JOIN users u ON r.requester_id = u.id
        WHERE r.project_id = $1
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(requests))
}

/// List the current user's own requests, newest first, joined with project
/// summaries.
pub async fn list_my_requests(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let requests = sqlx::query_as::<_, RequestWithProject>(
        r#"
        SELECT r.id, r.project_id, r.requester_id, r.message, r.status,
               r.response_message, r.created_at, r.updated_at,
               p.title as project_title,
               CASE WHEN p.show_status THEN p.status END as project_status,
               u.username as owner_username
        FROM contribution_requests r
        JOIN projects p ON r.project_id = p.id
        JOIN users u ON p.owner_id = u.id
        WHERE r.requester_id = $1
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(requests))
}

/// Claim one capacity slot on the project, atomically.
///
/// The limit check and the increment are a single conditional UPDATE: when
/// two acceptances race for the last slot, exactly one statement matches.
async fn take_capacity_slot(
    tx: &mut Transaction<'_, Postgres>,
    project_id: i64,
) -> Result<(), AppError> {
    let updated = sqlx::query(
        r#"
        UPDATE projects
        SET accepted_count = accepted_count + 1, updated_at = NOW()
        WHERE id = $1
          AND (max_contributors = 0 OR accepted_count < max_contributors)
        "#,
    )
    .bind(project_id)
    .execute(&mut **tx)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(AppError::CapacityExceeded(
            "This project has reached its contributor limit".to_string(),
        ));
    }

    Ok(())
}
