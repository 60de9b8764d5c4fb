use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json as SqlJson};
use validator::Validate;

use crate::{
    error::AppError,
    models::project::{
        CreateProjectRequest, Project, ProjectListParams, ProjectResponse, ProjectWithOwner,
        UpdateProjectRequest,
    },
    utils::{html::clean_html, jwt::Claims},
};

/// Create a new project listing.
pub async fn create_project(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let user_id = claims.user_id();
    let description = clean_html(&payload.description);

    let project_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO projects (owner_id, title, description, difficulty, languages, skills,
                              estimated_time, max_contributors, show_contributor_count, show_status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id
        "#,
    )
    .bind(user_id)
    .bind(&payload.title)
    .bind(&description)
    .bind(&payload.difficulty)
    .bind(SqlJson(&payload.languages))
    .bind(SqlJson(&payload.skills))
    .bind(&payload.estimated_time)
    .bind(payload.max_contributors.unwrap_or(0))
    .bind(payload.show_contributor_count.unwrap_or(true))
    .bind(payload.show_status.unwrap_or(true))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create project: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"id": project_id})),
    ))
}

/// List projects (Recent first).
/// Supports cursor-based pagination plus difficulty/language/status/keyword filters.
pub async fn list_projects(
    State(pool): State<PgPool>,
    Query(params): Query<ProjectListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20).min(100); // Default 20, max 100

    let mut builder = QueryBuilder::<Postgres>::new(
        r#"
        SELECT id, owner_id, title, description, difficulty, languages, skills,
               estimated_time, max_contributors, show_contributor_count,
               status, show_status, accepted_count, view_count,
               created_at, updated_at
        FROM projects
        WHERE 1 = 1
        "#,
    );

    if let Some(difficulty) = &params.difficulty {
        builder.push(" AND difficulty = ").push_bind(difficulty);
    }
    if let Some(language) = &params.language {
        // JSONB containment against the ordered language list.
        builder
            .push(" AND languages @> ")
            .push_bind(serde_json::json!([language]));
    }
    if let Some(status) = &params.status {
        // Status is only a filter criterion for projects that expose it.
        builder
            .push(" AND show_status = TRUE AND status = ")
            .push_bind(status);
    }
    if let Some(q) = &params.q {
        let pattern = format!("%{}%", q);
        builder
            .push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(cursor) = &params.cursor {
        builder.push(" AND created_at < ").push_bind(cursor);
    }

    builder.push(" ORDER BY created_at DESC LIMIT ").push_bind(limit);

    let projects: Vec<Project> = builder.build_query_as().fetch_all(&pool).await.map_err(|e| {
        tracing::error!("Failed to list projects: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    let projects: Vec<ProjectResponse> = projects
        .into_iter()
        .map(|p| ProjectResponse::for_viewer(p, false))
        .collect();

    Ok(Json(projects))
}

/// Get a single project by ID, joined with its owner summary.
/// Each fetch bumps the view counter.
pub async fn get_project(
    State(pool): State<PgPool>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    sqlx::query("UPDATE projects SET view_count = view_count + 1 WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await?;

    let row = sqlx::query_as::<_, ProjectWithOwner>(
        r#"
        SELECT p.id, p.owner_id, p.title, p.description, p.difficulty, p.languages,
               p.skills, p.estimated_time, p.max_contributors, p.show_contributor_count,
               p.status, p.show_status, p.accepted_count, p.view_count,
               p.created_at, p.updated_at,
               u.username as owner_username,
               u.display_name as owner_display_name,
               u.avatar_url as owner_avatar_url
        FROM projects p
        JOIN users u ON p.owner_id = u.id
        WHERE p.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Project not found".to_string()))?;

    Ok(Json(serde_json::json!({
        "project": ProjectResponse::for_viewer(row.project, false),
        "owner": {
            "username": row.owner_username,
            "display_name": row.owner_display_name,
            "avatar_url": row.owner_avatar_url,
        }
    })))
}

/// Update a project. Owner only.
/// Capacity may not shrink below the current accepted-contributor count.
pub async fn update_project(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let user_id = claims.user_id();

    let owner_id: i64 = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Project not found".to_string()))?;

    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "You are not authorized to update this project".to_string(),
        ));
    }

    let mut builder = QueryBuilder::<Postgres>::new("UPDATE projects SET updated_at = NOW()");

    if let Some(v) = &payload.title {
        builder.push(", title = ").push_bind(v);
    }
    if let Some(v) = &payload.description {
        builder.push(", description = ").push_bind(clean_html(v));
    }
    if let Some(v) = &payload.difficulty {
        builder.push(", difficulty = ").push_bind(v);
    }
    if let Some(v) = &payload.languages {
        builder.push(", languages = ").push_bind(SqlJson(v.clone()));
    }
    if let Some(v) = &payload.skills {
        builder.push(", skills = ").push_bind(SqlJson(v.clone()));
    }
    if let Some(v) = &payload.estimated_time {
        builder.push(", estimated_time = ").push_bind(v);
    }
    if let Some(v) = payload.max_contributors {
        builder.push(", max_contributors = ").push_bind(v);
    }
    if let Some(v) = payload.show_contributor_count {
        builder.push(", show_contributor_count = ").push_bind(v);
    }
    if let Some(v) = &payload.status {
        builder.push(", status = ").push_bind(v);
    }
    if let Some(v) = payload.show_status {
        builder.push(", show_status = ").push_bind(v);
    }

    builder.push(" WHERE id = ").push_bind(id);

    // The capacity guard rides on the same statement, so a concurrent accept
    // cannot slip between a check and the write.
    if let Some(max) = payload.max_contributors {
        if max > 0 {
            builder.push(" AND accepted_count <= ").push_bind(max);
        }
    }

    let result = builder.build().execute(&pool).await.map_err(|e| {
        tracing::error!("Failed to update project: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    if result.rows_affected() == 0 {
        return Err(AppError::BadRequest(
            "max_contributors cannot be lower than the current number of accepted contributors"
                .to_string(),
        ));
    }

    Ok(StatusCode::OK)
}

/// Delete a project. Owner only.
/// Contribution requests are removed by the ON DELETE CASCADE constraint.
pub async fn delete_project(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id();

    let owner_id: i64 = sqlx::query_scalar("SELECT owner_id FROM projects WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Project not found".to_string()))?;

    if owner_id != user_id {
        return Err(AppError::Forbidden(
            "You are not authorized to delete this project".to_string(),
        ));
    }

    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(id)
        .execute(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to delete project: {:?}", e);
            AppError::InternalServerError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}
