// src/utils/notify.rs

use sqlx::PgPool;

pub const EVENT_REQUEST_CREATED: &str = "contribution_request_created";
pub const EVENT_REQUEST_RESOLVED: &str = "contribution_request_resolved";

/// Best-effort notification write.
///
/// The workflow state change has already committed by the time this runs;
/// a failed insert is logged and dropped, never propagated to the caller.
pub async fn notify(pool: &PgPool, user_id: i64, event_type: &str, payload: serde_json::Value) {
    let result = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, event_type, payload)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(user_id)
    .bind(event_type)
    .bind(payload)
    .execute(pool)
    .await;

    if let Err(e) = result {
        tracing::warn!("Failed to write {} notification for user {}: {:?}", event_type, user_id, e);
    }
}
