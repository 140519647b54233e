use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::error::Error;
use crate::models::*;

use super::AppContext;

// ============================================================
// Error Handling
// ============================================================

/// Maps domain errors onto HTTP status classes with a structured body.
///
/// Caller-fixable problems land in the 4xx range; store and file I/O
/// failures become 500s carrying the underlying message, never a silent
/// or empty response.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

// A body that fails to deserialize (missing field, bad type, invalid JSON)
// still gets the structured error shape.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Error::RestoreFailed(_) => (StatusCode::INTERNAL_SERVER_ERROR, "restore_failed"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "io"),
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::warn!("rejected request: {}", self.0);
        }

        let body = Json(serde_json::json!({
            "error": self.0.to_string(),
            "kind": kind,
        }));
        (status, body).into_response()
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true, "version": crate::VERSION }))
}

// ============================================================
// Tasks
// ============================================================

pub async fn list_tasks(State(ctx): State<AppContext>) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(ctx.db.list_tasks()?))
}

pub async fn create_task(
    State(ctx): State<AppContext>,
    payload: Result<Json<CreateTaskInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(input) = payload?;
    let task = ctx.db.create_task(input)?;
    Ok(Json(serde_json::json!({
        "id": task.id,
        "added": task.title,
    })))
}

pub async fn toggle_task(
    State(ctx): State<AppContext>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = ctx.db.toggle_task_status(id)?;
    Ok(Json(serde_json::json!({
        "updated": task.id,
        "status": task.status.as_str(),
    })))
}

// ============================================================
// Skills
// ============================================================

pub async fn list_skills(State(ctx): State<AppContext>) -> Result<Json<Vec<Skill>>, ApiError> {
    Ok(Json(ctx.db.list_skills()?))
}

/// Create-or-replace keyed by name. Posting an existing name overwrites that
/// skill's fields rather than conflicting; see `Database::upsert_skill`.
pub async fn upsert_skill(
    State(ctx): State<AppContext>,
    payload: Result<Json<CreateSkillInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(input) = payload?;
    let skill = ctx.db.upsert_skill(input)?;
    Ok(Json(serde_json::json!({
        "id": skill.id,
        "added": skill.name,
    })))
}

// ============================================================
// Summary + freeform log
// ============================================================

pub async fn summary(State(ctx): State<AppContext>) -> Result<Json<serde_json::Value>, ApiError> {
    let summary = ctx
        .db
        .latest_session()?
        .and_then(|s| s.summary)
        .unwrap_or_else(|| {
            format!(
                "Session summary generated at {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S")
            )
        });
    Ok(Json(serde_json::json!({ "summary": summary })))
}

#[derive(Debug, Deserialize)]
pub struct AutoLogInput {
    pub text: String,
}

pub async fn auto_log(
    State(ctx): State<AppContext>,
    payload: Result<Json<AutoLogInput>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(input) = payload?;
    let logged = ctx.paths.append_auto_log(&input.text)?;
    Ok(Json(serde_json::json!({ "auto_logged": logged })))
}
