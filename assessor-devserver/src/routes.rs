//! HTTP route handlers for the assessment API.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use assessor::core::types::{StartRequest, StartResponse};

use crate::sse::{assessments_handler, progress_handler};
use crate::state::AppState;

const QUALITY_MODEL: &str = include_str!("../data/quality_model.json");

/// Build the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/quality-model", get(quality_model))
        .route("/assessments", post(start_assessment))
        .route("/assessments/{id}", get(assessments_handler))
        .route("/progress/{id}", get(progress_handler))
}

async fn health() -> &'static str {
    "ok"
}

/// GET /api/quality-model - the embedded sample model.
async fn quality_model() -> Result<Json<Value>, StatusCode> {
    serde_json::from_str(QUALITY_MODEL)
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// POST /api/assessments - register a session and hand out its stream endpoints.
async fn start_assessment(
    State(state): State<AppState>,
    Json(request): Json<StartRequest>,
) -> Result<Json<StartResponse>, (StatusCode, Json<ErrorBody>)> {
    if let Some(error) = rejection(&request) {
        warn!(error = %error, "rejecting start request");
        return Err((StatusCode::BAD_REQUEST, Json(ErrorBody { error })));
    }
    let goals = request.selected_goals.len();
    let id = state.create_session(request);
    info!(session_id = %id, goals, "session started");
    Ok(Json(StartResponse {
        progress_endpoint: format!("/api/progress/{}", id),
        assessment_endpoint: format!("/api/assessments/{}", id),
        assessment_id: id,
    }))
}

fn rejection(request: &StartRequest) -> Option<String> {
    let missing = request.metadata.missing_fields();
    if !missing.is_empty() {
        return Some(format!("metadata is missing {}", missing.join(", ")));
    }
    if request.selected_goals.is_empty() {
        return Some("no goals selected".to_string());
    }
    None
}
