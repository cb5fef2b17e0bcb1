//! Server-Sent Events streams for progress and results.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use tracing::{debug, info};

use crate::script::{RESULT_ROUNDS, progress_script, snapshot_at};
use crate::state::AppState;

fn keep_alive() -> KeepAlive {
    KeepAlive::new().interval(Duration::from_secs(15)).text("ping")
}

fn message<T: Serialize>(payload: &T) -> Option<Event> {
    serde_json::to_string(payload)
        .ok()
        .map(|json| Event::default().data(json))
}

/// GET /api/progress/{id} - scripted progress messages, then end of stream.
pub async fn progress_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let request = state.session(&id).ok_or(StatusCode::NOT_FOUND)?;
    let tick = state.tick;
    info!(session_id = %id, "progress stream opened");

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));
        for event in progress_script(&request) {
            tokio::time::sleep(tick).await;
            if let Some(event) = message(&event) {
                yield Ok(event);
            }
        }
        debug!(session_id = %id, "progress script finished");
    };

    Ok(Sse::new(stream).keep_alive(keep_alive()))
}

/// GET /api/assessments/{id} - one growing results snapshot per round.
pub async fn assessments_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    let request = state.session(&id).ok_or(StatusCode::NOT_FOUND)?;
    let tick = state.tick;
    info!(session_id = %id, "results stream opened");

    let stream = async_stream::stream! {
        yield Ok(Event::default().event("connected").data("{}"));
        for round in 0..RESULT_ROUNDS {
            tokio::time::sleep(tick * 2).await;
            if let Some(event) = message(&snapshot_at(&request, round)) {
                yield Ok(event);
            }
        }
        debug!(session_id = %id, "results script finished");
    };

    Ok(Sse::new(stream).keep_alive(keep_alive()))
}
