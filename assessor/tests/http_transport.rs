//! `HttpTransport` against an in-process axum backend.
//!
//! The server mirrors the backend contract: quality model, start call, and
//! two event streams that end after a fixed script.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream;
use serde_json::{Value, json};

use assessor::core::types::{ChannelKind, Phase, StartRequest, StartResponse};
use assessor::error::{AssessError, TransportError};
use assessor::io::model::build_goal_tree;
use assessor::io::transport::{HttpTransport, Transport};
use assessor::orchestrator::{SessionEvent, SessionOrchestrator, SessionSettings};
use assessor::test_support::sample_metadata;

#[derive(Clone, Default)]
struct Backend {
    requests: Arc<Mutex<Vec<StartRequest>>>,
}

fn model() -> Value {
    json!({
        "goals": [
            {
                "name": "Performance",
                "weight": 0.6,
                "subGoals": [{ "name": "LoadTime" }]
            },
            { "name": "Usability" }
        ]
    })
}

async fn quality_model() -> Json<Value> {
    Json(model())
}

async fn start(
    State(backend): State<Backend>,
    Json(request): Json<StartRequest>,
) -> Json<StartResponse> {
    backend
        .requests
        .lock()
        .expect("requests lock")
        .push(request);
    Json(StartResponse {
        assessment_id: "http-1".to_string(),
        progress_endpoint: "/api/progress/http-1".to_string(),
        assessment_endpoint: "/api/assessments/http-1".to_string(),
    })
}

async fn refuse_start() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

type EventStream = Sse<stream::Iter<std::vec::IntoIter<Result<Event, Infallible>>>>;

fn events(items: Vec<Event>) -> EventStream {
    Sse::new(stream::iter(items.into_iter().map(Ok).collect::<Vec<_>>()))
}

async fn progress(Path(id): Path<String>) -> Result<EventStream, StatusCode> {
    if id != "http-1" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(events(vec![
        Event::default().event("connected").data("{}"),
        Event::default().comment("keep-alive"),
        Event::default().data(r#"{"type":"progress","message":"instrumenting"}"#),
        Event::default().data(r#"{"type":"progress","message":"injection completed"}"#),
    ]))
}

async fn assessments(Path(id): Path<String>) -> Result<EventStream, StatusCode> {
    if id != "http-1" {
        return Err(StatusCode::NOT_FOUND);
    }
    let snapshot = json!({
        "metadata": { "_name": "App" },
        "selectedGoals": [{
            "name": "Performance",
            "weight": 0.6,
            "metrics": [{ "name": "Load time", "acronym": "LT", "value": 1.2, "unit": "s" }],
            "assessments": [{
                "timestamp": "2026-01-01T00:00:00Z",
                "globalScore": 0.75,
                "details": [{ "metric": "LT", "value": 0.75 }]
            }]
        }]
    });
    Ok(events(vec![Event::default().data(snapshot.to_string())]))
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });
    addr
}

async fn backend() -> (Backend, HttpTransport) {
    let backend = Backend::default();
    let router = Router::new()
        .route("/api/quality-model", get(quality_model))
        .route("/api/assessments", post(start))
        .route("/api/assessments/{id}", get(assessments))
        .route("/api/progress/{id}", get(progress))
        .with_state(backend.clone());
    let addr = serve(router).await;
    let transport = HttpTransport::new(&format!("http://{}/api", addr), Duration::from_secs(5))
        .expect("transport");
    (backend, transport)
}

#[tokio::test]
async fn fetches_and_builds_the_goal_tree() {
    let (_, transport) = backend().await;
    let raw = transport.fetch_quality_model().await.expect("fetch");
    let tree = build_goal_tree(&raw).expect("tree");
    assert_eq!(tree.len(), 3);
    assert!(tree.find_path("Performance/LoadTime").is_some());
}

#[tokio::test]
async fn session_runs_end_to_end_over_http() {
    let (backend, transport) = backend().await;
    let raw = transport.fetch_quality_model().await.expect("fetch");
    let mut tree = build_goal_tree(&raw).expect("tree");
    let id = tree.find_path("Performance").expect("performance");
    tree.toggle_selection(id).expect("toggle");

    let mut orch = SessionOrchestrator::new(Arc::new(transport), SessionSettings::default());
    let session_id = orch
        .start(Some(&sample_metadata()), &tree)
        .await
        .expect("start");
    assert_eq!(session_id, "http-1");
    {
        let requests = backend.requests.lock().expect("requests lock");
        assert_eq!(requests[0].selected_goals, vec!["Performance", "LoadTime"]);
        assert_eq!(requests[0].metadata, sample_metadata());
    }

    let mut seen = Vec::new();
    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(events) = orch.next_events().await {
            seen.extend(events);
        }
    })
    .await;
    assert!(drained.is_ok(), "both streams should end");

    let state = orch.state();
    assert_eq!(state.phase, Phase::Completed);
    assert_eq!(
        state.progress.snapshot(),
        vec!["instrumenting", "injection completed"]
    );
    let performance = &state.results["Performance"];
    assert_eq!(performance.metrics[0].acronym, "LT");
    assert_eq!(performance.assessments[0].global_score, 0.75);
    assert!(seen.contains(&SessionEvent::ChannelClosed {
        channel: ChannelKind::Results
    }));
    assert!(
        !seen
            .iter()
            .any(|event| matches!(event, SessionEvent::DecodeFailed { .. })),
        "named events and comments are not decoded"
    );
}

#[tokio::test]
async fn server_error_on_start_returns_to_idle() {
    let router = Router::new()
        .route("/api/quality-model", get(quality_model))
        .route("/api/assessments", post(refuse_start));
    let addr = serve(router).await;
    let transport = HttpTransport::new(&format!("http://{}/api", addr), Duration::from_secs(5))
        .expect("transport");
    let raw = transport.fetch_quality_model().await.expect("fetch");
    let mut tree = build_goal_tree(&raw).expect("tree");
    let id = tree.find_path("Usability").expect("usability");
    tree.toggle_selection(id).expect("toggle");

    let mut orch = SessionOrchestrator::new(Arc::new(transport), SessionSettings::default());
    let err = orch
        .start(Some(&sample_metadata()), &tree)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AssessError::StartFailed(TransportError::Status { status: 500, .. })
    ));
    assert_eq!(orch.phase(), Phase::Idle);
}

#[tokio::test]
async fn unknown_stream_is_a_status_error() {
    let (_, transport) = backend().await;
    let result = transport.subscribe("progress/missing").await;
    assert!(matches!(
        result,
        Err(TransportError::Status { status: 404, .. })
    ));
}
