//! Test-only transport and fixtures.
//!
//! [`ScriptedTransport`] answers the start call from a queue of scripted
//! responses and serves each endpoint's frames from an in-memory feed. Frames
//! may be queued before the subscription exists; they are delivered in order
//! once a channel subscribes. Live subscriptions are counted so tests can
//! assert that every subscription is released.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::goal_tree::{GoalDefinition, GoalTree, QualityModel};
use crate::core::types::{AppMetadata, GoalAssessment, GoalResult, StartRequest, StartResponse};
use crate::error::TransportError;
use crate::io::transport::{FrameStream, Transport};

type Frame = Result<String, TransportError>;

#[derive(Default)]
struct Feed {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    rx: Option<mpsc::UnboundedReceiver<Frame>>,
    refusal: Option<TransportError>,
}

impl Feed {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Some(tx),
            rx: Some(rx),
            refusal: None,
        }
    }
}

/// Decrements the live-subscription counter when a served stream is dropped.
struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct ScriptedTransport {
    model: Mutex<Option<Value>>,
    starts: Mutex<VecDeque<Result<StartResponse, TransportError>>>,
    start_delay: Mutex<Option<Duration>>,
    requests: Mutex<Vec<StartRequest>>,
    feeds: Mutex<HashMap<String, Feed>>,
    live: Arc<AtomicUsize>,
    opened: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `model` from `fetch_quality_model`.
    pub fn set_model(&self, model: Value) {
        *lock(&self.model) = Some(model);
    }

    /// Queue the outcome of the next start call.
    pub fn push_start(&self, outcome: Result<StartResponse, TransportError>) {
        lock(&self.starts).push_back(outcome);
    }

    /// Queue a successful start answer with default endpoints.
    pub fn accept_start(&self, assessment_id: &str) {
        self.push_start(Ok(StartResponse {
            assessment_id: assessment_id.to_string(),
            ..StartResponse::default()
        }));
    }

    /// Delay every start call before answering.
    pub fn set_start_delay(&self, delay: Duration) {
        *lock(&self.start_delay) = Some(delay);
    }

    /// Every start request received so far.
    pub fn requests(&self) -> Vec<StartRequest> {
        lock(&self.requests).clone()
    }

    fn with_feed<R>(&self, endpoint: &str, f: impl FnOnce(&mut Feed) -> R) -> R {
        let mut feeds = lock(&self.feeds);
        let feed = feeds.entry(endpoint.to_string()).or_insert_with(Feed::new);
        f(feed)
    }

    fn push_frame(&self, endpoint: &str, frame: Frame) {
        self.with_feed(endpoint, |feed| {
            if let Some(tx) = &feed.tx {
                // The subscriber may already be gone; late frames are dropped.
                let _ = tx.send(frame);
            }
        });
    }

    /// Queue a JSON-encoded frame on `endpoint`.
    pub fn send<S: Serialize>(&self, endpoint: &str, payload: &S) {
        let data = serde_json::to_string(payload).unwrap_or_default();
        self.push_frame(endpoint, Ok(data));
    }

    /// Queue a raw frame on `endpoint`.
    pub fn send_raw(&self, endpoint: &str, data: &str) {
        self.push_frame(endpoint, Ok(data.to_string()));
    }

    /// Queue a transport failure on `endpoint`.
    pub fn fail(&self, endpoint: &str, err: TransportError) {
        self.push_frame(endpoint, Err(err));
    }

    /// End the stream on `endpoint` after the queued frames.
    pub fn end(&self, endpoint: &str) {
        self.with_feed(endpoint, |feed| {
            feed.tx = None;
        });
    }

    /// Make subscriptions to `endpoint` fail.
    pub fn refuse(&self, endpoint: &str, err: TransportError) {
        self.with_feed(endpoint, |feed| {
            feed.refusal = Some(err);
        });
    }

    /// Whether a subscriber is currently attached to `endpoint`.
    pub fn is_subscribed(&self, endpoint: &str) -> bool {
        self.with_feed(endpoint, |feed| {
            feed.tx.as_ref().is_some_and(|tx| !tx.is_closed()) && feed.rx.is_none()
        })
    }

    pub fn subscriptions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn live_subscriptions(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Wait (bounded) for background pumps to reach `expected` live subscriptions.
    pub async fn settle_live(&self, expected: usize) -> usize {
        for _ in 0..200 {
            if self.live_subscriptions() == expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.live_subscriptions()
    }

    /// Wait (bounded) until `expected` subscriptions have been opened in total.
    pub async fn settle_opened(&self, expected: usize) -> usize {
        for _ in 0..200 {
            if self.subscriptions_opened() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.subscriptions_opened()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch_quality_model(&self) -> Result<Value, TransportError> {
        lock(&self.model).clone().ok_or(TransportError::Status {
            url: "quality-model".to_string(),
            status: 404,
        })
    }

    async fn start_assessment(
        &self,
        request: &StartRequest,
    ) -> Result<StartResponse, TransportError> {
        lock(&self.requests).push(request.clone());
        let delay = *lock(&self.start_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = lock(&self.starts).pop_front();
        outcome.unwrap_or_else(|| {
            Err(TransportError::Connection(
                "no scripted start response".to_string(),
            ))
        })
    }

    async fn subscribe(&self, endpoint: &str) -> Result<FrameStream, TransportError> {
        let mut rx = self.with_feed(endpoint, |feed| {
            if let Some(err) = &feed.refusal {
                return Err(err.clone());
            }
            feed.rx.take().ok_or_else(|| {
                TransportError::Connection(format!("{} already subscribed", endpoint))
            })
        })?;

        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live.fetch_add(1, Ordering::SeqCst);
        let guard = ReleaseGuard(Arc::clone(&self.live));

        let stream = async_stream::stream! {
            let _guard = guard;
            while let Some(frame) = rx.recv().await {
                yield frame;
            }
        };
        Ok(stream.boxed())
    }
}

/// Metadata with every required field filled.
pub fn sample_metadata() -> AppMetadata {
    AppMetadata {
        name: "App".to_string(),
        app_type: "Web".to_string(),
        technology: "X".to_string(),
        path: "/p".to_string(),
        url: "http://x".to_string(),
    }
}

/// `Performance: [LoadTime, Interactivity]` plus an unrelated `Usability` goal.
pub fn performance_model() -> QualityModel {
    QualityModel {
        goals: vec![
            GoalDefinition::new(
                "Performance",
                vec![
                    GoalDefinition::new("LoadTime", Vec::new()),
                    GoalDefinition::new("Interactivity", Vec::new()),
                ],
            ),
            GoalDefinition::new("Usability", Vec::new()),
        ],
    }
}

/// Tree built from [`performance_model`] with the given paths toggled.
pub fn tree_with_selection(paths: &[&str]) -> GoalTree {
    let mut tree = GoalTree::build(&performance_model()).expect("build test tree");
    for path in paths {
        let id = tree.find_path(path).expect("path in test tree");
        tree.toggle_selection(id).expect("toggle");
    }
    tree
}

/// A goal result carrying one assessment with `score`.
pub fn goal_result(name: &str, score: f64) -> GoalResult {
    GoalResult {
        name: name.to_string(),
        description: format!("{} goal", name),
        weight: 1.0,
        metrics: Vec::new(),
        assessments: vec![GoalAssessment {
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            global_score: score,
            details: Vec::new(),
        }],
    }
}
