//! Shared application state for the dev server.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assessor::core::types::StartRequest;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    sessions: Arc<Mutex<HashMap<String, StartRequest>>>,
    next_id: Arc<AtomicU64>,
    /// Delay between two scripted events on a stream.
    pub tick: Duration,
}

impl AppState {
    pub fn new(tick: Duration) -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            tick,
        }
    }

    /// Register a session and return its id.
    pub fn create_session(&self, request: StartRequest) -> String {
        let id = format!("session-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.clone(), request);
        id
    }

    pub fn session(&self, id: &str) -> Option<StartRequest> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }
}
