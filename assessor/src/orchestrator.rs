//! Session lifecycle: start call, both push channels, and the folded view state.
//!
//! ```text
//! Idle ──start──▶ Starting ──ok──▶ Running ──"injection completed"──▶ Completed
//!                    │                 │                                  │
//!                    └─err─▶ Failed ─▶ Idle         stop ─────────────────┴─▶ Stopped
//! ```
//!
//! The orchestrator is driven by its owner: [`SessionOrchestrator::start`]
//! resolves the start call, then [`SessionOrchestrator::next_events`] waits on
//! both channels and applies one inbound item at a time. Every mutation goes
//! through `&mut self`, so state changes are serialized by ownership. Owners
//! sharing an orchestrator across tasks wrap it in a single mutex.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::channel::{ChannelEvent, StreamChannel};
use crate::core::goal_tree::GoalTree;
use crate::core::progress::{DEFAULT_PROGRESS_CAPACITY, ProgressBuffer};
use crate::core::reconcile::{ResultMap, reconcile};
use crate::core::types::{
    AppMetadata, AssessmentSnapshot, COMPLETION_SENTINEL, ChannelKind, Phase, ProgressEvent,
    ProgressKind, StartRequest, StartResponse,
};
use crate::error::AssessError;
use crate::io::transport::Transport;

/// Tunables for one orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    pub progress_capacity: usize,
    /// Deadline for the start call; `None` waits indefinitely.
    pub start_timeout: Option<Duration>,
    pub max_consecutive_decode_failures: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            progress_capacity: DEFAULT_PROGRESS_CAPACITY,
            start_timeout: Some(Duration::from_secs(30)),
            max_consecutive_decode_failures: 10,
        }
    }
}

/// The single live session view owned by an orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: Phase,
    pub session_id: Option<String>,
    pub metadata: Option<AppMetadata>,
    /// Copy of the goal selection taken when the session was started.
    pub selected_goal_names: Vec<String>,
    pub progress: ProgressBuffer,
    pub results: Arc<ResultMap>,
}

impl SessionState {
    fn idle(progress_capacity: usize) -> Self {
        Self {
            phase: Phase::Idle,
            session_id: None,
            metadata: None,
            selected_goal_names: Vec::new(),
            progress: ProgressBuffer::new(progress_capacity),
            results: Arc::new(ResultMap::new()),
        }
    }
}

/// Notification published for every observable state change.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PhaseChanged { from: Phase, to: Phase },
    ProgressAppended { line: String },
    /// Goals whose results were replaced, in snapshot order.
    ResultsUpdated { goals: Vec<String> },
    /// A results snapshot was dropped; prior results are untouched.
    SnapshotRejected { reason: String },
    DecodeFailed { channel: ChannelKind, error: String },
    ChannelFailed { channel: ChannelKind, error: String },
    ChannelClosed { channel: ChannelKind },
}

/// Acknowledgment of [`SessionOrchestrator::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// An active or completed session was torn down.
    Stopped,
    /// Nothing to stop; state is unchanged.
    NotActive,
}

struct SessionChannels {
    progress: StreamChannel<ProgressEvent>,
    results: StreamChannel<AssessmentSnapshot>,
}

enum Inbound {
    Progress(ChannelEvent<ProgressEvent>),
    Results(ChannelEvent<AssessmentSnapshot>),
}

pub struct SessionOrchestrator<T: Transport> {
    transport: Arc<T>,
    settings: SessionSettings,
    state: SessionState,
    channels: Option<SessionChannels>,
    events: broadcast::Sender<SessionEvent>,
}

impl<T: Transport> SessionOrchestrator<T> {
    pub fn new(transport: Arc<T>, settings: SessionSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            state: SessionState::idle(settings.progress_capacity),
            transport,
            settings,
            channels: None,
            events,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Receive every [`SessionEvent`] published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Whether either channel is still delivering.
    pub fn has_open_channels(&self) -> bool {
        self.channels
            .as_ref()
            .is_some_and(|c| c.progress.is_open() || c.results.is_open())
    }

    /// Start a session for `metadata` and the goals currently selected in `goals`.
    ///
    /// Rejected without side effects while a session is starting or running,
    /// or when metadata is absent or the selection is empty. A start-call
    /// failure passes through `Failed` back to `Idle` and is returned, so the
    /// caller may retry immediately. Returns the session id.
    #[instrument(skip_all, fields(phase = %self.state.phase))]
    pub async fn start(
        &mut self,
        metadata: Option<&AppMetadata>,
        goals: &GoalTree,
    ) -> Result<String, AssessError> {
        if self.state.phase.is_active() {
            return Err(AssessError::SessionAlreadyActive(self.state.phase));
        }
        let metadata = metadata.ok_or_else(|| {
            AssessError::InvalidRequest("application metadata is required".to_string())
        })?;
        let missing = metadata.missing_fields();
        if !missing.is_empty() {
            return Err(AssessError::InvalidRequest(format!(
                "metadata is missing {}",
                missing.join(", ")
            )));
        }
        let selected = goals.selected_names().to_vec();
        if selected.is_empty() {
            return Err(AssessError::InvalidRequest(
                "select at least one goal".to_string(),
            ));
        }

        if let Some(mut previous) = self.channels.take() {
            debug!("tearing down previous session");
            previous.progress.close();
            previous.results.close();
        }
        let from = self.state.phase;
        self.state = SessionState::idle(self.settings.progress_capacity);
        self.state.phase = from;
        self.state.metadata = Some(metadata.clone());
        self.state.selected_goal_names = selected.clone();
        self.transition(Phase::Starting);

        let request = StartRequest {
            metadata: metadata.clone(),
            selected_goals: selected,
        };
        let response = match self.request_start(&request).await {
            Ok(response) => response,
            Err(err) => {
                self.fail_start(&err);
                return Err(err);
            }
        };

        let channels = match self.open_channels(&response) {
            Ok(channels) => channels,
            Err(err) => {
                self.fail_start(&err);
                return Err(err);
            }
        };
        let session_id = response.assessment_id;
        self.state.session_id = Some(session_id.clone());
        self.channels = Some(channels);
        self.transition(Phase::Running);
        info!(session_id = %session_id, "session running");
        Ok(session_id)
    }

    async fn request_start(&self, request: &StartRequest) -> Result<StartResponse, AssessError> {
        let call = self.transport.start_assessment(request);
        match self.settings.start_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome.map_err(AssessError::StartFailed),
                Err(_) => Err(AssessError::StartTimedOut(limit)),
            },
            None => call.await.map_err(AssessError::StartFailed),
        }
    }

    fn open_channels(&self, response: &StartResponse) -> Result<SessionChannels, AssessError> {
        let id = response.assessment_id.as_str();
        let progress_endpoint = endpoint_or(&response.progress_endpoint, || format!("progress/{id}"));
        let results_endpoint =
            endpoint_or(&response.assessment_endpoint, || format!("assessments/{id}"));
        let limit = self.settings.max_consecutive_decode_failures;

        let progress = StreamChannel::open(
            Arc::clone(&self.transport),
            ChannelKind::Progress,
            id,
            &progress_endpoint,
            limit,
        )?;
        let results = StreamChannel::open(
            Arc::clone(&self.transport),
            ChannelKind::Results,
            id,
            &results_endpoint,
            limit,
        )?;
        Ok(SessionChannels { progress, results })
    }

    fn fail_start(&mut self, err: &AssessError) {
        warn!(error = %err, "start failed");
        self.transition(Phase::Failed);
        self.state = SessionState {
            phase: Phase::Failed,
            ..SessionState::idle(self.settings.progress_capacity)
        };
        self.transition(Phase::Idle);
    }

    /// Wait for the next inbound item on either channel and apply it.
    ///
    /// Returns the events the item produced, or `None` when no session is
    /// open or both channels have closed. Cancel-safe.
    pub async fn next_events(&mut self) -> Option<Vec<SessionEvent>> {
        loop {
            let channels = self.channels.as_mut()?;
            let inbound = tokio::select! {
                Some(event) = channels.progress.recv() => Inbound::Progress(event),
                Some(event) = channels.results.recv() => Inbound::Results(event),
                else => return None,
            };
            let events = match inbound {
                Inbound::Progress(event) => self.apply_progress(event),
                Inbound::Results(event) => self.apply_results(event),
            };
            if !events.is_empty() {
                return Some(events);
            }
        }
    }

    fn apply_progress(&mut self, event: ChannelEvent<ProgressEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        match event {
            ChannelEvent::Message(message) => {
                if message.kind != ProgressKind::Progress {
                    debug!("ignoring non-progress message");
                    return events;
                }
                let Some(line) = message.message else {
                    return events;
                };
                debug!(line = %line, "progress");
                let completed = line.contains(COMPLETION_SENTINEL);
                self.state.progress.append(line.clone());
                events.push(self.emit(SessionEvent::ProgressAppended { line }));
                if completed && self.state.phase == Phase::Running {
                    events.push(self.transition(Phase::Completed));
                }
            }
            other => events.extend(self.channel_status(ChannelKind::Progress, other)),
        }
        events
    }

    fn apply_results(&mut self, event: ChannelEvent<AssessmentSnapshot>) -> Vec<SessionEvent> {
        match event {
            ChannelEvent::Message(snapshot) => match reconcile(&self.state.results, &snapshot) {
                Ok(reconciled) if reconciled.updated.is_empty() => Vec::new(),
                Ok(reconciled) => {
                    debug!(goals = ?reconciled.updated, "results reconciled");
                    self.state.results = reconciled.results;
                    vec![self.emit(SessionEvent::ResultsUpdated {
                        goals: reconciled.updated,
                    })]
                }
                Err(err) => {
                    warn!(error = %err, "dropping results snapshot");
                    vec![self.emit(SessionEvent::SnapshotRejected {
                        reason: err.to_string(),
                    })]
                }
            },
            other => self
                .channel_status(ChannelKind::Results, other)
                .into_iter()
                .collect(),
        }
    }

    fn channel_status<M>(
        &self,
        channel: ChannelKind,
        event: ChannelEvent<M>,
    ) -> Option<SessionEvent> {
        let event = match event {
            ChannelEvent::Message(_) => return None,
            ChannelEvent::DecodeFailed { error, .. } => {
                SessionEvent::DecodeFailed { channel, error }
            }
            ChannelEvent::Failed(err) => {
                warn!(channel = %channel, error = %err, "channel failed");
                SessionEvent::ChannelFailed {
                    channel,
                    error: err.to_string(),
                }
            }
            ChannelEvent::Closed => {
                info!(channel = %channel, "channel closed by server");
                SessionEvent::ChannelClosed { channel }
            }
        };
        Some(self.emit(event))
    }

    /// Cancel the session: close both channels and reset to idle defaults.
    ///
    /// Accepted while starting, running or completed. Calling it again is a
    /// no-op returning [`StopOutcome::NotActive`].
    pub fn stop(&mut self) -> StopOutcome {
        if !matches!(
            self.state.phase,
            Phase::Starting | Phase::Running | Phase::Completed
        ) {
            debug!(phase = %self.state.phase, "stop ignored");
            return StopOutcome::NotActive;
        }

        if let Some(mut channels) = self.channels.take() {
            channels.progress.close();
            channels.results.close();
        }
        let from = self.state.phase;
        self.state = SessionState {
            phase: from,
            ..SessionState::idle(self.settings.progress_capacity)
        };
        self.transition(Phase::Stopped);
        info!("session stopped");
        StopOutcome::Stopped
    }

    fn transition(&mut self, to: Phase) -> SessionEvent {
        let from = self.state.phase;
        self.state.phase = to;
        info!(from = %from, to = %to, "phase transition");
        self.emit(SessionEvent::PhaseChanged { from, to })
    }

    fn emit(&self, event: SessionEvent) -> SessionEvent {
        // No subscribers is fine.
        let _ = self.events.send(event.clone());
        event
    }
}

impl<T: Transport> Drop for SessionOrchestrator<T> {
    fn drop(&mut self) {
        if self.channels.is_some() {
            self.stop();
        }
    }
}

fn endpoint_or(provided: &str, fallback: impl FnOnce() -> String) -> String {
    if provided.trim().is_empty() {
        fallback()
    } else {
        provided.to_string()
    }
}
