//! Error taxonomy for assessment sessions.
//!
//! Local guard violations (`InvalidRequest`, `SessionAlreadyActive`) never
//! change session state. Bad server payloads (`MalformedModel`,
//! `MalformedSnapshot`) drop only the offending payload. Transport failures
//! are fatal to the channel that saw them and nothing else.

use std::time::Duration;

use thiserror::Error;

use crate::core::goal_tree::GoalId;
use crate::core::types::{ChannelKind, Phase};

/// Errors surfaced by the goal tree, channels and the session orchestrator.
#[derive(Debug, Error)]
pub enum AssessError {
    /// Missing metadata or empty goal selection.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// `start` was called while another session is starting or running.
    #[error("a session is already active (phase {0})")]
    SessionAlreadyActive(Phase),

    /// A channel was opened without a session id.
    #[error("{0} channel opened without a session id")]
    SessionIdMissing(ChannelKind),

    /// The quality model payload could not be turned into a goal tree.
    #[error("malformed quality model: {0}")]
    MalformedModel(String),

    /// A results snapshot was structurally invalid and has been dropped.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// A goal id that does not belong to this tree.
    #[error("unknown goal {0}")]
    UnknownGoal(GoalId),

    /// The start call failed; the session is back to idle.
    #[error("failed to start assessment: {0}")]
    StartFailed(#[source] TransportError),

    /// The start call did not resolve in time; the session is back to idle.
    #[error("start request timed out after {0:?}")]
    StartTimedOut(Duration),
}

/// Failures of the external request/response and push primitives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Connecting or reading from the server failed.
    #[error("connection error: {0}")]
    Connection(String),

    /// A response body could not be read or decoded.
    #[error("invalid response body: {0}")]
    Body(String),

    /// An endpoint could not be resolved to a URL.
    #[error("invalid url '{0}'")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return TransportError::Status {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
                status: status.as_u16(),
            };
        }
        if err.is_decode() || err.is_body() {
            return TransportError::Body(err.to_string());
        }
        TransportError::Connection(err.to_string())
    }
}

/// Fatal channel conditions, reported once before the channel closes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The underlying subscription failed (connect error, dropped stream).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Too many consecutive frames failed to decode.
    #[error("{failures} consecutive frames failed to decode (limit {limit})")]
    DecodeThresholdExceeded { failures: u32, limit: u32 },
}
