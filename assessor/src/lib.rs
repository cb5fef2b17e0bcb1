//! Client-side driver for server-executed quality assessment sessions.
//!
//! A session is started with a single request/response call and then fed by
//! two independent server-push channels (execution progress and incremental
//! assessment results). The crate is split the same way as the data flows:
//!
//! - **[`core`]**: Pure, deterministic logic (goal tree, progress buffer,
//!   result reconciliation). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (configuration, HTTP transport,
//!   SSE decoding). The [`io::transport::Transport`] trait is the seam tests
//!   replace with a scripted implementation.
//!
//! [`channel`] wraps one push subscription, and [`orchestrator`] owns the
//! session state machine that ties both channels to one session id.

pub mod channel;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
