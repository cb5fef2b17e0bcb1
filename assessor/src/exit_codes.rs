//! Stable exit codes for assessor CLI commands.

/// Command succeeded (for `run`: session ended by the server or by Ctrl-C).
pub const OK: i32 = 0;
/// Command failed due to invalid config, arguments, model payload or other errors.
pub const INVALID: i32 = 1;
/// `assessor run` could not start a session (start call failed or timed out).
pub const START_FAILED: i32 = 2;
