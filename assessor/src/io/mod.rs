//! I/O collaborators for assessor commands.

pub mod config;
pub mod model;
pub mod sse;
pub mod transport;
