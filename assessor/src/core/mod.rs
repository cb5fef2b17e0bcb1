//! Deterministic, pure logic shared by the assessor.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod goal_tree;
pub mod progress;
pub mod reconcile;
pub mod summary;
pub mod types;
