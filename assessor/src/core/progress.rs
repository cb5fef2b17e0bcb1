//! Bounded FIFO of progress log lines.

use std::collections::VecDeque;

/// Default number of progress lines kept per session.
pub const DEFAULT_PROGRESS_CAPACITY: usize = 100;

/// Arrival-ordered log lines; the oldest line is evicted once capacity is exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for ProgressBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_CAPACITY)
    }
}

impl ProgressBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(DEFAULT_PROGRESS_CAPACITY * 10)),
            capacity,
        }
    }

    /// Push `line` at the tail, evicting from the head while over capacity.
    pub fn append(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    /// Copy of the current lines, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.lines.back().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
