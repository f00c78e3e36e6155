//! Bounded console history.

use std::collections::VecDeque;

/// Lines of console output kept per server.
pub const LOG_CAPACITY: usize = 10_000;

/// Ring buffer storing the most recent console lines, oldest evicted first.
#[derive(Debug)]
pub struct LogBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Add a line, removing the oldest if at capacity.
    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// The most recent `limit` lines in insertion order; everything when
    /// `limit` is zero or exceeds the buffered count.
    pub fn recent(&self, limit: usize) -> Vec<String> {
        let skip = if limit == 0 {
            0
        } else {
            self.lines.len().saturating_sub(limit)
        };
        self.lines.iter().skip(skip).cloned().collect()
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
}
