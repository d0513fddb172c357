use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Kind of event recorded in the operator log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Start,
    Pause,
    Reconfigure,
    Fetch,
    Batch,
    RateLimit,
    PassComplete,
    Persist,
}

/// One operator-visible log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlLogEntry {
    pub timestamp: DateTime<Utc>,
    pub action: LogAction,
    pub details: String,
    pub success: bool,
}

/// Append-only ring buffer keeping the most recent `capacity` entries
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: VecDeque<CrawlLogEntry>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an entry, evicting the oldest one when full
    pub fn push(&mut self, action: LogAction, details: impl Into<String>, success: bool) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(CrawlLogEntry {
            timestamp: Utc::now(),
            action,
            details: details.into(),
            success,
        });
    }

    /// Returns up to `limit` entries, newest first
    pub fn recent(&self, limit: usize) -> Vec<CrawlLogEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
