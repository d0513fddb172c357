use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Progress through the ID range
///
/// Owned by the engine loop and persisted after every batch. `current_id` is the next ID
/// to attempt; every ID below it in the current pass has been resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlPosition {
    /// Next ID to attempt
    pub current_id: u64,

    /// When the last batch was persisted
    pub last_run_timestamp: Option<DateTime<Utc>>,

    /// When the current pass began
    pub pass_started_at: Option<DateTime<Utc>>,

    /// When the most recent full pass finished
    pub last_completed_run: Option<DateTime<Utc>>,

    /// When the next pass is due; set only between passes
    pub next_scheduled_run: Option<DateTime<Utc>>,
}

impl CrawlPosition {
    /// Creates a fresh position at the start of a range
    pub fn new(start: u64) -> Self {
        Self {
            current_id: start,
            last_run_timestamp: None,
            pass_started_at: None,
            last_completed_run: None,
            next_scheduled_run: None,
        }
    }

    /// Returns true while the engine is waiting between two passes
    pub fn is_awaiting_next_pass(&self) -> bool {
        self.next_scheduled_run.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_position() {
        let position = CrawlPosition::new(100);
        assert_eq!(position.current_id, 100);
        assert!(position.last_run_timestamp.is_none());
        assert!(!position.is_awaiting_next_pass());
    }

    #[test]
    fn test_awaiting_next_pass() {
        let mut position = CrawlPosition::new(1);
        position.next_scheduled_run = Some(Utc::now());
        assert!(position.is_awaiting_next_pass());
    }
}
