//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `EngineState`: lifecycle of the crawl engine (idle, running, paused, error)
//! - `CrawlPosition`: where the current pass is and when passes ran
//! - `LogBuffer`: bounded, most-recent-first operator log

mod engine_state;
mod log_buffer;
mod position;

// Re-export main types
pub use engine_state::EngineState;
pub use log_buffer::{CrawlLogEntry, LogAction, LogBuffer};
pub use position::CrawlPosition;
