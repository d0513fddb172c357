//! Configuration module for Bazaar-Crawler
//!
//! This module handles loading, parsing, and validating the TOML settings file, and defines
//! the runtime-reconfigurable [`CrawlConfig`].
//!
//! # Example
//!
//! ```no_run
//! use bazaar_crawler::config::load_settings;
//! use std::path::Path;
//!
//! let settings = load_settings(Path::new("crawler.toml")).unwrap();
//! println!("Crawling ids {:?}", settings.crawl.id_range);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, CrawlConfig, EngineConfig, IdRange, Settings, StorageConfig};

// Re-export parser and validation functions
pub use parser::{compute_config_hash, load_settings, parse_settings};
pub use validation::{validate_crawl_config, MAX_CONCURRENT_REQUESTS};
