//! Configuration module for Panocrawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use panocrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("prague.toml")).unwrap();
//! println!("Crawler will use {} workers", config.crawler.workers);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{AreaConfig, Config, CrawlerConfig, FetcherConfig, OutputConfig, SeedConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
