//! Panocrawl: a breadth-first street panorama crawler
//!
//! This crate walks the graph of street-level panoramas linked by spatial and
//! temporal adjacency, keeping only the panoramas that fall inside a
//! geographic area. The crawl survives interruption: its state is
//! checkpointed to disk with a rolling backup and can be resumed later.

pub mod area;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Panocrawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] storage::CheckpointError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("No panorama found near {lat:.6}, {lng:.6}")]
    SeedNotFound { lat: f64, lng: f64 },

    #[error("Crawl was neither started nor resumed")]
    NotStarted,

    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

/// Result type alias for Panocrawl operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use area::{Admission, LatLng};
pub use config::Config;
pub use crawler::{Crawler, Fetcher};
pub use state::{CrawlDatabase, NodeId, NodeRecord};
