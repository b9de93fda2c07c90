//! Checkpoint persistence
//!
//! This module writes and reads crawl database snapshots:
//! - SQLite checkpoint files written atomically via a temporary sibling
//! - primary and backup checkpoint paths for one crawl session
//! - loading with fallback from the primary to the backup file

mod checkpoint;
mod schema;
mod sqlite;

pub use checkpoint::{Checkpointer, LoadSource};
pub use sqlite::{read_snapshot, write_snapshot, CheckpointMeta};

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while saving or loading checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Refusing to checkpoint: {0} panoramas still in flight")]
    InFlight(usize),

    #[error("Checkpoint not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("Checkpoint {} is unusable: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;
