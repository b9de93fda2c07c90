//! Primary and backup checkpoints of one crawl session

use crate::config::OutputConfig;
use crate::state::{CrawlDatabase, CrawlSnapshot};
use crate::storage::sqlite::{read_snapshot, temp_path, write_snapshot, CheckpointMeta};
use crate::storage::{CheckpointError, CheckpointResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Where a loaded crawl state came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Primary,
    Backup,
    /// Neither checkpoint was usable; the database was left empty
    Fresh,
}

/// Saves and loads the checkpoints of a crawl session
///
/// The primary checkpoint is overwritten by every save. The backup is only
/// replaced by [`Checkpointer::rotate_backup`], which copies a primary that
/// was just written successfully.
#[derive(Debug, Clone)]
pub struct Checkpointer {
    primary: PathBuf,
    backup: PathBuf,
    config_hash: Option<String>,
}

impl Checkpointer {
    pub fn new(primary: impl Into<PathBuf>, backup: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            backup: backup.into(),
            config_hash: None,
        }
    }

    /// Uses the session paths of an output configuration
    pub fn from_output(output: &OutputConfig) -> Self {
        Self::new(output.checkpoint_path(), output.backup_path())
    }

    /// Stores `hash` with every checkpoint and compares it on load
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn primary_path(&self) -> &Path {
        &self.primary
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup
    }

    /// Returns true if either checkpoint file exists
    pub fn exists(&self) -> bool {
        self.primary.exists() || self.backup.exists()
    }

    /// Writes the database to the primary checkpoint
    ///
    /// Fails with [`CheckpointError::InFlight`] unless every worker is
    /// stopped; the previous primary is kept intact in that case.
    pub fn save(&self, db: &CrawlDatabase) -> CheckpointResult<CheckpointMeta> {
        let snapshot = db.snapshot();
        let meta = write_snapshot(&self.primary, &snapshot, self.config_hash.as_deref())?;

        tracing::debug!(
            "Checkpoint saved to {}: {} visited, {} queued",
            self.primary.display(),
            snapshot.visited.len(),
            snapshot.queue.len()
        );

        Ok(meta)
    }

    /// Replaces the backup with a copy of the primary checkpoint
    pub fn rotate_backup(&self) -> CheckpointResult<()> {
        if !self.primary.exists() {
            return Err(CheckpointError::Missing(self.primary.clone()));
        }

        let tmp = temp_path(&self.backup);
        if let Err(e) = fs::copy(&self.primary, &tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(e.into());
        }
        fs::rename(&tmp, &self.backup)?;

        tracing::debug!("Backup rotated to {}", self.backup.display());
        Ok(())
    }

    /// Reads the newest usable checkpoint without touching any database
    pub fn read(&self) -> Option<(CrawlSnapshot, CheckpointMeta, LoadSource)> {
        for (path, source) in [
            (&self.primary, LoadSource::Primary),
            (&self.backup, LoadSource::Backup),
        ] {
            match read_snapshot(path) {
                Ok((snapshot, meta)) => return Some((snapshot, meta, source)),
                Err(CheckpointError::Missing(_)) => {
                    tracing::debug!("No checkpoint at {}", path.display());
                }
                Err(e) => {
                    tracing::warn!("Ignoring checkpoint {}: {}", path.display(), e);
                }
            }
        }
        None
    }

    /// Restores the database from the primary checkpoint, else the backup
    ///
    /// When neither can be read the database is left as it was and
    /// [`LoadSource::Fresh`] is returned.
    pub fn load(&self, db: &CrawlDatabase) -> LoadSource {
        let Some((snapshot, meta, source)) = self.read() else {
            return LoadSource::Fresh;
        };

        if let (Some(expected), Some(stored)) = (&self.config_hash, &meta.config_hash) {
            if expected != stored {
                tracing::warn!(
                    "Configuration changed since the checkpoint saved at {}; resuming anyway",
                    meta.saved_at
                );
            }
        }

        tracing::info!(
            "Resuming from {:?} checkpoint saved at {}: {} visited, {} queued",
            source,
            meta.saved_at,
            snapshot.visited.len(),
            snapshot.queue.len()
        );

        db.restore(snapshot);
        source
    }
}
