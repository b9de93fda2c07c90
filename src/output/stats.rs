//! Statistics generation from a crawl checkpoint
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from a saved crawl database.

use crate::state::CrawlSnapshot;
use crate::storage::{CheckpointError, Checkpointer, LoadSource};
use crate::CrawlError;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlStatistics {
    /// Panoramas recorded in the visited store
    pub visited: usize,

    /// Panoramas still waiting in the frontier
    pub queued: usize,

    /// Distinct panoramas ever enqueued
    pub seen: usize,

    /// Panoramas consumed without a record (rejected, missing, failed, third-party)
    pub discarded: usize,

    /// Recorded panoramas per capture year
    pub by_year: BTreeMap<i32, usize>,

    /// Recorded panoramas without a capture date
    pub undated: usize,

    /// When the checkpoint was written, if known
    pub saved_at: Option<DateTime<Utc>>,
}

impl CrawlStatistics {
    /// Computes statistics from a stopped crawl's snapshot
    pub fn from_snapshot(snapshot: &CrawlSnapshot) -> Self {
        let mut by_year = BTreeMap::new();
        let mut undated = 0;
        for record in snapshot.visited.values() {
            match record.date {
                Some(date) => *by_year.entry(date.year).or_insert(0) += 1,
                None => undated += 1,
            }
        }

        let visited = snapshot.visited.len();
        let queued = snapshot.queue.len();
        let seen = snapshot.seen.len();

        Self {
            visited,
            queued,
            seen,
            discarded: seen.saturating_sub(visited + queued + snapshot.in_flight),
            by_year,
            undated,
            saved_at: None,
        }
    }
}

/// Loads statistics from the newest usable checkpoint
///
/// # Arguments
///
/// * `checkpointer` - Locates the session's checkpoint files
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Statistics of the saved crawl
/// * `Err(CrawlError)` - Neither checkpoint could be read
pub fn load_statistics(checkpointer: &Checkpointer) -> Result<CrawlStatistics, CrawlError> {
    let (snapshot, meta, source) = checkpointer.read().ok_or_else(|| {
        CheckpointError::Missing(checkpointer.primary_path().to_path_buf())
    })?;

    if source == LoadSource::Backup {
        tracing::warn!("Primary checkpoint unusable, showing backup statistics");
    }

    let mut stats = CrawlStatistics::from_snapshot(&snapshot);
    stats.saved_at = Some(meta.saved_at);
    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    if let Some(saved_at) = stats.saved_at {
        println!("Saved at: {}", saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!();
    }

    println!("Overview:");
    println!("  Panoramas seen: {}", stats.seen);
    println!("  Recorded: {}", stats.visited);
    println!("  Queued: {}", stats.queued);
    println!("  Discarded: {}", stats.discarded);
    println!();

    if stats.visited > 0 {
        println!("Captures by Year:");
        for (year, count) in &stats.by_year {
            let percentage = (*count as f64 / stats.visited as f64) * 100.0;
            println!("  {}: {} ({:.1}%)", year, count, percentage);
        }
        if stats.undated > 0 {
            println!("  undated: {}", stats.undated);
        }
        println!();
    }

    let status = if stats.queued == 0 {
        "complete"
    } else {
        "in progress"
    };
    println!("Crawl is {}", status);
}
