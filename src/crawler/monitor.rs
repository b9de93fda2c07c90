//! Progress reporting and the periodic backup clock

use crate::state::CrawlDatabase;
use std::fmt;
use std::time::{Duration, Instant};

/// Progress figures of a running crawl
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrawlStatus {
    pub visited: usize,
    pub queued: usize,
    pub in_flight: usize,

    /// Recorded panoramas per minute since the previous report
    pub per_minute: f64,

    /// Recorded panoramas per minute since the crawl (re)started
    pub average_per_minute: f64,
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Downloaded: {} | Queue: {} | In flight: {} | {:.1}/min | avg {:.1}/min",
            self.visited, self.queued, self.in_flight, self.per_minute, self.average_per_minute
        )
    }
}

fn rate_per_minute(count: usize, elapsed: Duration) -> f64 {
    let minutes = elapsed.as_secs_f64() / 60.0;
    if minutes <= 0.0 {
        0.0
    } else {
        count as f64 / minutes
    }
}

/// Computes and logs [`CrawlStatus`] at a fixed interval
#[derive(Debug)]
pub struct Monitor {
    interval: Duration,
    started: Instant,
    visited_at_start: usize,
    last_report: Instant,
    visited_at_last_report: usize,
}

impl Monitor {
    pub fn new(interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            started: now,
            visited_at_start: 0,
            last_report: now,
            visited_at_last_report: 0,
        }
    }

    /// Resets both rate windows, counting from `visited`
    pub fn restart(&mut self, visited: usize) {
        let now = Instant::now();
        self.started = now;
        self.visited_at_start = visited;
        self.last_report = now;
        self.visited_at_last_report = visited;
    }

    pub fn status(&self, db: &CrawlDatabase) -> CrawlStatus {
        let counts = db.counts();
        let now = Instant::now();

        CrawlStatus {
            visited: counts.visited,
            queued: counts.queued,
            in_flight: counts.in_flight,
            per_minute: rate_per_minute(
                counts.visited.saturating_sub(self.visited_at_last_report),
                now.duration_since(self.last_report),
            ),
            average_per_minute: rate_per_minute(
                counts.visited.saturating_sub(self.visited_at_start),
                now.duration_since(self.started),
            ),
        }
    }

    pub fn is_due(&self) -> bool {
        self.last_report.elapsed() >= self.interval
    }

    /// Logs the current status and starts a new per-minute window
    pub fn report(&mut self, db: &CrawlDatabase) -> CrawlStatus {
        let status = self.status(db);
        tracing::info!("{}", status);

        self.last_report = Instant::now();
        self.visited_at_last_report = status.visited;
        status
    }
}

/// Tells the control loop when the next backup is due
#[derive(Debug)]
pub struct BackupTimer {
    interval: Duration,
    last: Instant,
}

impl BackupTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    pub fn is_due(&self) -> bool {
        self.last.elapsed() >= self.interval
    }

    pub fn reset(&mut self) {
        self.last = Instant::now();
    }
}
