//! Crawl state tracking
//!
//! This module holds everything a crawl mutates while it runs:
//! - node identifiers and the records kept for visited panoramas
//! - the deduplicating frontier queue and its in-flight counter
//! - the visited store
//! - the crawl database that ties them together and snapshots them

mod database;
mod frontier;
mod visited;

pub use database::{CrawlCounts, CrawlDatabase, CrawlSnapshot};
pub use frontier::{Frontier, QueueItem};
pub use visited::VisitedStore;

use crate::area::LatLng;
use std::fmt;

/// Opaque identifier of a crawlable panorama
///
/// Equality is byte-exact; the identifier is the dedup key everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Year and month a panorama was captured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CaptureDate {
    pub year: i32,
    pub month: u32,
}

impl fmt::Display for CaptureDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// What is kept for every admitted panorama
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub location: LatLng,
    pub date: Option<CaptureDate>,
}
