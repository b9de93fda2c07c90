//! The crawl database: frontier, visited store and in-flight counter
//!
//! This is the unit of persistence and the synchronization boundary of a
//! crawl. Workers only go through the methods here; they never hold on to
//! the inner containers across an await.

use crate::state::{Frontier, NodeId, NodeRecord, QueueItem, VisitedStore};
use std::collections::{HashMap, HashSet};

/// Point-in-time counters of a crawl database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrawlCounts {
    /// Panoramas recorded in the visited store
    pub visited: usize,

    /// Panoramas waiting in the frontier
    pub queued: usize,

    /// Panoramas dequeued but not yet finished
    pub in_flight: usize,

    /// Distinct panoramas ever enqueued
    pub seen: usize,
}

impl CrawlCounts {
    /// Panoramas that were consumed without producing a record
    ///
    /// Covers rejected, failed and unrecordable panoramas.
    pub fn discarded(&self) -> usize {
        self.seen
            .saturating_sub(self.queued + self.in_flight + self.visited)
    }
}

/// Plain-data copy of a crawl database
///
/// This is what checkpoints store and restore. It holds no locks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlSnapshot {
    pub queue: Vec<NodeId>,
    pub seen: HashSet<NodeId>,
    pub visited: HashMap<NodeId, NodeRecord>,
    pub in_flight: usize,
}

/// Frontier plus visited store, shared by every worker of a crawl
#[derive(Debug, Default)]
pub struct CrawlDatabase {
    frontier: Frontier,
    visited: VisitedStore,
}

impl CrawlDatabase {
    /// Creates an empty database
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a database whose frontier holds only `seed`
    pub fn seeded(seed: NodeId) -> Self {
        let db = Self::new();
        db.enqueue(seed);
        db
    }

    /// Builds a database from a snapshot
    ///
    /// The in-flight count always starts at zero: nothing is being worked on
    /// in a freshly built database.
    pub fn from_snapshot(snapshot: CrawlSnapshot) -> Self {
        Self {
            frontier: Frontier::from_parts(snapshot.queue, snapshot.seen),
            visited: VisitedStore::from_records(snapshot.visited),
        }
    }

    pub fn enqueue(&self, id: NodeId) -> bool {
        self.frontier.enqueue(id)
    }

    pub async fn dequeue(&self) -> QueueItem {
        self.frontier.dequeue().await
    }

    pub fn try_dequeue(&self) -> Option<QueueItem> {
        self.frontier.try_dequeue()
    }

    pub fn prepend_sentinel(&self) {
        self.frontier.prepend_sentinel()
    }

    pub fn clear_sentinels(&self) -> usize {
        self.frontier.clear_sentinels()
    }

    pub fn task_done(&self) {
        self.frontier.task_done()
    }

    /// Stores the record of an admitted panorama
    pub fn record(&self, id: NodeId, record: NodeRecord) {
        self.visited.add(id, record)
    }

    /// Stores a record and marks its dequeue done as one step
    pub fn record_done(&self, id: NodeId, record: NodeRecord) {
        self.frontier.finish_with(|| self.visited.add(id, record))
    }

    pub fn has_visited(&self, id: &NodeId) -> bool {
        self.visited.has(id)
    }

    pub fn has_seen(&self, id: &NodeId) -> bool {
        self.frontier.has_seen(id)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.size()
    }

    pub fn queued_count(&self) -> usize {
        self.frontier.size()
    }

    pub fn in_flight(&self) -> usize {
        self.frontier.in_flight()
    }

    /// True once all discovered work has been processed
    pub fn is_completed(&self) -> bool {
        self.frontier.is_completed()
    }

    /// Reads all counters in one consistent step
    ///
    /// Safe while workers are running: a panorama is never counted both
    /// as in flight and as visited.
    pub fn counts(&self) -> CrawlCounts {
        let (queued, in_flight, seen, visited) = self.frontier.counts_with(|| self.visited.size());
        CrawlCounts {
            visited,
            queued,
            in_flight,
            seen,
        }
    }

    /// Copies the whole database
    ///
    /// Only consistent while no worker is running; callers that persist the
    /// result must check `in_flight` first.
    pub fn snapshot(&self) -> CrawlSnapshot {
        let (queue, seen, in_flight) = self.frontier.snapshot();
        CrawlSnapshot {
            queue,
            seen,
            visited: self.visited.snapshot(),
            in_flight,
        }
    }

    /// Replaces all three components from a snapshot
    pub fn restore(&self, snapshot: CrawlSnapshot) {
        self.frontier.restore(snapshot.queue, snapshot.seen);
        self.visited.restore(snapshot.visited);
    }
}
