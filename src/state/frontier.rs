//! Deduplicating FIFO frontier
//!
//! The frontier owns the queue of pending node ids, the set of every id
//! ever enqueued, and the in-flight counter. All three live behind one
//! mutex so that "check then insert" and "pop then count in-flight" are
//! single atomic steps. Workers waiting for work park on a [`Notify`].

use crate::state::NodeId;
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// An entry of the frontier queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    /// A panorama waiting to be visited
    Node(NodeId),

    /// Stop marker; the worker that dequeues it exits
    Sentinel,
}

#[derive(Debug, Default)]
struct FrontierInner {
    queue: VecDeque<QueueItem>,

    /// Every id ever enqueued. Never shrinks.
    seen: HashSet<NodeId>,

    /// Number of `QueueItem::Node` entries in `queue`
    queued: usize,

    /// Items dequeued but not yet marked done
    in_flight: usize,
}

impl FrontierInner {
    fn from_parts(queue: Vec<NodeId>, mut seen: HashSet<NodeId>) -> Self {
        seen.extend(queue.iter().cloned());
        Self {
            queued: queue.len(),
            queue: queue.into_iter().map(QueueItem::Node).collect(),
            seen,
            in_flight: 0,
        }
    }
}

/// Deduplicating FIFO queue shared by all crawl workers
#[derive(Debug, Default)]
pub struct Frontier {
    inner: Mutex<FrontierInner>,
    available: Notify,
}

impl Frontier {
    /// Creates an empty frontier
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a frontier from persisted parts with zero items in flight
    ///
    /// Queue entries missing from `seen` are added to it, so the dedup set
    /// always covers the queue.
    pub fn from_parts(queue: Vec<NodeId>, seen: HashSet<NodeId>) -> Self {
        Self {
            inner: Mutex::new(FrontierInner::from_parts(queue, seen)),
            available: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        // Critical sections never panic half-way, so a poisoned lock still
        // guards consistent data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `id` to the tail unless it was ever enqueued before
    ///
    /// Returns true if the id was new.
    pub fn enqueue(&self, id: NodeId) -> bool {
        {
            let mut inner = self.lock();
            if inner.seen.contains(&id) {
                return false;
            }
            inner.seen.insert(id.clone());
            inner.queue.push_back(QueueItem::Node(id));
            inner.queued += 1;
        }
        self.available.notify_one();
        true
    }

    /// Removes the head item without waiting
    ///
    /// A returned item counts as in flight until [`Frontier::task_done`].
    pub fn try_dequeue(&self) -> Option<QueueItem> {
        let mut inner = self.lock();
        let item = inner.queue.pop_front()?;
        if matches!(item, QueueItem::Node(_)) {
            inner.queued -= 1;
        }
        inner.in_flight += 1;
        Some(item)
    }

    /// Removes the head item, waiting until one is available
    pub async fn dequeue(&self) -> QueueItem {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent enqueue cannot slip
            // between the check and the wait.
            notified.as_mut().enable();

            if let Some(item) = self.try_dequeue() {
                return item;
            }

            notified.await;
        }
    }

    /// Pushes a stop marker ahead of all pending work
    pub fn prepend_sentinel(&self) {
        self.lock().queue.push_front(QueueItem::Sentinel);
        self.available.notify_one();
    }

    /// Drops any stop markers left in the queue, returning how many
    pub fn clear_sentinels(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.queue.len();
        inner
            .queue
            .retain(|item| !matches!(item, QueueItem::Sentinel));
        before - inner.queue.len()
    }

    /// Marks one dequeued item as finished
    pub fn task_done(&self) {
        let mut inner = self.lock();
        debug_assert!(inner.in_flight > 0, "task_done without matching dequeue");
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }

    /// Number of nodes waiting in the queue
    pub fn size(&self) -> usize {
        self.lock().queued
    }

    /// Number of items dequeued but not yet done
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    /// Number of distinct ids ever enqueued
    pub fn seen_count(&self) -> usize {
        self.lock().seen.len()
    }

    /// Returns true if `id` was ever enqueued
    pub fn has_seen(&self, id: &NodeId) -> bool {
        self.lock().seen.contains(id)
    }

    /// Runs `f` and marks one item done in a single critical section
    ///
    /// Lets the caller publish the result of an item together with its
    /// completion, as seen by [`Frontier::counts_with`].
    pub fn finish_with<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut inner = self.lock();
        let result = f();
        debug_assert!(inner.in_flight > 0, "finish without matching dequeue");
        inner.in_flight = inner.in_flight.saturating_sub(1);
        result
    }

    /// Reads queued, in-flight and seen counts together with `f`
    pub fn counts_with<R>(&self, f: impl FnOnce() -> R) -> (usize, usize, usize, R) {
        let inner = self.lock();
        (inner.queued, inner.in_flight, inner.seen.len(), f())
    }

    /// True once no node is queued and nothing is in flight
    pub fn is_completed(&self) -> bool {
        let inner = self.lock();
        inner.queued == 0 && inner.in_flight == 0
    }

    /// Copies queue order, dedup set and in-flight count in one step
    ///
    /// Stop markers are not part of the crawl state and are left out.
    pub fn snapshot(&self) -> (Vec<NodeId>, HashSet<NodeId>, usize) {
        let inner = self.lock();
        let queue = inner
            .queue
            .iter()
            .filter_map(|item| match item {
                QueueItem::Node(id) => Some(id.clone()),
                QueueItem::Sentinel => None,
            })
            .collect();
        (queue, inner.seen.clone(), inner.in_flight)
    }

    /// Replaces the whole frontier state
    pub fn restore(&self, queue: Vec<NodeId>, seen: HashSet<NodeId>) {
        let restored = FrontierInner::from_parts(queue, seen);
        let pending = restored.queued;
        *self.lock() = restored;

        for _ in 0..pending {
            self.available.notify_one();
        }
    }
}
