//! Crawl workers and the pool that starts and quiesces them
//!
//! This module handles:
//! - The per-worker loop: dequeue, fetch, admit, expand, record
//! - In-flight accounting that survives errors and panics
//! - Stopping workers with sentinels so that none is cut off mid-fetch

use crate::area::Admission;
use crate::crawler::fetcher::{FetchOutcome, Fetcher};
use crate::output::MetadataArchive;
use crate::state::{CrawlDatabase, NodeId, NodeRecord, QueueItem};
use crate::CrawlError;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// What happened to one dequeued panorama
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Admitted and stored; `discovered` neighbours were new to the frontier
    Recorded { discovered: usize },

    /// Admitted and expanded but not stored
    Unrecorded { discovered: usize },

    /// Outside the area; discarded without expansion
    Rejected,

    /// No metadata; discarded
    Missing,

    /// Fetch failed after retries; discarded
    Failed,
}

/// Marks one dequeued item as done when dropped
///
/// Created right after a successful dequeue so the in-flight counter is
/// decremented on every exit path, including a panicking fetcher.
pub struct InFlightGuard<'a> {
    db: &'a CrawlDatabase,
}

impl<'a> InFlightGuard<'a> {
    pub fn new(db: &'a CrawlDatabase) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &'a CrawlDatabase {
        self.db
    }

    /// Records the panorama and marks the item done in one step
    pub fn finish(self, id: NodeId, record: NodeRecord) {
        self.db.record_done(id, record);
        std::mem::forget(self);
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.db.task_done();
    }
}

/// Applies a fetch outcome to the database and releases the item
///
/// Only admitted panoramas are expanded; a rejected panorama's neighbours
/// are never enqueued through it. Recorded panoramas have their raw
/// metadata written to `archive` first.
pub fn apply_outcome(
    guard: InFlightGuard<'_>,
    admission: &dyn Admission,
    archive: Option<&MetadataArchive>,
    id: &NodeId,
    outcome: FetchOutcome,
) -> Visit {
    let panorama = match outcome {
        FetchOutcome::Found(panorama) => panorama,
        FetchOutcome::Missing => {
            tracing::debug!("Discarding {}: no metadata", id);
            return Visit::Missing;
        }
        FetchOutcome::Failed(e) => {
            tracing::warn!("Discarding {}: {}", id, e);
            return Visit::Failed;
        }
    };

    if !admission.admit(&panorama.location()) {
        tracing::debug!("Rejected {} at {}", id, panorama.location());
        return Visit::Rejected;
    }

    let db = guard.db();
    let discovered = panorama
        .neighbours
        .iter()
        .filter(|neighbour| db.enqueue((*neighbour).clone()))
        .count();

    if panorama.recordable {
        if let Some(archive) = archive {
            if let Err(e) = archive.write(&panorama) {
                tracing::warn!("Failed to archive metadata of {}: {}", id, e);
            }
        }
        guard.finish(id.clone(), panorama.record);
        Visit::Recorded { discovered }
    } else {
        tracing::debug!("Not recording third-party panorama {}", id);
        Visit::Unrecorded { discovered }
    }
}

/// Shared handles every worker needs
#[derive(Clone)]
pub struct WorkerContext {
    pub db: Arc<CrawlDatabase>,
    pub fetcher: Arc<dyn Fetcher>,
    pub admission: Arc<dyn Admission>,

    /// Where raw metadata of recorded panoramas goes, if anywhere
    pub archive: Option<Arc<MetadataArchive>>,
}

/// Runs one worker until it dequeues a sentinel
pub async fn run_worker(worker_id: usize, ctx: WorkerContext) {
    tracing::debug!("Worker {} started", worker_id);
    let db = ctx.db.as_ref();

    loop {
        let item = db.dequeue().await;
        let guard = InFlightGuard::new(db);

        let id = match item {
            QueueItem::Sentinel => break,
            QueueItem::Node(id) => id,
        };

        let outcome = ctx.fetcher.fetch(&id).await;
        let visit = apply_outcome(
            guard,
            ctx.admission.as_ref(),
            ctx.archive.as_deref(),
            &id,
            outcome,
        );
        tracing::debug!("Worker {} visited {}: {:?}", worker_id, id, visit);
    }

    tracing::debug!("Worker {} stopped", worker_id);
}

/// Lifecycle of a [`WorkerPool`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Running,
    /// Sentinels are queued; workers finish their current panorama and exit
    Draining,
    Stopped,
}

/// Fixed-size set of crawl workers sharing one database
pub struct WorkerPool {
    ctx: WorkerContext,
    size: usize,
    handles: Vec<JoinHandle<()>>,
    state: PoolState,
}

impl WorkerPool {
    /// Creates a stopped pool of `size` workers
    pub fn new(ctx: WorkerContext, size: usize) -> Self {
        Self {
            ctx,
            size: size.max(1),
            handles: Vec::new(),
            state: PoolState::Stopped,
        }
    }

    pub fn state(&self) -> PoolState {
        self.state
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Spawns a fresh set of workers; no-op unless stopped
    pub fn start(&mut self) {
        if self.state != PoolState::Stopped {
            return;
        }

        self.handles = (0..self.size)
            .map(|worker_id| tokio::spawn(run_worker(worker_id, self.ctx.clone())))
            .collect();
        self.state = PoolState::Running;
        tracing::debug!("Started {} workers", self.size);
    }

    /// Queues one sentinel per worker ahead of all pending work
    pub fn drain(&mut self) {
        if self.state != PoolState::Running {
            return;
        }

        for _ in 0..self.handles.len() {
            self.ctx.db.prepend_sentinel();
        }
        self.state = PoolState::Draining;
    }

    /// Waits for every worker to exit
    ///
    /// All workers are joined even if some of them panicked; the first
    /// failure is returned afterwards.
    pub async fn join(&mut self) -> Result<(), CrawlError> {
        let mut first_error = None;
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
                first_error.get_or_insert(e);
            }
        }

        // Workers that died early never consumed their sentinel
        let leftover = self.ctx.db.clear_sentinels();
        if leftover > 0 {
            tracing::debug!("Cleared {} unused sentinels", leftover);
        }

        self.state = PoolState::Stopped;
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Drains and joins the pool
    ///
    /// Returns once every worker has finished the panorama it was working
    /// on. Pending panoramas stay queued.
    pub async fn stop(&mut self) -> Result<(), CrawlError> {
        if self.state == PoolState::Stopped {
            return Ok(());
        }
        self.drain();
        self.join().await
    }

    /// True if a worker exited while the pool was running
    ///
    /// Workers only leave their loop on a sentinel, so this means one died.
    pub fn has_exited_worker(&self) -> bool {
        self.state == PoolState::Running && self.handles.iter().any(JoinHandle::is_finished)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}
