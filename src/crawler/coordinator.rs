//! Crawler coordinator - main crawl orchestration logic
//!
//! This module ties the pieces of a crawl together:
//! - Seeding a fresh crawl or resuming one from its checkpoint
//! - Running the worker pool until the frontier is exhausted or shutdown is requested
//! - Periodic progress reports and backups
//! - Quiescing workers before any snapshot is taken

use crate::area::{admission_from_config, Admission};
use crate::config::Config;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::monitor::{BackupTimer, CrawlStatus, Monitor};
use crate::crawler::scheduler::{PoolState, WorkerContext, WorkerPool};
use crate::output::MetadataArchive;
use crate::state::{CrawlDatabase, CrawlSnapshot, NodeId};
use crate::storage::{Checkpointer, LoadSource};
use crate::CrawlError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// How often the control loop checks for completion and timers
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing settings of a [`Crawler`]
#[derive(Debug, Clone, Copy)]
pub struct CrawlerSettings {
    pub workers: usize,
    pub backup_interval: Duration,
    pub report_interval: Duration,
}

impl CrawlerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.crawler.workers as usize,
            backup_interval: Duration::from_secs(config.crawler.backup_interval),
            report_interval: Duration::from_secs(config.crawler.report_interval),
        }
    }
}

/// A breadth-first panorama crawl with checkpointing
pub struct Crawler {
    db: Arc<CrawlDatabase>,
    pool: WorkerPool,
    checkpointer: Checkpointer,
    monitor: Monitor,
    backup_timer: BackupTimer,

    /// Set once the database holds a seeded or loaded crawl
    started: bool,
}

impl Crawler {
    /// Creates a crawler with an empty database and stopped workers
    pub fn new(
        settings: CrawlerSettings,
        fetcher: Arc<dyn Fetcher>,
        admission: Arc<dyn Admission>,
        checkpointer: Checkpointer,
    ) -> Self {
        let db = Arc::new(CrawlDatabase::new());
        let ctx = WorkerContext {
            db: db.clone(),
            fetcher,
            admission,
            archive: None,
        };

        Self {
            db,
            pool: WorkerPool::new(ctx, settings.workers),
            checkpointer,
            monitor: Monitor::new(settings.report_interval),
            backup_timer: BackupTimer::new(settings.backup_interval),
            started: false,
        }
    }

    /// Creates a crawler for a validated configuration
    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        checkpointer: Checkpointer,
    ) -> Self {
        let admission: Arc<dyn Admission> = Arc::from(admission_from_config(&config.area));
        let crawler = Self::new(
            CrawlerSettings::from_config(config),
            fetcher,
            admission,
            checkpointer,
        );

        if config.output.save_metadata {
            crawler.with_archive(MetadataArchive::from_output(&config.output))
        } else {
            crawler
        }
    }

    /// Writes the raw metadata of every recorded panorama to `archive`
    pub fn with_archive(mut self, archive: MetadataArchive) -> Self {
        let mut ctx = self.pool.context().clone();
        ctx.archive = Some(Arc::new(archive));
        self.pool = WorkerPool::new(ctx, self.pool.size());
        self
    }

    pub fn database(&self) -> &Arc<CrawlDatabase> {
        &self.db
    }

    pub fn checkpointer(&self) -> &Checkpointer {
        &self.checkpointer
    }

    pub fn pool_state(&self) -> PoolState {
        self.pool.state()
    }

    /// Starts a fresh crawl from `seed`, discarding any in-memory state
    pub async fn start(&mut self, seed: NodeId) -> Result<(), CrawlError> {
        self.pool.stop().await?;

        tracing::info!("Starting fresh crawl from {}", seed);
        self.db.restore(CrawlSnapshot::default());
        self.db.enqueue(seed);
        self.launch();
        Ok(())
    }

    /// Resumes from the checkpoint, or starts from `seed` if there is none
    pub async fn resume(&mut self, seed: NodeId) -> Result<LoadSource, CrawlError> {
        self.resume_with(move || async move { Ok(seed) }).await
    }

    /// Resumes from the checkpoint, calling `seed` only if nothing loads
    ///
    /// A seed that needs a remote lookup is never resolved when a
    /// checkpoint is available.
    pub async fn resume_with<F, Fut>(&mut self, seed: F) -> Result<LoadSource, CrawlError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NodeId, CrawlError>>,
    {
        self.pool.stop().await?;

        let source = self.checkpointer.load(&self.db);
        if source == LoadSource::Fresh {
            let seed = seed().await?;
            tracing::info!("No usable checkpoint, starting fresh crawl from {}", seed);
            self.db.restore(CrawlSnapshot::default());
            self.db.enqueue(seed);
        }
        self.launch();
        Ok(source)
    }

    fn launch(&mut self) {
        self.started = true;
        self.monitor.restart(self.db.visited_count());
        self.backup_timer.reset();
        self.pool.start();
    }

    /// Refuses to save or run an empty database that would overwrite a
    /// checkpoint on disk
    fn ensure_started(&self) -> Result<(), CrawlError> {
        if self.started {
            Ok(())
        } else {
            Err(CrawlError::NotStarted)
        }
    }

    /// True once every discovered panorama has been processed
    pub fn is_completed(&self) -> bool {
        self.db.is_completed()
    }

    pub fn status(&self) -> CrawlStatus {
        self.monitor.status(&self.db)
    }

    /// Runs until completion or Ctrl+C, then saves the checkpoint
    pub async fn run(&mut self) -> Result<CrawlStatus, CrawlError> {
        self.run_until(shutdown_signal()).await
    }

    /// Runs until completion or until `shutdown` resolves
    ///
    /// Either way the workers are quiesced and the crawl is saved before
    /// this returns. Progress is reported and backups are taken on their
    /// configured intervals meanwhile.
    ///
    /// Fails with [`CrawlError::NotStarted`] unless [`Crawler::start`] or a
    /// resume ran first.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<CrawlStatus, CrawlError>
    where
        F: Future<Output = ()>,
    {
        self.ensure_started()?;
        self.pool.start();
        tokio::pin!(shutdown);

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping workers");
                    break;
                }
                _ = ticker.tick() => {}
            }

            if self.is_completed() {
                tracing::info!("Frontier is empty, crawl complete");
                break;
            }

            if self.pool.has_exited_worker() {
                tracing::error!("A worker exited unexpectedly, stopping crawl");
                break;
            }

            if self.monitor.is_due() {
                self.monitor.report(&self.db);
            }

            if self.backup_timer.is_due() {
                if let Err(e) = self.backup().await {
                    tracing::error!("Backup failed: {}", e);
                }
            }
        }

        self.stop_and_save().await?;
        let status = self.monitor.report(&self.db);
        Ok(status)
    }

    /// Quiesces the workers, saves the primary checkpoint and rotates the
    /// backup, then restarts the workers
    ///
    /// Workers are restarted even when saving fails; the save error is
    /// returned afterwards.
    pub async fn backup(&mut self) -> Result<(), CrawlError> {
        self.ensure_started()?;
        tracing::info!("Backing up crawl state");
        let stopped = self.pool.stop().await;

        let saved = self
            .checkpointer
            .save(&self.db)
            .and_then(|_| self.checkpointer.rotate_backup());

        self.pool.start();
        self.backup_timer.reset();

        stopped?;
        saved?;
        tracing::info!(
            "Backup written to {}",
            self.checkpointer.backup_path().display()
        );
        Ok(())
    }

    /// Quiesces the workers and saves the primary checkpoint
    ///
    /// The checkpoint is written even if a worker had panicked; the worker
    /// failure is reported after the save.
    pub async fn stop_and_save(&mut self) -> Result<(), CrawlError> {
        self.ensure_started()?;
        let stopped = self.pool.stop().await;

        match self.checkpointer.save(&self.db) {
            Ok(meta) => tracing::info!(
                "Crawl state saved to {} at {}",
                self.checkpointer.primary_path().display(),
                meta.saved_at
            ),
            Err(e) => {
                tracing::error!("Failed to save crawl state: {}", e);
                return Err(e.into());
            }
        }

        stopped
    }
}

/// Resolves on Ctrl+C
///
/// If the signal handler cannot be installed this never resolves and the
/// crawl only ends on completion.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
