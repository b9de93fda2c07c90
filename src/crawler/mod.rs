//! Crawler module for panorama fetching and crawl orchestration
//!
//! This module contains the core crawling logic, including:
//! - Fetching panorama metadata with retry logic
//! - Crawl workers and the pool that quiesces them
//! - Progress reporting and periodic backups
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod monitor;
mod scheduler;

pub use coordinator::{shutdown_signal, Crawler, CrawlerSettings};
pub use fetcher::{
    build_http_client, FetchError, FetchOutcome, Fetcher, HttpFetcher, Panorama, RawMetadata,
};
pub use monitor::{BackupTimer, CrawlStatus, Monitor};
pub use scheduler::{apply_outcome, InFlightGuard, PoolState, Visit, WorkerContext, WorkerPool};

use crate::config::{Config, SeedConfig};
use crate::state::NodeId;
use crate::CrawlError;

/// Resolves the panorama a crawl starts from
///
/// A configured panorama id is used as is. A location is looked up with
/// the fetcher; finding nothing within the search radius is an error.
///
/// # Arguments
///
/// * `seed` - The seed configuration
/// * `fetcher` - Used for the location lookup
///
/// # Returns
///
/// * `Ok(NodeId)` - The seed panorama
/// * `Err(CrawlError)` - The lookup failed or found nothing
pub async fn resolve_seed(seed: &SeedConfig, fetcher: &dyn Fetcher) -> Result<NodeId, CrawlError> {
    if let Some(id) = &seed.pano_id {
        return Ok(NodeId::from(id.as_str()));
    }

    let Some(location) = seed.location else {
        return Err(CrawlError::Config(crate::ConfigError::Validation(
            "seed requires either pano-id or location".to_string(),
        )));
    };

    tracing::info!(
        "Looking up panorama near {} within {} m",
        location,
        seed.search_radius
    );
    match fetcher.locate(location, seed.search_radius).await? {
        Some(id) => {
            tracing::info!("Seed panorama: {}", id);
            Ok(id)
        }
        None => Err(CrawlError::SeedNotFound {
            lat: location.lat,
            lng: location.lng,
        }),
    }
}

/// Runs a complete crawl for a configuration
///
/// Resumes from the session checkpoint unless `fresh` is set, then crawls
/// until completion or Ctrl+C. The seed is only resolved when the crawl
/// starts fresh, so a resume needs no location lookup.
pub async fn crawl(
    config: &Config,
    fetcher: std::sync::Arc<dyn Fetcher>,
    checkpointer: crate::storage::Checkpointer,
    fresh: bool,
) -> Result<CrawlStatus, CrawlError> {
    let mut crawler = Crawler::from_config(config, fetcher.clone(), checkpointer);

    if fresh {
        let seed = resolve_seed(&config.seed, fetcher.as_ref()).await?;
        crawler.start(seed).await?;
    } else {
        crawler
            .resume_with(|| resolve_seed(&config.seed, fetcher.as_ref()))
            .await?;
    }

    crawler.run().await
}
