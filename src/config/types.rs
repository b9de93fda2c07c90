use crate::area::LatLng;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Panocrawl
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    pub area: AreaConfig,
    pub seed: SeedConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent crawl workers
    #[serde(default = "default_workers")]
    pub workers: u32,

    /// Seconds between checkpoint backups
    #[serde(rename = "backup-interval", default = "default_backup_interval")]
    pub backup_interval: u64,

    /// Seconds between progress reports
    #[serde(rename = "report-interval", default = "default_report_interval")]
    pub report_interval: u64,

    /// Follow time-machine links to older captures of the same place
    #[serde(default)]
    pub temporal: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            backup_interval: default_backup_interval(),
            report_interval: default_report_interval(),
            temporal: false,
        }
    }
}

/// The geographic area a crawl is confined to
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "shape", rename_all = "kebab-case")]
pub enum AreaConfig {
    /// Circle of `radius` meters around `origin`
    Circle { origin: LatLng, radius: f64 },

    /// Box of `width` x `height` meters centered at `origin`; square if no height
    Box {
        origin: LatLng,
        width: f64,
        height: Option<f64>,
    },

    /// Latitude/longitude rectangle given by two corners
    GpsBox {
        #[serde(rename = "top-left")]
        top_left: LatLng,
        #[serde(rename = "bottom-right")]
        bottom_right: LatLng,
    },
}

/// Where the crawl starts
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Panorama id to start from
    #[serde(rename = "pano-id")]
    pub pano_id: Option<String>,

    /// Location to look up the nearest panorama from
    pub location: Option<LatLng>,

    /// Search radius in meters for the location lookup
    #[serde(rename = "search-radius", default = "default_search_radius")]
    pub search_radius: u32,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Root directory for crawl sessions
    pub directory: String,

    /// Session label, used as the directory name under `directory`
    pub label: String,

    /// Archive the raw metadata of recorded panoramas in the session directory
    #[serde(rename = "save-metadata", default = "default_save_metadata")]
    pub save_metadata: bool,
}

impl OutputConfig {
    /// Directory holding this session's files
    pub fn session_dir(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(&self.label)
    }

    /// Path to the primary checkpoint file
    pub fn checkpoint_path(&self) -> PathBuf {
        self.session_dir().join("db.sqlite")
    }

    /// Path to the rolling backup of the checkpoint
    pub fn backup_path(&self) -> PathBuf {
        self.session_dir().join("db.sqlite.bck")
    }
}

/// Remote panorama service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    /// Endpoint returning panorama metadata and spatial links
    #[serde(rename = "metadata-url", default = "default_metadata_url")]
    pub metadata_url: String,

    /// Endpoint returning time-machine metadata
    #[serde(rename = "timemachine-url", default = "default_timemachine_url")]
    pub timemachine_url: String,

    /// Endpoint resolving a location to the nearest panorama
    #[serde(rename = "locate-url", default = "default_locate_url")]
    pub locate_url: String,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum number of requests per resource before giving up
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts (milliseconds)
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            metadata_url: default_metadata_url(),
            timemachine_url: default_timemachine_url(),
            locate_url: default_locate_url(),
            user_agent: default_user_agent(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_workers() -> u32 {
    4
}

fn default_backup_interval() -> u64 {
    300
}

fn default_report_interval() -> u64 {
    5
}

fn default_search_radius() -> u32 {
    15
}

fn default_metadata_url() -> String {
    "https://cbks1.google.com/cbk".to_string()
}

fn default_timemachine_url() -> String {
    "https://www.google.com/maps/photometa/v1".to_string()
}

fn default_locate_url() -> String {
    "https://geo0.ggpht.com/cbk".to_string()
}

fn default_user_agent() -> String {
    format!("panocrawl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_save_metadata() -> bool {
    true
}
