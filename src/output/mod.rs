//! Output module for crawl reports
//!
//! This module handles:
//! - Archiving the raw metadata of recorded panoramas
//! - Computing statistics from a saved crawl
//! - Printing them for the `--stats` command

pub mod archive;
pub mod stats;

pub use archive::MetadataArchive;
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
