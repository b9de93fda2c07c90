//! Raw metadata archive
//!
//! Recorded panoramas have their service responses written next to the
//! checkpoint, spread over subdirectories named after the first two
//! characters of the panorama id:
//!
//! ```text
//! <session>/_Ab/Abc123_meta.json
//! <session>/_Ab/Abc123_time_meta.json
//! ```

use crate::config::OutputConfig;
use crate::crawler::Panorama;
use crate::state::NodeId;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes the raw responses of recorded panoramas under a session directory
#[derive(Debug, Clone)]
pub struct MetadataArchive {
    root: PathBuf,
}

impl MetadataArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Archive rooted at the session directory of `output`
    pub fn from_output(output: &OutputConfig) -> Self {
        Self::new(output.session_dir())
    }

    /// Path of the metadata file of `id`
    pub fn meta_path(&self, id: &NodeId) -> io::Result<PathBuf> {
        Ok(with_suffix(&self.base_path(id)?, "_meta.json"))
    }

    /// Path of the time-machine file of `id`
    pub fn time_meta_path(&self, id: &NodeId) -> io::Result<PathBuf> {
        Ok(with_suffix(&self.base_path(id)?, "_time_meta.json"))
    }

    fn base_path(&self, id: &NodeId) -> io::Result<PathBuf> {
        let name = id.as_str();
        let unsafe_name = name.is_empty()
            || name.starts_with('.')
            || name.contains(|c: char| c == '/' || c == '\\');
        if unsafe_name {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("panorama id {:?} is not usable as a file name", name),
            ));
        }

        let prefix: String = name.chars().take(2).collect();
        Ok(self.root.join(format!("_{}", prefix)).join(name))
    }

    /// Writes the raw responses carried by `panorama`
    ///
    /// # Arguments
    ///
    /// * `panorama` - A fetched panorama
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The responses were written
    /// * `Ok(false)` - The panorama carries no raw responses
    /// * `Err(io::Error)` - A file could not be written
    pub fn write(&self, panorama: &Panorama) -> io::Result<bool> {
        let Some(raw) = &panorama.raw else {
            return Ok(false);
        };

        let meta_path = self.meta_path(&panorama.id)?;
        if let Some(dir) = meta_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&meta_path, &raw.meta)?;

        if let Some(time_meta) = &raw.time_meta {
            fs::write(self.time_meta_path(&panorama.id)?, time_meta)?;
        }

        Ok(true)
    }
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
