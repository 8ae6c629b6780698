//! Packager configuration.
//!
//! [`DashConfig`] is deserialized from TOML and carries the output location
//! and the segmentation/window parameters. Every field defaults sensibly so
//! an empty document is valid; [`DashConfig::validate`] performs the
//! configure-time checks.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Output and windowing configuration for one packaging session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    /// Directory receiving segments and the manifest. Must be writable.
    pub folder: PathBuf,
    /// Prefix of every file name written by the session.
    pub base_name: String,
    /// Target segment duration in seconds.
    pub segment_duration_secs: u64,
    /// Maximum number of segments retained per representation.
    pub max_segments: usize,
    /// Minimum buffer time advertised in the manifest, in seconds.
    pub min_buffer_time_secs: u64,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("."),
            base_name: "live".to_string(),
            segment_duration_secs: 4,
            max_segments: 5,
            min_buffer_time_secs: 10,
        }
    }
}

impl DashConfig {
    /// Build a config for `folder` and `base_name` with default windowing.
    pub fn new(folder: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            base_name: base_name.into(),
            ..Self::default()
        }
    }

    /// Set the target segment duration.
    pub fn with_segment_duration(mut self, secs: u64) -> Self {
        self.segment_duration_secs = secs;
        self
    }

    /// Set the maximum number of retained segments.
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    /// Set the advertised minimum buffer time.
    pub fn with_min_buffer_time(mut self, secs: u64) -> Self {
        self.min_buffer_time_secs = secs;
        self
    }

    /// Deserialize a `DashConfig` from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::config(format!("config parse error: {e}")))
    }

    /// Load a `DashConfig` from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded DASH config");
        Ok(config)
    }

    /// Target segment duration.
    pub fn segment_duration(&self) -> Duration {
        Duration::from_secs(self.segment_duration_secs)
    }

    /// Minimum buffer time advertised in the manifest.
    pub fn min_buffer_time(&self) -> Duration {
        Duration::from_secs(self.min_buffer_time_secs)
    }

    /// Path of the manifest written for this configuration.
    pub fn mpd_path(&self) -> PathBuf {
        self.folder.join(format!("{}.mpd", self.base_name))
    }

    /// Reject configurations the packager cannot run with.
    ///
    /// The folder is checked by creating (and dropping) a temporary file in
    /// it, which catches missing directories, plain files and read-only
    /// mounts alike.
    pub fn validate(&self) -> Result<()> {
        if self.base_name.is_empty() {
            return Err(Error::config("base name must not be empty"));
        }
        if self.base_name.contains(['/', '\\']) {
            return Err(Error::config(format!(
                "base name '{}' must not contain path separators",
                self.base_name
            )));
        }
        if self.segment_duration_secs == 0 {
            return Err(Error::config("segment duration must be greater than zero"));
        }
        if self.max_segments == 0 {
            return Err(Error::config("maximum segment count must be greater than zero"));
        }
        if !self.folder.is_dir() {
            return Err(Error::config(format!(
                "{} is not a directory",
                self.folder.display()
            )));
        }
        tempfile::Builder::new()
            .prefix(".livedash-check")
            .tempfile_in(&self.folder)
            .map_err(|e| {
                Error::config(format!("{} is not writable: {e}", self.folder.display()))
            })?;
        Ok(())
    }
}
