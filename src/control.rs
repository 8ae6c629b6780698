//! Typed control-plane adapter.
//!
//! External requests arrive as JSON objects tagged by `action` and are mapped
//! onto the packager's mutation operations.

use std::path::PathBuf;

use livedash_common::{DashConfig, Error, Result, TrackId, TrackSpec};
use serde::{Deserialize, Serialize};

use crate::packager::{Packager, PackagerState};

/// A control-plane request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlRequest {
    /// Reconfigure the packager. Omitted fields keep their current value.
    Configure {
        #[serde(default)]
        folder: Option<PathBuf>,
        #[serde(default, rename = "baseName")]
        base_name: Option<String>,
        #[serde(default, rename = "segDurInSec")]
        segment_duration_secs: Option<u64>,
        #[serde(default, rename = "maxSeg")]
        max_segments: Option<usize>,
        #[serde(default, rename = "minBuffTime")]
        min_buffer_time_secs: Option<u64>,
    },
    /// Attach a track.
    Attach {
        id: TrackId,
        #[serde(flatten)]
        spec: TrackSpec,
    },
    /// Detach a track.
    Detach { id: TrackId },
    /// Change a track's advertised bitrate.
    SetBitrate { id: TrackId, bitrate: u64 },
    /// Report the packager state.
    State,
}

impl ControlRequest {
    /// Parse a JSON request.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid control request: {}", e)))
    }
}

/// Outcome of a successful request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ControlResponse {
    Ok,
    State(PackagerState),
}

impl Packager {
    /// Apply a control request.
    pub fn apply(&mut self, request: ControlRequest) -> Result<ControlResponse> {
        tracing::debug!(request = ?request, "Control request");
        match request {
            ControlRequest::Configure {
                folder,
                base_name,
                segment_duration_secs,
                max_segments,
                min_buffer_time_secs,
            } => {
                let mut config = self.config().cloned().unwrap_or_default();
                if let Some(folder) = folder {
                    config.folder = folder;
                }
                if let Some(base_name) = base_name {
                    config.base_name = base_name;
                }
                if let Some(secs) = segment_duration_secs {
                    config.segment_duration_secs = secs;
                }
                if let Some(max_segments) = max_segments {
                    config.max_segments = max_segments;
                }
                if let Some(secs) = min_buffer_time_secs {
                    config.min_buffer_time_secs = secs;
                }
                self.configure(config)?;
            }
            ControlRequest::Attach { id, spec } => self.attach_track(id, spec)?,
            ControlRequest::Detach { id } => self.detach_track(id)?,
            ControlRequest::SetBitrate { id, bitrate } => self.set_bitrate(id, bitrate)?,
            ControlRequest::State => return Ok(ControlResponse::State(self.state()?)),
        }
        Ok(ControlResponse::Ok)
    }
}

/// Convenience for control planes holding a [`DashConfig`] already.
impl From<&DashConfig> for ControlRequest {
    fn from(config: &DashConfig) -> Self {
        ControlRequest::Configure {
            folder: Some(config.folder.clone()),
            base_name: Some(config.base_name.clone()),
            segment_duration_secs: Some(config.segment_duration_secs),
            max_segments: Some(config.max_segments),
            min_buffer_time_secs: Some(config.min_buffer_time_secs),
        }
    }
}
