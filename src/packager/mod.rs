//! The packager: orchestrates segmenters, segment buffers, the manifest and
//! storage for one output folder and base name.
//!
//! The packager is single-threaded: each call runs to completion and callers
//! serialize access (see [`crate::worker`] for a channel-fed wrapper).

mod batch;
mod track;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use livedash_common::{CodecFamily, DashConfig, Error, MediaKind, Result, TrackId, TrackSpec};
use livedash_media::{
    init_file_name, segment_file_name, FsStore, ManifestCoordinator, SegmentStore,
};
use serde::{Deserialize, Serialize};

use track::TrackState;

/// Serializable snapshot of a packager, for control planes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagerState {
    pub folder: PathBuf,
    pub base_name: String,
    pub mpd_path: PathBuf,
    pub segment_duration_secs: u64,
    pub max_segments: usize,
    pub min_buffer_time_secs: u64,
    pub has_video: bool,
    pub tracks: Vec<TrackSummary>,
}

/// One attached track in a [`PackagerState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: TrackId,
    pub kind: MediaKind,
    pub codec: CodecFamily,
    pub bitrate: u64,
    /// Sequence number of the last generated segment.
    pub sequence_number: u64,
}

/// Live DASH packager session.
pub struct Packager {
    store: Box<dyn SegmentStore>,
    config: Option<DashConfig>,
    manifest: Option<ManifestCoordinator>,
    tracks: BTreeMap<TrackId, TrackState>,
    timestamp_offset: Option<Duration>,
    has_video: bool,
    video_started: bool,
}

impl Default for Packager {
    fn default() -> Self {
        Self::new()
    }
}

impl Packager {
    /// An unconfigured packager writing to the filesystem.
    pub fn new() -> Self {
        Self::with_store(Box::new(FsStore))
    }

    /// An unconfigured packager writing through `store`.
    pub fn with_store(store: Box<dyn SegmentStore>) -> Self {
        Self {
            store,
            config: None,
            manifest: None,
            tracks: BTreeMap::new(),
            timestamp_offset: None,
            has_video: false,
            video_started: false,
        }
    }

    /// Apply a configuration.
    ///
    /// The configuration is validated first; on failure nothing changes.
    /// Window parameters apply immediately, a new segment duration applies
    /// to tracks attached afterwards.
    pub fn configure(&mut self, config: DashConfig) -> Result<()> {
        config.validate()?;

        match self.manifest.as_mut() {
            Some(manifest) => manifest.configure(
                config.min_buffer_time(),
                config.max_segments,
                config.segment_duration(),
            ),
            None => {
                self.manifest = Some(ManifestCoordinator::new(
                    config.min_buffer_time(),
                    config.max_segments,
                    config.segment_duration(),
                ))
            }
        }

        if let Some(previous) = self.config.take() {
            if previous.folder != config.folder || previous.base_name != config.base_name {
                self.abandon_output(&previous);
            }
        }

        tracing::info!(
            folder = %config.folder.display(),
            base_name = %config.base_name,
            segment_duration_secs = config.segment_duration_secs,
            max_segments = config.max_segments,
            min_buffer_time_secs = config.min_buffer_time_secs,
            "Packager configured"
        );
        self.config = Some(config);
        Ok(())
    }

    /// Remove everything written under `previous` and restart the manifest
    /// window, so the new location never advertises files it lacks.
    ///
    /// Init segments are re-produced under the new names.
    fn abandon_output(&mut self, previous: &DashConfig) {
        let mut stale = Vec::new();
        if let Some(manifest) = self.manifest.as_mut() {
            for (set_id, timestamps) in manifest.clear_timelines() {
                for (id, track) in self.tracks.iter().filter(|(_, t)| t.adaptation_set_id() == set_id) {
                    let rep_id = id.representation_id();
                    stale.extend(timestamps.iter().map(|ts| {
                        previous.folder.join(segment_file_name(
                            &previous.base_name,
                            &rep_id,
                            *ts,
                            track.kind().extension(),
                        ))
                    }));
                }
            }
        }
        for (id, track) in self.tracks.iter_mut() {
            if !track.init.is_empty() {
                stale.push(previous.folder.join(init_file_name(
                    &previous.base_name,
                    &id.representation_id(),
                    track.kind().extension(),
                )));
                track.init.clear();
            }
        }
        // the manifest is written directly, not through the store
        let mpd_path = previous.mpd_path();
        if mpd_path.exists() {
            stale.push(mpd_path);
        }

        for path in stale {
            if !self.store.remove(&path) {
                tracing::warn!(path = %path.display(), "Failed to remove file from previous output");
            }
        }
        tracing::info!(
            folder = %previous.folder.display(),
            base_name = %previous.base_name,
            "Previous output abandoned"
        );
    }

    /// Bind a new track. Fails for duplicate ids and unusable specs.
    pub fn attach_track(&mut self, id: TrackId, spec: TrackSpec) -> Result<()> {
        let config = self.config.as_ref().ok_or(Error::NotConfigured)?;
        if self.tracks.contains_key(&id) {
            return Err(Error::binding(format!("track {} is already attached", id)));
        }

        let state = TrackState::new(&spec, config.segment_duration(), self.timestamp_offset)?;
        self.tracks.insert(id, state);
        if spec.kind() == MediaKind::Video {
            self.has_video = true;
        }

        tracing::info!(track = %id, codec = %spec.codec, kind = %spec.kind(), "Track attached");
        Ok(())
    }

    /// Drop a track, its manifest entry and its files, then rewrite the
    /// manifest.
    pub fn detach_track(&mut self, id: TrackId) -> Result<()> {
        let track = self.tracks.remove(&id).ok_or_else(|| Error::track_not_found(id))?;
        let kind = track.kind();
        let set_id = track.adaptation_set_id();

        let (Some(config), Some(manifest)) = (self.config.as_ref(), self.manifest.as_mut()) else {
            return Err(Error::NotConfigured);
        };

        let rep_id = id.representation_id();
        let mut stale = Vec::new();
        if !track.init.is_empty() {
            stale.push(config.folder.join(init_file_name(&config.base_name, &rep_id, kind.extension())));
        }
        stale.extend(manifest.timeline(set_id).into_iter().map(|ts| {
            config
                .folder
                .join(segment_file_name(&config.base_name, &rep_id, ts, kind.extension()))
        }));
        manifest.remove_representation(set_id, &rep_id);

        for path in stale {
            if !self.store.remove(&path) {
                tracing::warn!(track = %id, path = %path.display(), "Failed to remove segment file");
            }
        }

        if kind == MediaKind::Video && !self.tracks.values().any(TrackState::is_video) {
            self.has_video = false;
            self.video_started = false;
        }

        let mpd_path = config.mpd_path();
        if let Err(e) = manifest.write_to_disk(&mpd_path) {
            tracing::error!(path = %mpd_path.display(), error = %e, "Failed to write manifest");
        }

        tracing::info!(track = %id, kind = %kind, "Track detached");
        Ok(())
    }

    /// Update the advertised bitrate of a track.
    pub fn set_bitrate(&mut self, id: TrackId, bitrate: u64) -> Result<()> {
        let track = self.tracks.get_mut(&id).ok_or_else(|| Error::track_not_found(id))?;
        track.segmenter.set_bitrate(bitrate);
        tracing::debug!(track = %id, bitrate, "Bitrate updated");
        Ok(())
    }

    /// Snapshot of configuration and attached tracks.
    pub fn state(&self) -> Result<PackagerState> {
        let config = self.config.as_ref().ok_or(Error::NotConfigured)?;
        Ok(PackagerState {
            folder: config.folder.clone(),
            base_name: config.base_name.clone(),
            mpd_path: config.mpd_path(),
            segment_duration_secs: config.segment_duration_secs,
            max_segments: config.max_segments,
            min_buffer_time_secs: config.min_buffer_time_secs,
            has_video: self.has_video,
            tracks: self
                .tracks
                .iter()
                .map(|(id, track)| TrackSummary {
                    id: *id,
                    kind: track.kind(),
                    codec: track.segmenter.codec(),
                    bitrate: track.segmenter.bitrate(),
                    sequence_number: track.segmenter.sequence_number(),
                })
                .collect(),
        })
    }

    pub fn config(&self) -> Option<&DashConfig> {
        self.config.as_ref()
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.has_video
    }

    /// Whether a video segment has been flushed since video was attached.
    pub fn video_started(&self) -> bool {
        self.video_started
    }

    pub fn mpd_path(&self) -> Option<PathBuf> {
        self.config.as_ref().map(DashConfig::mpd_path)
    }

    pub fn timestamp_offset(&self) -> Option<Duration> {
        self.timestamp_offset
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.keys().copied().collect()
    }

    pub fn manifest(&self) -> Option<&ManifestCoordinator> {
        self.manifest.as_ref()
    }
}

impl std::fmt::Debug for Packager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packager")
            .field("config", &self.config)
            .field("tracks", &self.tracks.keys().collect::<Vec<_>>())
            .field("timestamp_offset", &self.timestamp_offset)
            .field("has_video", &self.has_video)
            .finish()
    }
}
