//! Frame intake and the segment write/evict cycle.

use std::time::Duration;

use chrono::Utc;
use livedash_common::{DashConfig, Error, Frame, MediaKind, Result, TrackId};
use livedash_media::mpd::{AudioInfo, SegmentTemplate, VideoInfo};
use livedash_media::{
    init_file_name, segment_file_name, AccessUnit, ManifestCoordinator, SegmentStore,
    SegmentWindow,
};

use super::track::{adaptation_set_id, TrackState};
use super::Packager;

impl Packager {
    /// Run one batch of frames through the pipeline.
    ///
    /// Per-track failures are logged and do not affect sibling tracks; the
    /// only error is calling this before [`Packager::configure`].
    pub fn process_frames(&mut self, frames: &[(TrackId, Frame)]) -> Result<()> {
        if self.config.is_none() || self.manifest.is_none() {
            return Err(Error::NotConfigured);
        }

        for (id, frame) in frames {
            if !self.tracks.contains_key(id) {
                tracing::trace!(track = %id, "Dropping frame for unknown track");
                continue;
            }
            if self.timestamp_offset.is_none() {
                self.anchor(frame.presentation_time);
            }

            let unit = self
                .tracks
                .get_mut(id)
                .and_then(|track| track.segmenter.manage_frame(frame));
            if let Some(unit) = unit {
                self.handle_access_unit(*id, unit);
            }
        }

        self.flush_ready();
        Ok(())
    }

    /// Run a single-frame batch.
    pub fn process_frame(&mut self, id: TrackId, frame: &Frame) -> Result<()> {
        self.process_frames(&[(id, frame.clone())])
    }

    /// Close and flush everything still buffered, e.g. at end of input.
    pub fn finish(&mut self) -> Result<()> {
        if self.config.is_none() || self.manifest.is_none() {
            return Err(Error::NotConfigured);
        }

        let ids = self.track_ids();
        for id in &ids {
            let unit = self
                .tracks
                .get_mut(id)
                .and_then(|track| track.segmenter.finish());
            if let Some(unit) = unit {
                self.handle_access_unit(*id, unit);
            }
        }
        self.flush_ready();

        let has_video = self.has_video;
        if let (Some(config), Some(manifest)) = (self.config.as_ref(), self.manifest.as_mut()) {
            for (id, track) in self.tracks.iter_mut() {
                if track.media.is_complete() || (!track.is_video() && has_video) {
                    continue;
                }
                if track.segmenter.generate_segment(&mut track.media, None, true) {
                    publish_representation(manifest, config, *id, track);
                }
            }
        }
        self.flush_ready();

        tracing::debug!("Packager finished");
        Ok(())
    }

    /// Fix the session's timestamp offset and propagate it to every segmenter.
    fn anchor(&mut self, offset: Duration) {
        self.timestamp_offset = Some(offset);
        for track in self.tracks.values_mut() {
            track.segmenter.set_offset(offset);
        }
        if let Some(manifest) = self.manifest.as_mut() {
            manifest.set_availability_start(Utc::now());
        }
        tracing::debug!(offset_us = offset.as_micros() as u64, "Timestamp offset set");
    }

    fn handle_access_unit(&mut self, id: TrackId, unit: AccessUnit) {
        let has_video = self.has_video;
        let (Some(config), Some(manifest)) = (self.config.as_ref(), self.manifest.as_mut()) else {
            return;
        };
        let Some(track) = self.tracks.get_mut(&id) else {
            return;
        };

        if !ensure_init_segment(&*self.store, config, id, track) {
            return;
        }

        // Audio is only cut by the video cadence while video is attached.
        let may_cut = track.is_video() || !has_video;
        if may_cut
            && !track.media.is_complete()
            && track.segmenter.generate_segment(&mut track.media, Some(&unit), false)
        {
            publish_representation(manifest, config, id, track);
        }

        if !track.segmenter.append_access_unit(unit) {
            tracing::error!(track = %id, "Failed to append access unit to segment");
        }
    }

    /// Write every adaptation set whose segments are ready.
    ///
    /// Video is flushed first: its completion is what forces the audio cut.
    fn flush_ready(&mut self) {
        if self.has_video {
            let mut video = self.tracks.values().filter(|t| t.is_video());
            if !video.all(|t| t.media.is_complete()) {
                return;
            }
            let window = self
                .tracks
                .values()
                .find(|t| t.is_video())
                .and_then(|t| t.media.window());
            if let Some(window) = window {
                self.force_audio_segments(window);
            }
            self.write_adaptation_set(MediaKind::Video, true);
            self.video_started = true;
            self.write_adaptation_set(MediaKind::Audio, false);
        } else {
            self.write_adaptation_set(MediaKind::Audio, true);
        }
    }

    fn force_audio_segments(&mut self, window: SegmentWindow) {
        let (Some(config), Some(manifest)) = (self.config.as_ref(), self.manifest.as_mut()) else {
            return;
        };
        for (id, track) in self.tracks.iter_mut().filter(|(_, t)| !t.is_video()) {
            if track.media.is_complete() {
                continue;
            }
            if track.segmenter.generate_segment_until(&mut track.media, window) {
                publish_representation(manifest, config, *id, track);
            } else {
                tracing::warn!(
                    track = %id,
                    start_us = window.start_micros,
                    end_us = window.end_micros,
                    "Forced audio segment generation failed"
                );
            }
        }
    }

    /// Write the complete segments of one adaptation set, advance the
    /// manifest and evict what fell out of the window.
    fn write_adaptation_set(&mut self, kind: MediaKind, require_all: bool) {
        let (Some(config), Some(manifest)) = (self.config.as_ref(), self.manifest.as_mut()) else {
            return;
        };
        let store = &*self.store;

        let members: Vec<TrackId> = self
            .tracks
            .iter()
            .filter(|(_, t)| t.kind() == kind)
            .map(|(id, _)| *id)
            .collect();
        let complete: Vec<TrackId> = members
            .iter()
            .copied()
            .filter(|id| self.tracks.get(id).is_some_and(|t| t.media.is_complete()))
            .collect();
        if complete.is_empty() || (require_all && complete.len() != members.len()) {
            return;
        }

        let Some(reference) = self.tracks.get(&complete[0]) else {
            return;
        };
        let timestamp = reference.media.timestamp();
        let duration = reference.media.duration();

        let ext = kind.extension();
        for id in &complete {
            let Some(track) = self.tracks.get_mut(id) else {
                continue;
            };
            if track.media.timestamp() != timestamp || track.media.duration() != duration {
                tracing::warn!(
                    track = %id,
                    timestamp = track.media.timestamp(),
                    duration = track.media.duration(),
                    expected_timestamp = timestamp,
                    expected_duration = duration,
                    "Segments of the same adaptation set have different timestamps"
                );
            }

            let path = config.folder.join(segment_file_name(
                &config.base_name,
                &id.representation_id(),
                timestamp,
                ext,
            ));
            if track.media.write_to(store, &path) {
                tracing::debug!(
                    track = %id,
                    sequence = track.media.sequence_number(),
                    path = %path.display(),
                    "Segment written"
                );
            } else {
                tracing::error!(track = %id, path = %path.display(), "Failed to write segment");
            }
            track.media.clear();
        }

        let set_id = adaptation_set_id(kind);
        let expired = manifest.update_adaptation_set_timestamp(set_id, timestamp, duration);

        let mpd_path = config.mpd_path();
        if let Err(e) = manifest.write_to_disk(&mpd_path) {
            tracing::error!(path = %mpd_path.display(), error = %e, "Failed to write manifest");
        }

        for old in expired {
            for id in &members {
                let path = config.folder.join(segment_file_name(
                    &config.base_name,
                    &id.representation_id(),
                    old,
                    ext,
                ));
                if !store.remove(&path) {
                    tracing::warn!(track = %id, path = %path.display(), "Failed to remove expired segment");
                }
            }
        }

        tracing::debug!(kind = %kind, timestamp, duration, segments = complete.len(), "Adaptation set flushed");
    }
}

/// Produce and persist the init segment once.
///
/// Returns false only when a freshly produced init segment could not be
/// written; the buffer is cleared so the next access unit retries.
fn ensure_init_segment(store: &dyn SegmentStore, config: &DashConfig, id: TrackId, track: &mut TrackState) -> bool {
    if !track.segmenter.generate_init_segment(&mut track.init) {
        return true;
    }

    let path = config.folder.join(init_file_name(
        &config.base_name,
        &id.representation_id(),
        track.kind().extension(),
    ));
    if track.init.write_to(store, &path) {
        tracing::debug!(track = %id, path = %path.display(), "Init segment written");
        true
    } else {
        tracing::error!(track = %id, path = %path.display(), "Failed to write init segment");
        track.init.clear();
        false
    }
}

/// Upsert the adaptation set and representation metadata of a track.
fn publish_representation(manifest: &mut ManifestCoordinator, config: &DashConfig, id: TrackId, track: &TrackState) {
    let segmenter = &track.segmenter;
    let kind = track.kind();
    let set_id = adaptation_set_id(kind);
    let template = SegmentTemplate::for_base_name(&config.base_name, kind.extension(), segmenter.time_base());
    let rep_id = id.representation_id();
    let codecs = segmenter.codec_string().unwrap_or_default();

    let result = match kind {
        MediaKind::Video => manifest
            .update_video_adaptation_set(set_id, template.timescale, &template.media, &template.initialization)
            .and_then(|()| {
                manifest.update_video_representation(
                    set_id,
                    &rep_id,
                    VideoInfo {
                        codecs,
                        width: segmenter.width(),
                        height: segmenter.height(),
                        frame_rate: segmenter.frame_rate(),
                        bandwidth: segmenter.bitrate(),
                    },
                )
            }),
        MediaKind::Audio => manifest
            .update_audio_adaptation_set(set_id, template.timescale, &template.media, &template.initialization)
            .and_then(|()| {
                manifest.update_audio_representation(
                    set_id,
                    &rep_id,
                    AudioInfo {
                        codecs,
                        sample_rate: segmenter.sample_rate(),
                        channels: segmenter.channels(),
                        bandwidth: segmenter.bitrate(),
                    },
                )
            }),
    };

    match result {
        Ok(()) => tracing::debug!(
            track = %id,
            sequence = segmenter.sequence_number(),
            "Segment generated"
        ),
        Err(e) => tracing::error!(track = %id, error = %e, "Failed to update manifest representation"),
    }
}
