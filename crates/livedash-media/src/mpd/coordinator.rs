//! The manifest coordinator: sole owner of the MPD state.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use livedash_common::{Error, MediaKind, Result};
use tempfile::NamedTempFile;

use super::generator::{generate_mpd, MpdHeader};
use super::types::{
    AdaptationSet, AudioInfo, RepresentationInfo, SegmentTemplate, TimelineEntry, VideoInfo,
};

/// Owns adaptation sets, representations and the availability window, and
/// serializes them into the manifest file.
#[derive(Debug)]
pub struct ManifestCoordinator {
    sets: BTreeMap<u32, AdaptationSet>,
    min_buffer_time: Duration,
    max_segments: usize,
    segment_duration: Duration,
    availability_start: Option<DateTime<Utc>>,
}

impl ManifestCoordinator {
    pub fn new(min_buffer_time: Duration, max_segments: usize, segment_duration: Duration) -> Self {
        Self {
            sets: BTreeMap::new(),
            min_buffer_time,
            max_segments,
            segment_duration,
            availability_start: None,
        }
    }

    /// Update the window parameters.
    ///
    /// A reduced `max_segments` takes effect at the next timestamp update of
    /// each adaptation set.
    pub fn configure(&mut self, min_buffer_time: Duration, max_segments: usize, segment_duration: Duration) {
        self.min_buffer_time = min_buffer_time;
        self.max_segments = max_segments;
        self.segment_duration = segment_duration;
    }

    pub fn min_buffer_time(&self) -> Duration {
        self.min_buffer_time
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    pub fn segment_duration(&self) -> Duration {
        self.segment_duration
    }

    /// Wall-clock time of the session's timestamp offset. Set once.
    pub fn set_availability_start(&mut self, start: DateTime<Utc>) {
        self.availability_start.get_or_insert(start);
    }

    pub fn availability_start(&self) -> Option<DateTime<Utc>> {
        self.availability_start
    }

    pub fn update_video_adaptation_set(&mut self, id: u32, time_base: u32, media: &str, initialization: &str) -> Result<()> {
        self.upsert_adaptation_set(id, MediaKind::Video, time_base, media, initialization)
    }

    pub fn update_audio_adaptation_set(&mut self, id: u32, time_base: u32, media: &str, initialization: &str) -> Result<()> {
        self.upsert_adaptation_set(id, MediaKind::Audio, time_base, media, initialization)
    }

    fn upsert_adaptation_set(
        &mut self,
        id: u32,
        kind: MediaKind,
        time_base: u32,
        media: &str,
        initialization: &str,
    ) -> Result<()> {
        let template = SegmentTemplate {
            timescale: time_base,
            media: media.to_string(),
            initialization: initialization.to_string(),
        };
        match self.sets.get_mut(&id) {
            Some(set) if set.kind != kind => Err(Error::manifest(format!(
                "adaptation set {} holds {} representations, not {}",
                id, set.kind, kind
            ))),
            Some(set) => {
                if set.template.timescale != time_base && !set.timeline.is_empty() {
                    tracing::warn!(
                        adaptation_set = id,
                        old = set.template.timescale,
                        new = time_base,
                        "Timescale changed with segments in the window; clearing timeline"
                    );
                    set.timeline.clear();
                }
                set.template = template;
                Ok(())
            }
            None => {
                self.sets.insert(id, AdaptationSet::new(id, kind, template));
                Ok(())
            }
        }
    }

    pub fn update_video_representation(&mut self, set_id: u32, id: &str, info: VideoInfo) -> Result<()> {
        self.upsert_representation(set_id, id, RepresentationInfo::Video(info))
    }

    pub fn update_audio_representation(&mut self, set_id: u32, id: &str, info: AudioInfo) -> Result<()> {
        self.upsert_representation(set_id, id, RepresentationInfo::Audio(info))
    }

    /// Insert or replace a representation. The set's window is untouched.
    fn upsert_representation(&mut self, set_id: u32, id: &str, info: RepresentationInfo) -> Result<()> {
        let set = self
            .sets
            .get_mut(&set_id)
            .ok_or_else(|| Error::manifest(format!("adaptation set {} is not configured", set_id)))?;
        if set.kind != info.kind() {
            return Err(Error::manifest(format!(
                "cannot add a {} representation to {} adaptation set {}",
                info.kind(),
                set.kind,
                set_id
            )));
        }
        set.representations.insert(id.to_string(), info);
        Ok(())
    }

    /// Remove a representation's metadata. Files are left alone.
    ///
    /// Removing the last representation clears the set's timeline.
    pub fn remove_representation(&mut self, set_id: u32, id: &str) -> bool {
        let Some(set) = self.sets.get_mut(&set_id) else {
            return false;
        };
        let removed = set.representations.remove(id).is_some();
        if set.representations.is_empty() {
            set.timeline.clear();
        }
        removed
    }

    /// Forget every advertised segment, e.g. after the output moved.
    ///
    /// Returns the timelines that were dropped, keyed by adaptation set.
    pub fn clear_timelines(&mut self) -> Vec<(u32, Vec<u64>)> {
        self.sets
            .values_mut()
            .filter(|set| !set.timeline.is_empty())
            .map(|set| {
                let dropped = set.timeline.drain(..).map(|entry| entry.t).collect();
                (set.id, dropped)
            })
            .collect()
    }

    /// Advance an adaptation set's timeline with a newly written segment.
    ///
    /// Returns the start times of segments that fell out of the window,
    /// oldest first; an empty list means nothing is evictable yet.
    pub fn update_adaptation_set_timestamp(&mut self, set_id: u32, timestamp: u64, duration: u64) -> Vec<u64> {
        let max_segments = self.max_segments.max(1);
        let Some(set) = self.sets.get_mut(&set_id) else {
            tracing::warn!(adaptation_set = set_id, "Timestamp update for unknown adaptation set");
            return Vec::new();
        };

        match set.timeline.back_mut() {
            Some(last) if last.t == timestamp => last.d = duration,
            Some(last) if last.t > timestamp => {
                tracing::warn!(
                    adaptation_set = set_id,
                    timestamp,
                    latest = last.t,
                    "Ignoring timestamp older than the newest segment"
                );
                return Vec::new();
            }
            _ => set.timeline.push_back(TimelineEntry {
                t: timestamp,
                d: duration,
            }),
        }

        let mut expired = Vec::new();
        while set.timeline.len() > max_segments {
            if let Some(entry) = set.timeline.pop_front() {
                expired.push(entry.t);
            }
        }
        expired
    }

    /// Start times currently advertised for an adaptation set.
    pub fn timeline(&self, set_id: u32) -> Vec<u64> {
        self.sets
            .get(&set_id)
            .map(|set| set.timeline.iter().map(|entry| entry.t).collect())
            .unwrap_or_default()
    }

    pub fn adaptation_set(&self, set_id: u32) -> Option<&AdaptationSet> {
        self.sets.get(&set_id)
    }

    /// Render the manifest as of `now`.
    pub fn render_at(&self, now: DateTime<Utc>) -> String {
        let header = MpdHeader {
            availability_start_time: self.availability_start.unwrap_or(now),
            publish_time: now,
            minimum_update_period: self.segment_duration,
            min_buffer_time: self.min_buffer_time,
            time_shift_buffer_depth: self.segment_duration * self.max_segments as u32,
        };
        generate_mpd(&header, self.sets.values())
    }

    pub fn render(&self) -> String {
        self.render_at(Utc::now())
    }

    /// Persist the manifest atomically: readers see either the previous or
    /// the new document, never a partial one.
    pub fn write_to_disk(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(self.render().as_bytes())?;
        file.flush()?;
        file.persist(path).map_err(|e| Error::Io(e.error))?;
        tracing::trace!(path = %path.display(), "Manifest written");
        Ok(())
    }
}
