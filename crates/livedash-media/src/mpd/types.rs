//! MPD data model.

use std::collections::{BTreeMap, VecDeque};

use livedash_common::MediaKind;
use serde::{Deserialize, Serialize};

/// Adaptation set holding every video representation.
pub const VIDEO_ADAPTATION_SET_ID: u32 = 0;

/// Adaptation set holding every audio representation.
pub const AUDIO_ADAPTATION_SET_ID: u32 = 1;

/// Placeholder resolved by players to the representation id.
pub const REPRESENTATION_ID_TOKEN: &str = "$RepresentationID$";

/// Placeholder resolved by players to the segment start time.
pub const TIME_TOKEN: &str = "$Time$";

/// `SegmentTemplate` attributes of an adaptation set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentTemplate {
    /// Ticks per second of `$Time$` and timeline entries.
    pub timescale: u32,
    /// Media segment URL template.
    pub media: String,
    /// Init segment URL template.
    pub initialization: String,
}

impl SegmentTemplate {
    /// Templates matching the on-disk naming scheme
    /// `{base}_{id}_{time}.{ext}` and `{base}_{id}_init.{ext}`.
    pub fn for_base_name(base_name: &str, ext: &str, timescale: u32) -> Self {
        Self {
            timescale,
            media: format!("{}_{}_{}.{}", base_name, REPRESENTATION_ID_TOKEN, TIME_TOKEN, ext),
            initialization: format!("{}_{}_init.{}", base_name, REPRESENTATION_ID_TOKEN, ext),
        }
    }
}

/// Video representation attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub codecs: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub bandwidth: u64,
}

/// Audio representation attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub codecs: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub bandwidth: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RepresentationInfo {
    Video(VideoInfo),
    Audio(AudioInfo),
}

impl RepresentationInfo {
    pub fn kind(&self) -> MediaKind {
        match self {
            RepresentationInfo::Video(_) => MediaKind::Video,
            RepresentationInfo::Audio(_) => MediaKind::Audio,
        }
    }

    pub fn bandwidth(&self) -> u64 {
        match self {
            RepresentationInfo::Video(v) => v.bandwidth,
            RepresentationInfo::Audio(a) => a.bandwidth,
        }
    }
}

/// One `<S>` element of a `SegmentTimeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    /// Segment start in the adaptation set's timescale.
    pub t: u64,
    /// Segment duration in the adaptation set's timescale.
    pub d: u64,
}

/// A group of interchangeable representations of one media kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptationSet {
    pub id: u32,
    pub kind: MediaKind,
    pub template: SegmentTemplate,
    /// Representations keyed by representation id.
    pub representations: BTreeMap<String, RepresentationInfo>,
    /// Segments currently advertised, oldest first.
    pub timeline: VecDeque<TimelineEntry>,
}

impl AdaptationSet {
    pub fn new(id: u32, kind: MediaKind, template: SegmentTemplate) -> Self {
        Self {
            id,
            kind,
            template,
            representations: BTreeMap::new(),
            timeline: VecDeque::new(),
        }
    }

    /// Newest advertised segment start.
    pub fn latest_timestamp(&self) -> Option<u64> {
        self.timeline.back().map(|entry| entry.t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_for_base_name() {
        let template = SegmentTemplate::for_base_name("live", "m4v", 90000);
        assert_eq!(template.media, "live_$RepresentationID$_$Time$.m4v");
        assert_eq!(template.initialization, "live_$RepresentationID$_init.m4v");
    }

    #[test]
    fn test_representation_info_kind() {
        let info = RepresentationInfo::Audio(AudioInfo {
            codecs: "mp4a.40.2".into(),
            sample_rate: 48000,
            channels: 2,
            bandwidth: 128_000,
        });
        assert_eq!(info.kind(), MediaKind::Audio);
        assert_eq!(info.bandwidth(), 128_000);
    }
}
