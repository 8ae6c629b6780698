//! Per-track packager state.

use std::time::Duration;

use livedash_common::{MediaKind, Result, TrackSpec};
use livedash_media::{Segment, TrackSegmenter, AUDIO_ADAPTATION_SET_ID, VIDEO_ADAPTATION_SET_ID};

/// Everything the packager owns for one attached track.
///
/// The segmenter and both buffers are created and dropped together.
#[derive(Debug)]
pub(crate) struct TrackState {
    pub segmenter: TrackSegmenter,
    /// Rolling media segment buffer.
    pub media: Segment,
    /// Init segment buffer, filled once.
    pub init: Segment,
}

impl TrackState {
    pub fn new(spec: &TrackSpec, segment_duration: Duration, offset: Option<Duration>) -> Result<Self> {
        Ok(Self {
            segmenter: TrackSegmenter::new(spec, segment_duration, offset)?,
            media: Segment::media(),
            init: Segment::init(),
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.segmenter.kind()
    }

    pub fn is_video(&self) -> bool {
        self.kind() == MediaKind::Video
    }

    pub fn adaptation_set_id(&self) -> u32 {
        adaptation_set_id(self.kind())
    }
}

pub(crate) fn adaptation_set_id(kind: MediaKind) -> u32 {
    match kind {
        MediaKind::Video => VIDEO_ADAPTATION_SET_ID,
        MediaKind::Audio => AUDIO_ADAPTATION_SET_ID,
    }
}
