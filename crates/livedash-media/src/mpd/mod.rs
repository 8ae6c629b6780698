//! DASH manifest (MPD) model, generation and coordination.

mod coordinator;
mod generator;
pub mod types;

pub use coordinator::ManifestCoordinator;
pub use generator::{format_duration, generate_mpd, MpdHeader};
pub use types::{
    AdaptationSet, AudioInfo, RepresentationInfo, SegmentTemplate, TimelineEntry, VideoInfo,
    AUDIO_ADAPTATION_SET_ID, VIDEO_ADAPTATION_SET_ID,
};
