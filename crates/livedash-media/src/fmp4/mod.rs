//! Fragmented MP4 serialization for DASH init and media segments.

mod boxes;
pub mod codec_config;
mod writer;

pub use writer::{write_init_segment, write_media_segment, FragmentSample, SampleEntry, TrackConfig};
