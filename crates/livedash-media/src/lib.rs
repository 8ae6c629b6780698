//! Livedash-Media: the segmentation and manifest engine.
//!
//! This crate provides:
//!
//! - **fMP4**: init (ftyp + moov) and media (moof + mdat) segment writers
//!   with avcC, hvcC and esds decoder configurations
//! - **Segments**: reusable [`Segment`] buffers and the [`SegmentStore`]
//!   boundary they are persisted through
//! - **Segmenter**: the per-track [`TrackSegmenter`] deciding segment
//!   boundaries, with H.264, H.265 and AAC payload producers
//! - **MPD**: the [`ManifestCoordinator`] owning the dynamic manifest and its
//!   availability window

pub mod fmp4;
pub mod mpd;
pub mod segment;
pub mod segmenter;

pub use mpd::{
    ManifestCoordinator, AUDIO_ADAPTATION_SET_ID, VIDEO_ADAPTATION_SET_ID,
};
pub use segment::{
    init_file_name, manifest_file_name, segment_file_name, FsStore, Segment, SegmentStore,
    SegmentWindow,
};
pub use segmenter::{AccessUnit, PayloadProducer, SegmenterState, TrackSegmenter};
