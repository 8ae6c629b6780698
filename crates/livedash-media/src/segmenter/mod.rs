//! Per-track segmentation engine.
//!
//! A [`TrackSegmenter`] turns a track's frames into access units, buffers
//! them for the in-progress segment and decides when a segment boundary is
//! crossed. Codec specifics (access unit reassembly, init payloads) live
//! behind the [`PayloadProducer`] trait.
//!
//! All timestamps handed out by the segmenter are anchored to the session's
//! timestamp offset. Conversions into the track's time base are computed from
//! the absolute anchored time on every call, so repeated cuts never drift.

mod aac;
mod avc;
mod hevc;
pub mod nal;

use std::time::Duration;

use bytes::Bytes;
use livedash_common::{CodecFamily, Error, Frame, MediaKind, Result, TrackSpec};

use crate::fmp4::{write_media_segment, FragmentSample};
use crate::segment::{Segment, SegmentWindow};

pub use aac::{AacProducer, AdtsHeader, AAC_FRAME_SAMPLES};
pub use avc::AvcProducer;
pub use hevc::HevcProducer;

/// Time base of every video track (90 kHz).
pub const VIDEO_TIME_BASE: u32 = 90_000;

/// Payloads shorter than one box header are treated as producer failures.
pub const MIN_PAYLOAD_LEN: usize = 8;

/// Track id used inside the produced fMP4 fragments.
pub(crate) const FMP4_TRACK_ID: u32 = 1;

/// Frame rate assumed when a video track does not declare one.
const DEFAULT_FRAME_RATE: u32 = 30;

/// The 32-bit `mfhd` sequence number of segment `sequence_number`.
///
/// The box field is 32 bits wide; the counter wraps after `u32::MAX`.
pub fn fragment_sequence_number(sequence_number: u64) -> u32 {
    (sequence_number & u64::from(u32::MAX)) as u32
}

/// Convert an anchored time into `time_base` units.
pub fn to_time_base(anchored: Duration, time_base: u32) -> u64 {
    (anchored.as_micros() * time_base as u128 / 1_000_000) as u64
}

/// The smallest independently timestamped decodable unit of a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessUnit {
    /// Presentation time relative to the session's timestamp offset.
    pub presentation_time: Duration,
    /// Serialized sample (length-prefixed NAL units or raw AAC).
    pub data: Bytes,
    /// Whether a segment may start with this unit.
    pub is_sync: bool,
}

/// Codec-specific payload production.
pub trait PayloadProducer: Send + std::fmt::Debug {
    /// Feed one frame; returns an access unit once one is complete.
    fn push_frame(&mut self, payload: &[u8], presentation_time: Duration) -> Option<AccessUnit>;

    /// Drain an access unit still being assembled.
    fn finish(&mut self) -> Option<AccessUnit>;

    /// Initialization payload, or `None` while parameter sets are unknown.
    fn init_payload(&self, spec: &TrackSpec, timescale: u32) -> Option<Bytes>;

    /// RFC 6381 codec string, once it can be derived.
    fn codec_string(&self) -> Option<String>;

    /// Serialize buffered samples into one media segment.
    fn media_payload(
        &self,
        sequence_number: u32,
        base_decode_time: u64,
        samples: &[FragmentSample<'_>],
    ) -> Bytes {
        write_media_segment(sequence_number, FMP4_TRACK_ID, base_decode_time, samples)
    }
}

/// Lifecycle of a segmenter while its track is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Codec bound, timestamp offset not yet known.
    Unconfigured,
    /// Time base and offset known, no frame seen yet.
    Configured,
    /// At least one frame has been managed.
    Segmenting,
}

#[derive(Debug)]
struct BufferedSample {
    micros: u64,
    data: Bytes,
    is_sync: bool,
}

/// Stateful segmentation engine for one track.
#[derive(Debug)]
pub struct TrackSegmenter {
    spec: TrackSpec,
    time_base: u32,
    segment_duration: Duration,
    offset: Option<Duration>,
    state: SegmenterState,
    sequence_number: u64,
    producer: Box<dyn PayloadProducer>,
    samples: Vec<BufferedSample>,
    /// Start of the in-progress segment, anchored micros.
    window_start: Option<u64>,
    /// Time of the most recent buffered or serialized sample.
    last_sample: Option<u64>,
}

impl TrackSegmenter {
    /// Bind a segmenter to the codec family described by `spec`.
    pub fn new(spec: &TrackSpec, segment_duration: Duration, offset: Option<Duration>) -> Result<Self> {
        spec.validate()?;
        if segment_duration.is_zero() {
            return Err(Error::binding("segment duration must be greater than zero"));
        }

        let (time_base, producer): (u32, Box<dyn PayloadProducer>) = match spec.codec {
            CodecFamily::Avc => (VIDEO_TIME_BASE, Box::new(AvcProducer::new())),
            CodecFamily::Hevc => (VIDEO_TIME_BASE, Box::new(HevcProducer::new())),
            CodecFamily::Aac => (spec.sample_rate, Box::new(AacProducer::new())),
        };

        Ok(Self {
            spec: spec.clone(),
            time_base,
            segment_duration,
            offset,
            state: if offset.is_some() {
                SegmenterState::Configured
            } else {
                SegmenterState::Unconfigured
            },
            sequence_number: 0,
            producer,
            samples: Vec::new(),
            window_start: None,
            last_sample: None,
        })
    }

    /// Anchor the segmenter. Ignored once an offset is set.
    pub fn set_offset(&mut self, offset: Duration) {
        if self.offset.is_some() {
            return;
        }
        self.offset = Some(offset);
        if self.state == SegmenterState::Unconfigured {
            self.state = SegmenterState::Configured;
        }
    }

    /// Reassemble `frame` into an access unit if one is complete.
    ///
    /// A segmenter that was never anchored anchors itself to this frame.
    pub fn manage_frame(&mut self, frame: &Frame) -> Option<AccessUnit> {
        if self.offset.is_none() {
            self.set_offset(frame.presentation_time);
        }
        self.state = SegmenterState::Segmenting;

        let offset = self.offset.unwrap_or_default();
        let anchored = frame.presentation_time.saturating_sub(offset);
        tracing::trace!(
            codec = %self.spec.codec,
            pts_us = anchored.as_micros() as u64,
            sequence = frame.sequence_number,
            len = frame.payload.len(),
            "Frame received"
        );
        self.producer.push_frame(&frame.payload, anchored)
    }

    /// Drain any access unit still held by the producer.
    pub fn finish(&mut self) -> Option<AccessUnit> {
        self.producer.finish()
    }

    /// Append `unit` to the in-progress segment.
    ///
    /// Fails when the unit precedes the last buffered one.
    pub fn append_access_unit(&mut self, unit: AccessUnit) -> bool {
        let micros = unit.presentation_time.as_micros() as u64;
        if self.last_sample.is_some_and(|last| micros < last) {
            return false;
        }
        if self.window_start.is_none() {
            self.window_start = Some(micros);
        }
        self.last_sample = Some(micros);
        self.samples.push(BufferedSample {
            micros,
            data: unit.data,
            is_sync: unit.is_sync,
        });
        true
    }

    /// Try to close the in-progress segment into `segment`.
    ///
    /// Without `force`, a cut happens only when `unit` is a sync sample at
    /// least one segment duration past the segment start. The unit itself is
    /// not part of the closed segment; the caller appends it afterwards.
    pub fn generate_segment(&mut self, segment: &mut Segment, unit: Option<&AccessUnit>, force: bool) -> bool {
        if unit.is_none() && !force {
            return false;
        }
        let Some(start) = self.window_start else {
            return false;
        };
        if self.samples.is_empty() {
            return false;
        }

        let end = match unit {
            Some(unit) => {
                let micros = unit.presentation_time.as_micros() as u64;
                let elapsed = micros.saturating_sub(start);
                if !force && (!unit.is_sync || elapsed < self.segment_duration.as_micros() as u64) {
                    return false;
                }
                micros
            }
            None => self.buffered_end(),
        };
        if end <= start {
            return false;
        }

        self.cut(segment, SegmentWindow::new(start, end))
    }

    /// Force the in-progress segment to cover exactly `window`.
    ///
    /// Samples before the window end are serialized; later ones carry over
    /// into the next segment, which starts at the window end.
    pub fn generate_segment_until(&mut self, segment: &mut Segment, window: SegmentWindow) -> bool {
        if window.end_micros <= window.start_micros {
            return false;
        }
        if !self.samples.iter().any(|s| s.micros < window.end_micros) {
            return false;
        }
        self.cut(segment, window)
    }

    fn cut(&mut self, segment: &mut Segment, window: SegmentWindow) -> bool {
        // samples before a forced window's start belong to no segment
        let early = self
            .samples
            .iter()
            .take_while(|s| s.micros < window.start_micros)
            .count();
        if early > 0 {
            tracing::debug!(
                codec = %self.spec.codec,
                samples = early,
                start_us = window.start_micros,
                "Dropping samples before the segment window"
            );
            self.samples.drain(..early);
        }

        let count = self
            .samples
            .iter()
            .take_while(|s| s.micros < window.end_micros)
            .count();
        if count == 0 {
            return false;
        }

        let timestamp = self.micros_to_time_base(window.start_micros);
        let end_ts = self.micros_to_time_base(window.end_micros);
        let mut times: Vec<u64> = self.samples[..count]
            .iter()
            .map(|s| self.micros_to_time_base(s.micros))
            .collect();
        // the fragment starts exactly where the window does
        times[0] = timestamp;
        let fragment: Vec<FragmentSample<'_>> = self.samples[..count]
            .iter()
            .enumerate()
            .map(|(i, sample)| {
                let next = times.get(i + 1).copied().unwrap_or(end_ts);
                FragmentSample {
                    data: &sample.data,
                    duration: next.saturating_sub(times[i]).min(u32::MAX as u64) as u32,
                    is_sync: sample.is_sync,
                    composition_offset: 0,
                }
            })
            .collect();

        let sequence_number = self.sequence_number + 1;
        let payload = self
            .producer
            .media_payload(fragment_sequence_number(sequence_number), timestamp, &fragment);
        if payload.len() < MIN_PAYLOAD_LEN {
            tracing::error!(
                codec = %self.spec.codec,
                len = payload.len(),
                "Payload producer returned a below-minimum segment"
            );
            return false;
        }
        if let Err(e) = segment.fill(&payload) {
            // at-most-once: the window is lost, the next one starts clean
            tracing::error!(
                codec = %self.spec.codec,
                error = %e,
                samples = count,
                start_us = window.start_micros,
                end_us = window.end_micros,
                "Segment generation failed, dropping window"
            );
            self.samples.drain(..count);
            self.window_start = Some(window.end_micros);
            return false;
        }

        segment.mark_complete(sequence_number, timestamp, end_ts - timestamp, window);
        self.sequence_number = sequence_number;
        self.samples.drain(..count);
        self.window_start = Some(window.end_micros);

        tracing::debug!(
            codec = %self.spec.codec,
            sequence = sequence_number,
            timestamp,
            duration = end_ts - timestamp,
            samples = count,
            bytes = segment.len(),
            "Segment generated"
        );
        true
    }

    /// End of the buffered samples: the last sample's time plus its nominal
    /// duration.
    fn buffered_end(&self) -> u64 {
        match self.samples.as_slice() {
            [] => self.window_start.unwrap_or(0),
            [.., last] => last.micros + self.nominal_sample_micros(),
        }
    }

    fn nominal_sample_micros(&self) -> u64 {
        match self.kind() {
            MediaKind::Video => {
                let fps = if self.spec.frame_rate == 0 {
                    DEFAULT_FRAME_RATE
                } else {
                    self.spec.frame_rate
                };
                1_000_000 / fps as u64
            }
            MediaKind::Audio => AAC_FRAME_SAMPLES as u64 * 1_000_000 / self.time_base as u64,
        }
    }

    /// Produce the init payload into `segment`.
    ///
    /// Returns false when the buffer already holds a payload or when the
    /// codec parameters are not known yet.
    pub fn generate_init_segment(&mut self, segment: &mut Segment) -> bool {
        if !segment.is_empty() {
            return false;
        }
        let Some(payload) = self.producer.init_payload(&self.spec, self.time_base) else {
            return false;
        };
        if payload.len() < MIN_PAYLOAD_LEN {
            return false;
        }
        match segment.fill(&payload) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(codec = %self.spec.codec, error = %e, "Init segment generation failed");
                false
            }
        }
    }

    /// Convert an anchored time into this track's time base.
    pub fn to_time_base(&self, anchored: Duration) -> u64 {
        to_time_base(anchored, self.time_base)
    }

    fn micros_to_time_base(&self, micros: u64) -> u64 {
        self.to_time_base(Duration::from_micros(micros))
    }

    pub fn kind(&self) -> MediaKind {
        self.spec.codec.kind()
    }

    pub fn codec(&self) -> CodecFamily {
        self.spec.codec
    }

    pub fn spec(&self) -> &TrackSpec {
        &self.spec
    }

    pub fn codec_string(&self) -> Option<String> {
        self.producer.codec_string()
    }

    pub fn time_base(&self) -> u32 {
        self.time_base
    }

    pub fn segment_duration(&self) -> Duration {
        self.segment_duration
    }

    pub fn timestamp_offset(&self) -> Option<Duration> {
        self.offset
    }

    pub fn state(&self) -> SegmenterState {
        self.state
    }

    /// Sequence number of the last generated segment (0 before the first).
    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn bitrate(&self) -> u64 {
        self.spec.bitrate
    }

    pub fn set_bitrate(&mut self, bitrate: u64) {
        self.spec.bitrate = bitrate;
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn height(&self) -> u32 {
        self.spec.height
    }

    pub fn frame_rate(&self) -> u32 {
        self.spec.frame_rate
    }

    pub fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.spec.channels
    }

    /// Number of access units waiting for the next cut.
    pub fn buffered(&self) -> usize {
        self.samples.len()
    }
}
