//! File-based frame sources: ADTS AAC and Annex-B H.264/H.265 elementary
//! streams split into timestamped frames.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use livedash_common::{CodecFamily, Error, Frame, Result};
use livedash_media::segmenter::nal::split_annex_b;
use livedash_media::segmenter::{AdtsHeader, AAC_FRAME_SAMPLES};

/// Splits an ADTS stream into one frame per AAC frame.
///
/// Presentation times are derived from the frame index and the stream's
/// sample rate.
#[derive(Debug)]
pub struct AdtsReader {
    data: Bytes,
    pos: usize,
    index: u64,
    sample_rate: u32,
    channels: u16,
}

impl AdtsReader {
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let header = AdtsHeader::parse(&data)
            .ok_or_else(|| Error::binding("input does not start with an ADTS header"))?;
        Ok(Self {
            data,
            pos: 0,
            index: 0,
            sample_rate: header.sample_rate,
            channels: header.channels,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::new(std::fs::read(path)?)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl Iterator for AdtsReader {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let header = AdtsHeader::parse(&self.data[self.pos..])?;
        let end = self.pos + header.frame_len;
        if end > self.data.len() {
            tracing::warn!(offset = self.pos, "Truncated ADTS frame at end of input");
            return None;
        }

        let micros = self.index * AAC_FRAME_SAMPLES as u64 * 1_000_000 / self.sample_rate as u64;
        let frame = Frame::new(Duration::from_micros(micros), self.data.slice(self.pos..end))
            .with_sequence_number(self.index);
        self.pos = end;
        self.index += 1;
        Some(frame)
    }
}

/// Splits an Annex-B stream into one frame per NAL unit, timestamped by
/// access unit at a fixed frame rate.
#[derive(Debug)]
pub struct AnnexBReader {
    frames: VecDeque<Frame>,
    access_units: u64,
}

impl AnnexBReader {
    pub fn new(data: impl Into<Bytes>, codec: CodecFamily, frame_rate: u32) -> Result<Self> {
        if codec == CodecFamily::Aac {
            return Err(Error::binding("Annex-B input requires a video codec"));
        }
        if frame_rate == 0 {
            return Err(Error::binding("frame rate must be greater than zero"));
        }

        let data: Bytes = data.into();
        let mut frames = VecDeque::new();
        let mut index: u64 = 0;
        let mut seen_picture = false;
        let mut sequence = 0;

        for nal in split_annex_b(&data) {
            let class = classify(codec, nal);
            let starts_unit = match class {
                NalClass::Delimiter => true,
                NalClass::Prefix => seen_picture,
                NalClass::Picture { first_slice } => first_slice && seen_picture,
                NalClass::Other => false,
            };
            if starts_unit {
                index += 1;
                seen_picture = false;
            }
            if matches!(class, NalClass::Picture { .. }) {
                seen_picture = true;
            }

            let micros = index * 1_000_000 / frame_rate as u64;
            frames.push_back(
                Frame::new(Duration::from_micros(micros), data.slice_ref(nal)).with_sequence_number(sequence),
            );
            sequence += 1;
        }

        Ok(Self {
            access_units: if frames.is_empty() { 0 } else { index + 1 },
            frames,
        })
    }

    pub fn open(path: &Path, codec: CodecFamily, frame_rate: u32) -> Result<Self> {
        Self::new(std::fs::read(path)?, codec, frame_rate)
    }

    /// Number of access units found in the stream.
    pub fn access_units(&self) -> u64 {
        self.access_units
    }
}

impl Iterator for AnnexBReader {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NalClass {
    Delimiter,
    /// Parameter sets and SEI: they precede the pictures of a new unit.
    Prefix,
    Picture { first_slice: bool },
    Other,
}

fn classify(codec: CodecFamily, nal: &[u8]) -> NalClass {
    match codec {
        CodecFamily::Hevc => {
            let nal_type = (nal[0] >> 1) & 0x3F;
            match nal_type {
                35 => NalClass::Delimiter,
                32..=34 | 39 => NalClass::Prefix,
                // first_slice_segment_in_pic_flag follows the 2-byte header
                0..=31 => NalClass::Picture {
                    first_slice: nal.get(2).is_some_and(|b| b & 0x80 != 0),
                },
                _ => NalClass::Other,
            }
        }
        _ => {
            let nal_type = nal[0] & 0x1F;
            match nal_type {
                9 => NalClass::Delimiter,
                6..=8 => NalClass::Prefix,
                // first_mb_in_slice == 0 is a single set bit in ue(v)
                1..=5 => NalClass::Picture {
                    first_slice: nal.get(1).is_some_and(|b| b & 0x80 != 0),
                },
                _ => NalClass::Other,
            }
        }
    }
}

/// Merge two time-ordered frame sources into one ordered by presentation
/// time; ties go to `first`.
pub fn interleave<A, B, T>(first: A, second: B) -> impl Iterator<Item = (T, Frame)>
where
    A: IntoIterator<Item = (T, Frame)>,
    B: IntoIterator<Item = (T, Frame)>,
{
    let mut first = first.into_iter().peekable();
    let mut second = second.into_iter().peekable();
    std::iter::from_fn(move || {
        let take_second = match (first.peek(), second.peek()) {
            (Some((_, a)), Some((_, b))) => b.presentation_time < a.presentation_time,
            (Some(_), None) => false,
            (None, _) => true,
        };
        if take_second {
            second.next()
        } else {
            first.next()
        }
    })
}
