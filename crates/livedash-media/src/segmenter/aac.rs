//! AAC payload producer and ADTS header parsing.

use std::time::Duration;

use bytes::Bytes;
use livedash_common::TrackSpec;

use super::{AccessUnit, PayloadProducer, FMP4_TRACK_ID};
use crate::fmp4::codec_config::{
    aac_codec_string, audio_specific_config, esds_content, AAC_LC_OBJECT_TYPE, AAC_SAMPLE_RATES,
};
use crate::fmp4::{write_init_segment, SampleEntry, TrackConfig};

/// Samples per AAC frame.
pub const AAC_FRAME_SAMPLES: u32 = 1024;

/// Fixed fields of an ADTS frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// MPEG-4 audio object type (profile + 1).
    pub object_type: u8,
    pub sample_rate: u32,
    pub channels: u16,
    /// 7 bytes, or 9 when a CRC is present.
    pub header_len: usize,
    /// Total frame length including the header.
    pub frame_len: usize,
}

impl AdtsHeader {
    /// Parse the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 7 || data[0] != 0xFF || data[1] & 0xF0 != 0xF0 {
            return None;
        }
        let protection_absent = data[1] & 0x01 != 0;
        let profile = data[2] >> 6;
        let frequency_index = ((data[2] >> 2) & 0x0F) as usize;
        let channels = (((data[2] & 0x01) << 2) | (data[3] >> 6)) as u16;
        let frame_len =
            (((data[3] & 0x03) as usize) << 11) | ((data[4] as usize) << 3) | ((data[5] >> 5) as usize);
        let header_len = if protection_absent { 7 } else { 9 };
        if frame_len < header_len {
            return None;
        }
        Some(Self {
            object_type: profile + 1,
            sample_rate: *AAC_SAMPLE_RATES.get(frequency_index)?,
            channels,
            header_len,
            frame_len,
        })
    }
}

/// Passthrough producer: every frame is one access unit.
#[derive(Debug)]
pub struct AacProducer {
    object_type: u8,
}

impl Default for AacProducer {
    fn default() -> Self {
        Self {
            object_type: AAC_LC_OBJECT_TYPE,
        }
    }
}

impl AacProducer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadProducer for AacProducer {
    fn push_frame(&mut self, payload: &[u8], presentation_time: Duration) -> Option<AccessUnit> {
        let raw = match AdtsHeader::parse(payload) {
            Some(header) if header.frame_len <= payload.len() => {
                self.object_type = header.object_type;
                &payload[header.header_len..header.frame_len]
            }
            _ => payload,
        };
        if raw.is_empty() {
            return None;
        }
        Some(AccessUnit {
            presentation_time,
            data: Bytes::copy_from_slice(raw),
            is_sync: true,
        })
    }

    fn finish(&mut self) -> Option<AccessUnit> {
        None
    }

    fn init_payload(&self, spec: &TrackSpec, timescale: u32) -> Option<Bytes> {
        let asc = audio_specific_config(self.object_type, spec.sample_rate, spec.channels);
        let bitrate = spec.bitrate.min(u32::MAX as u64) as u32;
        Some(write_init_segment(&TrackConfig {
            track_id: FMP4_TRACK_ID,
            timescale,
            entry: SampleEntry::Aac {
                sample_rate: spec.sample_rate,
                channels: spec.channels,
                config: esds_content(&asc, bitrate),
            },
        }))
    }

    fn codec_string(&self) -> Option<String> {
        Some(aac_codec_string(self.object_type))
    }
}
