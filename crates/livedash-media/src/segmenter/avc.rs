//! H.264 payload producer.

use std::time::Duration;

use bytes::Bytes;
use livedash_common::TrackSpec;

use super::nal::{AccessUnitAssembler, NalRole};
use super::{AccessUnit, PayloadProducer, FMP4_TRACK_ID};
use crate::fmp4::codec_config::{avc_codec_string, avc_decoder_config};
use crate::fmp4::{write_init_segment, SampleEntry, TrackConfig};

const SPS: usize = 0;
const PPS: usize = 1;

fn classify(nal: &[u8]) -> NalRole {
    match nal.first().map(|b| b & 0x1F) {
        Some(7) => NalRole::ParameterSet(SPS),
        Some(8) => NalRole::ParameterSet(PPS),
        Some(9) => NalRole::Delimiter,
        Some(5) => NalRole::SyncPicture,
        _ => NalRole::Other,
    }
}

#[derive(Debug, Default)]
pub struct AvcProducer {
    assembler: AccessUnitAssembler<2>,
}

impl AvcProducer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadProducer for AvcProducer {
    fn push_frame(&mut self, payload: &[u8], presentation_time: Duration) -> Option<AccessUnit> {
        self.assembler.push(payload, presentation_time, classify)
    }

    fn finish(&mut self) -> Option<AccessUnit> {
        self.assembler.take()
    }

    fn init_payload(&self, spec: &TrackSpec, timescale: u32) -> Option<Bytes> {
        let sps = self.assembler.parameter_set(SPS)?;
        let pps = self.assembler.parameter_set(PPS)?;
        let config = avc_decoder_config(sps, pps)?;
        Some(write_init_segment(&TrackConfig {
            track_id: FMP4_TRACK_ID,
            timescale,
            entry: SampleEntry::Avc {
                width: spec.width.min(u16::MAX as u32) as u16,
                height: spec.height.min(u16::MAX as u32) as u16,
                config,
            },
        }))
    }

    fn codec_string(&self) -> Option<String> {
        avc_codec_string(self.assembler.parameter_set(SPS)?)
    }
}
