//! H.265 payload producer.

use std::time::Duration;

use bytes::Bytes;
use livedash_common::TrackSpec;

use super::nal::{AccessUnitAssembler, NalRole};
use super::{AccessUnit, PayloadProducer, FMP4_TRACK_ID};
use crate::fmp4::codec_config::{hevc_decoder_config, HevcProfile};
use crate::fmp4::{write_init_segment, SampleEntry, TrackConfig};

const VPS: usize = 0;
const SPS: usize = 1;
const PPS: usize = 2;

fn classify(nal: &[u8]) -> NalRole {
    match nal.first().map(|b| (b >> 1) & 0x3F) {
        Some(32) => NalRole::ParameterSet(VPS),
        Some(33) => NalRole::ParameterSet(SPS),
        Some(34) => NalRole::ParameterSet(PPS),
        Some(35) => NalRole::Delimiter,
        // BLA, IDR and CRA pictures
        Some(16..=23) => NalRole::SyncPicture,
        _ => NalRole::Other,
    }
}

#[derive(Debug, Default)]
pub struct HevcProducer {
    assembler: AccessUnitAssembler<3>,
}

impl HevcProducer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PayloadProducer for HevcProducer {
    fn push_frame(&mut self, payload: &[u8], presentation_time: Duration) -> Option<AccessUnit> {
        self.assembler.push(payload, presentation_time, classify)
    }

    fn finish(&mut self) -> Option<AccessUnit> {
        self.assembler.take()
    }

    fn init_payload(&self, spec: &TrackSpec, timescale: u32) -> Option<Bytes> {
        let config = hevc_decoder_config(
            self.assembler.parameter_set(VPS)?,
            self.assembler.parameter_set(SPS)?,
            self.assembler.parameter_set(PPS)?,
        )?;
        Some(write_init_segment(&TrackConfig {
            track_id: FMP4_TRACK_ID,
            timescale,
            entry: SampleEntry::Hevc {
                width: spec.width.min(u16::MAX as u32) as u16,
                height: spec.height.min(u16::MAX as u32) as u16,
                config,
            },
        }))
    }

    fn codec_string(&self) -> Option<String> {
        let sps = self.assembler.parameter_set(SPS)?;
        HevcProfile::from_sps(sps).map(|profile| profile.codec_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livedash_common::CodecFamily;

    const VPS_NAL: [u8; 3] = [0x40, 0x01, 0x0C];
    const SPS_NAL: [u8; 18] = [
        0x42, 0x01, 0x01, 0x01, 0x60, 0x00, 0x00, 0x03, 0x00, 0x90, 0x00, 0x00, 0x03, 0x00, 0x00,
        0x03, 0x00, 0x5D,
    ];
    const PPS_NAL: [u8; 3] = [0x44, 0x01, 0xC1];

    #[test]
    fn test_init_and_codec_string() {
        let spec = TrackSpec::video(CodecFamily::Hevc, 1920, 1080, 30);
        let mut producer = HevcProducer::new();
        for nal in [&VPS_NAL[..], &SPS_NAL[..]] {
            producer.push_frame(nal, Duration::ZERO);
        }
        assert!(producer.init_payload(&spec, 90000).is_none());
        producer.push_frame(&PPS_NAL, Duration::ZERO);

        let init = producer.init_payload(&spec, 90000).unwrap();
        assert!(init.windows(4).any(|w| w == b"hvc1"));
        assert!(init.windows(4).any(|w| w == b"hvcC"));
        assert_eq!(producer.codec_string().unwrap(), "hvc1.1.6.L93.90");
    }

    #[test]
    fn test_irap_marks_sync() {
        let mut producer = HevcProducer::new();
        // IDR_W_RADL (19)
        producer.push_frame(&[0x26, 0x01, 0xAF], Duration::ZERO);
        // TRAIL_R (1)
        let au = producer
            .push_frame(&[0x02, 0x01, 0xD0], Duration::from_millis(33))
            .unwrap();
        assert!(au.is_sync);
        assert!(!producer.finish().unwrap().is_sync);
    }
}
