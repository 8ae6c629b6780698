//! Decoder configuration records (avcC, hvcC, esds) and RFC 6381 codec strings.

/// AAC-LC audio object type.
pub const AAC_LC_OBJECT_TYPE: u8 = 2;

/// Sampling frequencies addressable by the 4-bit AAC frequency index.
pub const AAC_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// HEVC NAL unit types for parameter sets.
const HEVC_NAL_VPS: u8 = 32;
const HEVC_NAL_SPS: u8 = 33;
const HEVC_NAL_PPS: u8 = 34;

/// Remove emulation prevention bytes (`00 00 03`) from a NAL unit payload.
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

// ---------------------------------------------------------------------------
// H.264
// ---------------------------------------------------------------------------

/// Build the content of an `avcC` box from one SPS and one PPS NAL unit
/// (without start codes).
///
/// Returns `None` if the SPS is too short to carry profile and level.
pub fn avc_decoder_config(sps: &[u8], pps: &[u8]) -> Option<Vec<u8>> {
    if sps.len() < 4 {
        return None;
    }

    let mut out = Vec::with_capacity(11 + sps.len() + pps.len());
    out.push(1); // configurationVersion
    out.push(sps[1]); // AVCProfileIndication
    out.push(sps[2]); // profile_compatibility
    out.push(sps[3]); // AVCLevelIndication
    out.push(0xFC | 3); // lengthSizeMinusOne = 3
    out.push(0xE0 | 1); // one SPS
    out.extend_from_slice(&(sps.len() as u16).to_be_bytes());
    out.extend_from_slice(sps);
    out.push(1); // one PPS
    out.extend_from_slice(&(pps.len() as u16).to_be_bytes());
    out.extend_from_slice(pps);
    Some(out)
}

/// `avc1.PPCCLL` codec string from an SPS NAL unit.
pub fn avc_codec_string(sps: &[u8]) -> Option<String> {
    if sps.len() < 4 {
        return None;
    }
    Some(format!("avc1.{:02x}{:02x}{:02x}", sps[1], sps[2], sps[3]))
}

// ---------------------------------------------------------------------------
// H.265
// ---------------------------------------------------------------------------

/// General profile/tier/level fields from an HEVC SPS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HevcProfile {
    pub profile_space: u8,
    pub tier_flag: bool,
    pub profile_idc: u8,
    pub compatibility_flags: u32,
    pub constraint_flags: [u8; 6],
    pub level_idc: u8,
    pub max_sub_layers: u8,
    pub temporal_id_nesting: bool,
}

impl HevcProfile {
    /// Parse the general profile_tier_level that follows the SPS header.
    pub fn from_sps(sps: &[u8]) -> Option<Self> {
        let rbsp = unescape_rbsp(sps);
        // 2-byte NAL header, 1 byte of vps id / sub layers, 12 bytes of PTL
        if rbsp.len() < 15 {
            return None;
        }
        let header = rbsp[2];
        let ptl = &rbsp[3..15];
        let mut constraint_flags = [0u8; 6];
        constraint_flags.copy_from_slice(&ptl[5..11]);
        Some(Self {
            profile_space: ptl[0] >> 6,
            tier_flag: ptl[0] & 0x20 != 0,
            profile_idc: ptl[0] & 0x1F,
            compatibility_flags: u32::from_be_bytes([ptl[1], ptl[2], ptl[3], ptl[4]]),
            constraint_flags,
            level_idc: ptl[11],
            max_sub_layers: ((header >> 1) & 0x07) + 1,
            temporal_id_nesting: header & 0x01 != 0,
        })
    }

    /// `hvc1.P.C.TL.B` codec string.
    pub fn codec_string(&self) -> String {
        let space = match self.profile_space {
            1 => "A",
            2 => "B",
            3 => "C",
            _ => "",
        };
        let tier = if self.tier_flag { 'H' } else { 'L' };
        let mut out = format!(
            "hvc1.{}{}.{:X}.{}{}",
            space,
            self.profile_idc,
            self.compatibility_flags.reverse_bits(),
            tier,
            self.level_idc
        );

        let significant = self
            .constraint_flags
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        for byte in &self.constraint_flags[..significant] {
            out.push_str(&format!(".{:X}", byte));
        }
        out
    }
}

/// Build the content of an `hvcC` box from VPS, SPS and PPS NAL units.
pub fn hevc_decoder_config(vps: &[u8], sps: &[u8], pps: &[u8]) -> Option<Vec<u8>> {
    let profile = HevcProfile::from_sps(sps)?;

    let mut out = Vec::with_capacity(23 + 15 + vps.len() + sps.len() + pps.len());
    out.push(1); // configurationVersion
    out.push((profile.profile_space << 6) | ((profile.tier_flag as u8) << 5) | profile.profile_idc);
    out.extend_from_slice(&profile.compatibility_flags.to_be_bytes());
    out.extend_from_slice(&profile.constraint_flags);
    out.push(profile.level_idc);
    out.extend_from_slice(&0xF000u16.to_be_bytes()); // min_spatial_segmentation_idc = 0
    out.push(0xFC); // parallelismType = 0
    out.push(0xFD); // chromaFormat = 4:2:0
    out.push(0xF8); // bitDepthLumaMinus8 = 0
    out.push(0xF8); // bitDepthChromaMinus8 = 0
    out.extend_from_slice(&0u16.to_be_bytes()); // avgFrameRate
    out.push((profile.max_sub_layers << 3) | ((profile.temporal_id_nesting as u8) << 2) | 3);
    out.push(3); // numOfArrays
    for (nal_type, nal) in [(HEVC_NAL_VPS, vps), (HEVC_NAL_SPS, sps), (HEVC_NAL_PPS, pps)] {
        out.push(0x80 | nal_type); // array_completeness = 1
        out.extend_from_slice(&1u16.to_be_bytes());
        out.extend_from_slice(&(nal.len() as u16).to_be_bytes());
        out.extend_from_slice(nal);
    }
    Some(out)
}

// ---------------------------------------------------------------------------
// AAC
// ---------------------------------------------------------------------------

/// Index of `sample_rate` in the AAC frequency table.
pub fn aac_frequency_index(sample_rate: u32) -> Option<u8> {
    AAC_SAMPLE_RATES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|i| i as u8)
}

/// Build an AudioSpecificConfig.
///
/// Rates outside the standard table use the explicit 24-bit escape.
pub fn audio_specific_config(object_type: u8, sample_rate: u32, channels: u16) -> Vec<u8> {
    let channels = (channels as u64) & 0x0F;
    let (bits, width) = match aac_frequency_index(sample_rate) {
        Some(index) => (
            ((object_type as u64) << 11) | ((index as u64) << 7) | (channels << 3),
            16,
        ),
        None => (
            ((object_type as u64) << 35)
                | (0x0F << 31)
                | (((sample_rate as u64) & 0xFF_FFFF) << 7)
                | (channels << 3),
            40,
        ),
    };
    let bytes = bits.to_be_bytes();
    bytes[8 - width / 8..].to_vec()
}

/// Build the content of an `esds` full box wrapping an AudioSpecificConfig.
pub fn esds_content(audio_specific_config: &[u8], bitrate: u32) -> Vec<u8> {
    let asc_len = audio_specific_config.len() as u8;
    let decoder_config_len = 13 + 2 + asc_len;
    let es_len = 3 + 2 + decoder_config_len + 3;

    let mut out = Vec::with_capacity(4 + 2 + es_len as usize);
    out.extend_from_slice(&[0, 0, 0, 0]); // version + flags
    out.push(0x03); // ES_DescrTag
    out.push(es_len);
    out.extend_from_slice(&0u16.to_be_bytes()); // ES_ID
    out.push(0); // flags
    out.push(0x04); // DecoderConfigDescrTag
    out.push(decoder_config_len);
    out.push(0x40); // objectTypeIndication: MPEG-4 audio
    out.push(0x15); // streamType audio, upStream 0, reserved 1
    out.extend_from_slice(&[0, 0, 0]); // bufferSizeDB
    out.extend_from_slice(&bitrate.to_be_bytes()); // maxBitrate
    out.extend_from_slice(&bitrate.to_be_bytes()); // avgBitrate
    out.push(0x05); // DecSpecificInfoTag
    out.push(asc_len);
    out.extend_from_slice(audio_specific_config);
    out.push(0x06); // SLConfigDescrTag
    out.push(1);
    out.push(2); // predefined: MP4
    out
}

/// `mp4a.40.N` codec string.
pub fn aac_codec_string(object_type: u8) -> String {
    format!("mp4a.40.{}", object_type)
}
