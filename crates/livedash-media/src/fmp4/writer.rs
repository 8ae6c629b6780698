//! Init segment (ftyp + moov) and media segment (moof + mdat) writers.

use bytes::{BufMut, Bytes, BytesMut};

use super::boxes::{
    begin_box, begin_full_box, end_box, put_box, write_dinf, write_empty_sample_tables,
    write_ftyp, write_hdlr, write_mdat_header, write_mdhd, write_mvex, write_mvhd, write_tkhd,
};

/// `sample_depends_on = 2`: the sample does not depend on others.
const SYNC_SAMPLE_FLAGS: u32 = 0x0200_0000;
/// `sample_depends_on = 1` and `sample_is_non_sync_sample = 1`.
const NON_SYNC_SAMPLE_FLAGS: u32 = 0x0101_0000;

/// trun flags: data-offset, sample-duration, sample-size, sample-flags, composition-offset.
const TRUN_FLAGS: u32 = 0x000001 | 0x000100 | 0x000200 | 0x000400 | 0x000800;
/// tfhd flag: default-base-is-moof.
const TFHD_DEFAULT_BASE_IS_MOOF: u32 = 0x020000;

/// Sample description for the single track of an init segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SampleEntry {
    Avc {
        width: u16,
        height: u16,
        /// avcC content.
        config: Vec<u8>,
    },
    Hevc {
        width: u16,
        height: u16,
        /// hvcC content.
        config: Vec<u8>,
    },
    Aac {
        sample_rate: u32,
        channels: u16,
        /// esds content (including version and flags).
        config: Vec<u8>,
    },
}

impl SampleEntry {
    fn is_video(&self) -> bool {
        !matches!(self, SampleEntry::Aac { .. })
    }
}

/// Track description used to build an init segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackConfig {
    /// Track ID (1-based).
    pub track_id: u32,
    /// Media timescale (ticks per second).
    pub timescale: u32,
    pub entry: SampleEntry,
}

/// One sample of a media fragment.
#[derive(Debug, Clone, Copy)]
pub struct FragmentSample<'a> {
    /// Length-prefixed sample payload.
    pub data: &'a [u8],
    /// Duration in timescale units.
    pub duration: u32,
    pub is_sync: bool,
    /// Signed composition time offset.
    pub composition_offset: i32,
}

/// Generate an fMP4 initialization segment.
pub fn write_init_segment(config: &TrackConfig) -> Bytes {
    let mut buf = BytesMut::with_capacity(1024);
    write_ftyp(&mut buf);

    let moov = begin_box(&mut buf, b"moov");
    write_mvhd(&mut buf, config.timescale, config.track_id + 1);
    write_trak(&mut buf, config);
    write_mvex(&mut buf, config.track_id);
    end_box(&mut buf, moov);

    buf.freeze()
}

fn write_trak(buf: &mut BytesMut, config: &TrackConfig) {
    let video_size = match &config.entry {
        SampleEntry::Avc { width, height, .. } | SampleEntry::Hevc { width, height, .. } => {
            Some((*width as u32, *height as u32))
        }
        SampleEntry::Aac { .. } => None,
    };

    let trak = begin_box(buf, b"trak");
    write_tkhd(buf, config.track_id, video_size);

    let mdia = begin_box(buf, b"mdia");
    write_mdhd(buf, config.timescale);
    if config.entry.is_video() {
        write_hdlr(buf, b"vide", "VideoHandler");
    } else {
        write_hdlr(buf, b"soun", "SoundHandler");
    }

    let minf = begin_box(buf, b"minf");
    if config.entry.is_video() {
        let vmhd = begin_full_box(buf, b"vmhd", 0, 1);
        buf.put_u16(0); // graphicsmode
        buf.put_bytes(0, 6); // opcolor
        end_box(buf, vmhd);
    } else {
        let smhd = begin_full_box(buf, b"smhd", 0, 0);
        buf.put_u16(0); // balance
        buf.put_u16(0); // reserved
        end_box(buf, smhd);
    }
    write_dinf(buf);

    let stbl = begin_box(buf, b"stbl");
    let stsd = begin_full_box(buf, b"stsd", 0, 0);
    buf.put_u32(1); // entry count
    write_sample_entry(buf, &config.entry);
    end_box(buf, stsd);
    write_empty_sample_tables(buf);
    end_box(buf, stbl);

    end_box(buf, minf);
    end_box(buf, mdia);
    end_box(buf, trak);
}

fn write_sample_entry(buf: &mut BytesMut, entry: &SampleEntry) {
    match entry {
        SampleEntry::Avc { width, height, config } => {
            write_visual_entry(buf, b"avc1", *width, *height, b"avcC", config)
        }
        SampleEntry::Hevc { width, height, config } => {
            write_visual_entry(buf, b"hvc1", *width, *height, b"hvcC", config)
        }
        SampleEntry::Aac { sample_rate, channels, config } => {
            let start = begin_box(buf, b"mp4a");
            buf.put_bytes(0, 6); // reserved
            buf.put_u16(1); // data_reference_index
            buf.put_u64(0); // reserved
            buf.put_u16(*channels);
            buf.put_u16(16); // samplesize
            buf.put_u16(0); // pre_defined
            buf.put_u16(0); // reserved
            // 16.16 fixed point; rates above 65535 are carried by the esds only
            let rate = if *sample_rate > u16::MAX as u32 { 0 } else { *sample_rate << 16 };
            buf.put_u32(rate);
            put_box(buf, b"esds", config);
            end_box(buf, start);
        }
    }
}

fn write_visual_entry(
    buf: &mut BytesMut,
    box_type: &[u8; 4],
    width: u16,
    height: u16,
    config_type: &[u8; 4],
    config: &[u8],
) {
    let start = begin_box(buf, box_type);
    buf.put_bytes(0, 6); // reserved
    buf.put_u16(1); // data_reference_index
    buf.put_bytes(0, 16); // pre_defined + reserved
    buf.put_u16(width);
    buf.put_u16(height);
    buf.put_u32(0x0048_0000); // 72 dpi
    buf.put_u32(0x0048_0000);
    buf.put_u32(0); // reserved
    buf.put_u16(1); // frame_count
    buf.put_bytes(0, 32); // compressorname
    buf.put_u16(0x0018); // depth
    buf.put_i16(-1); // pre_defined
    put_box(buf, config_type, config);
    end_box(buf, start);
}

/// Generate a media segment holding one fragment of `samples`.
///
/// `base_decode_time` is the decode time of the first sample in the
/// track's timescale.
pub fn write_media_segment(
    sequence_number: u32,
    track_id: u32,
    base_decode_time: u64,
    samples: &[FragmentSample<'_>],
) -> Bytes {
    let data_size: usize = samples.iter().map(|s| s.data.len()).sum();
    let mut buf = BytesMut::with_capacity(128 + samples.len() * 16 + data_size);

    let moof = begin_box(&mut buf, b"moof");

    let mfhd = begin_full_box(&mut buf, b"mfhd", 0, 0);
    buf.put_u32(sequence_number);
    end_box(&mut buf, mfhd);

    let traf = begin_box(&mut buf, b"traf");

    let tfhd = begin_full_box(&mut buf, b"tfhd", 0, TFHD_DEFAULT_BASE_IS_MOOF);
    buf.put_u32(track_id);
    end_box(&mut buf, tfhd);

    let tfdt = begin_full_box(&mut buf, b"tfdt", 1, 0);
    buf.put_u64(base_decode_time);
    end_box(&mut buf, tfdt);

    let trun = begin_full_box(&mut buf, b"trun", 1, TRUN_FLAGS);
    buf.put_u32(samples.len() as u32);
    let data_offset_pos = buf.len();
    buf.put_i32(0); // patched below
    for sample in samples {
        buf.put_u32(sample.duration);
        buf.put_u32(sample.data.len() as u32);
        buf.put_u32(if sample.is_sync {
            SYNC_SAMPLE_FLAGS
        } else {
            NON_SYNC_SAMPLE_FLAGS
        });
        buf.put_i32(sample.composition_offset);
    }
    end_box(&mut buf, trun);

    end_box(&mut buf, traf);
    end_box(&mut buf, moof);

    let moof_len = buf.len() - moof;
    let mdat_start = buf.len();
    write_mdat_header(&mut buf, data_size as u64);
    let data_offset = (moof_len + buf.len() - mdat_start) as i32;
    buf[data_offset_pos..data_offset_pos + 4].copy_from_slice(&data_offset.to_be_bytes());

    for sample in samples {
        buf.put_slice(sample.data);
    }

    buf.freeze()
}
