//! ISO BMFF box serialization primitives.
//!
//! Boxes are written into a [`BytesMut`] with a placeholder size that is
//! patched once the box's children are complete.

use bytes::{BufMut, BytesMut};

/// Identity transformation matrix shared by `mvhd` and `tkhd`.
const UNITY_MATRIX: [u32; 9] = [0x00010000, 0, 0, 0, 0x00010000, 0, 0, 0, 0x40000000];

/// Start a box: reserves the size field and writes the type.
/// Returns the offset to pass to [`end_box`].
pub(crate) fn begin_box(buf: &mut BytesMut, box_type: &[u8; 4]) -> usize {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_slice(box_type);
    start
}

/// Start a full box (box header followed by version and flags).
pub(crate) fn begin_full_box(buf: &mut BytesMut, box_type: &[u8; 4], version: u8, flags: u32) -> usize {
    let start = begin_box(buf, box_type);
    buf.put_u32(((version as u32) << 24) | (flags & 0x00FF_FFFF));
    start
}

/// Patch the size of the box started at `start`.
pub(crate) fn end_box(buf: &mut BytesMut, start: usize) {
    let size = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&size.to_be_bytes());
}

/// Write a leaf box whose content is already serialized.
pub(crate) fn put_box(buf: &mut BytesMut, box_type: &[u8; 4], content: &[u8]) {
    buf.put_u32((8 + content.len()) as u32);
    buf.put_slice(box_type);
    buf.put_slice(content);
}

pub(crate) fn write_ftyp(buf: &mut BytesMut) {
    let start = begin_box(buf, b"ftyp");
    buf.put_slice(b"iso6"); // major brand
    buf.put_u32(0); // minor version
    for brand in [b"iso6", b"isom", b"dash", b"mp41"] {
        buf.put_slice(brand);
    }
    end_box(buf, start);
}

pub(crate) fn write_mvhd(buf: &mut BytesMut, timescale: u32, next_track_id: u32) {
    let start = begin_full_box(buf, b"mvhd", 1, 0);
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(timescale);
    buf.put_u64(0); // duration unknown for live
    buf.put_u32(0x00010000); // rate 1.0
    buf.put_u16(0x0100); // volume 1.0
    buf.put_bytes(0, 10); // reserved
    for value in UNITY_MATRIX {
        buf.put_u32(value);
    }
    buf.put_bytes(0, 24); // pre_defined
    buf.put_u32(next_track_id);
    end_box(buf, start);
}

pub(crate) fn write_tkhd(buf: &mut BytesMut, track_id: u32, video_size: Option<(u32, u32)>) {
    // flags: enabled | in_movie | in_preview
    let start = begin_full_box(buf, b"tkhd", 1, 7);
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(track_id);
    buf.put_u32(0); // reserved
    buf.put_u64(0); // duration
    buf.put_u64(0); // reserved
    buf.put_u16(0); // layer
    buf.put_u16(0); // alternate group
    buf.put_u16(if video_size.is_some() { 0 } else { 0x0100 });
    buf.put_u16(0); // reserved
    for value in UNITY_MATRIX {
        buf.put_u32(value);
    }
    let (width, height) = video_size.unwrap_or((0, 0));
    buf.put_u32(width << 16);
    buf.put_u32(height << 16);
    end_box(buf, start);
}

pub(crate) fn write_mdhd(buf: &mut BytesMut, timescale: u32) {
    let start = begin_full_box(buf, b"mdhd", 1, 0);
    buf.put_u64(0); // creation time
    buf.put_u64(0); // modification time
    buf.put_u32(timescale);
    buf.put_u64(0); // duration
    buf.put_u16(0x55C4); // language: und
    buf.put_u16(0); // pre_defined
    end_box(buf, start);
}

pub(crate) fn write_hdlr(buf: &mut BytesMut, handler_type: &[u8; 4], name: &str) {
    let start = begin_full_box(buf, b"hdlr", 0, 0);
    buf.put_u32(0); // pre_defined
    buf.put_slice(handler_type);
    buf.put_bytes(0, 12); // reserved
    buf.put_slice(name.as_bytes());
    buf.put_u8(0);
    end_box(buf, start);
}

pub(crate) fn write_dinf(buf: &mut BytesMut) {
    let dinf = begin_box(buf, b"dinf");
    let dref = begin_full_box(buf, b"dref", 0, 0);
    buf.put_u32(1); // entry count
    // url with flags = 1: media data is in the same file
    let url = begin_full_box(buf, b"url ", 0, 1);
    end_box(buf, url);
    end_box(buf, dref);
    end_box(buf, dinf);
}

/// Empty sample tables required by the init segment's `stbl`.
pub(crate) fn write_empty_sample_tables(buf: &mut BytesMut) {
    for box_type in [b"stts", b"stsc", b"stco"] {
        let start = begin_full_box(buf, box_type, 0, 0);
        buf.put_u32(0); // entry count
        end_box(buf, start);
    }
    let stsz = begin_full_box(buf, b"stsz", 0, 0);
    buf.put_u32(0); // sample size
    buf.put_u32(0); // sample count
    end_box(buf, stsz);
}

pub(crate) fn write_mvex(buf: &mut BytesMut, track_id: u32) {
    let mvex = begin_box(buf, b"mvex");
    let trex = begin_full_box(buf, b"trex", 0, 0);
    buf.put_u32(track_id);
    buf.put_u32(1); // default sample description index
    buf.put_u32(0); // default sample duration
    buf.put_u32(0); // default sample size
    buf.put_u32(0); // default sample flags
    end_box(buf, trex);
    end_box(buf, mvex);
}

pub(crate) fn write_mdat_header(buf: &mut BytesMut, data_size: u64) {
    if data_size + 8 > u32::MAX as u64 {
        buf.put_u32(1); // extended size follows
        buf.put_slice(b"mdat");
        buf.put_u64(data_size + 16);
    } else {
        buf.put_u32((data_size + 8) as u32);
        buf.put_slice(b"mdat");
    }
}
