//! Shared test harness for integration tests.
//!
//! Provides synthetic AAC and H.264 frame generators plus in-memory
//! [`SegmentStore`] implementations that record or reject writes.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use livedash_common::{Frame, TrackId};
use livedash_media::{FsStore, SegmentStore};

pub const SPS_NAL: [u8; 8] = [0x67, 0x64, 0x00, 0x1F, 0xAC, 0xD9, 0x40, 0x50];
pub const PPS_NAL: [u8; 4] = [0x68, 0xEB, 0xE3, 0xCB];

/// Anchored micros of AAC frame `index` at `sample_rate`.
pub fn aac_frame_micros(index: u64, sample_rate: u32) -> u64 {
    index * 1024 * 1_000_000 / sample_rate as u64
}

/// Raw (header-less) AAC frames covering `secs` seconds.
pub fn aac_frames(id: TrackId, sample_rate: u32, secs: u64) -> Vec<(TrackId, Frame)> {
    let count = secs * sample_rate as u64 / 1024;
    aac_frames_range(id, sample_rate, 0..count)
}

/// Raw AAC frames for the given frame indices.
pub fn aac_frames_range(
    id: TrackId,
    sample_rate: u32,
    indices: std::ops::Range<u64>,
) -> Vec<(TrackId, Frame)> {
    indices
        .map(|i| {
            let payload = vec![0x21, 0x10, 0x04, 0x60, (i & 0xFF) as u8, 0x8C, 0x1C, 0x00];
            let pts = Duration::from_micros(aac_frame_micros(i, sample_rate));
            (id, Frame::new(pts, payload).with_sequence_number(i))
        })
        .collect()
}

/// An ADTS stream of AAC-LC, 48 kHz stereo frames covering `secs` seconds.
pub fn adts_stream(secs: u64) -> Vec<u8> {
    let payload = [0x21, 0x10, 0x04, 0x60, 0x8C, 0x1C];
    let len = payload.len() + 7;
    let mut out = Vec::new();
    for _ in 0..secs * 48000 / 1024 {
        out.extend_from_slice(&[
            0xFF,
            0xF1,
            (1 << 6) | (3 << 2),
            (2 << 6) | ((len >> 11) as u8 & 0x03),
            (len >> 3) as u8,
            ((len as u8 & 0x07) << 5) | 0x1F,
            0xFC,
        ]);
        out.extend_from_slice(&payload);
    }
    out
}

/// Anchored micros of video access unit `index` at `fps`.
pub fn video_frame_micros(index: u64, fps: u32) -> u64 {
    index * 1_000_000 / fps as u64
}

fn h264_access_unit(index: u64, gop: u64) -> Vec<Vec<u8>> {
    if index % gop == 0 {
        vec![
            SPS_NAL.to_vec(),
            PPS_NAL.to_vec(),
            vec![0x65, 0x88, 0x84, (index & 0xFF) as u8, 0x21, 0x40],
        ]
    } else {
        vec![vec![0x41, 0x9A, 0x02, (index & 0xFF) as u8, 0x11, 0x30]]
    }
}

/// H.264 NAL-per-frame input: a keyframe (with parameter sets) every `gop`
/// access units.
pub fn h264_frames(id: TrackId, fps: u32, gop: u64, access_units: u64) -> Vec<(TrackId, Frame)> {
    let mut frames = Vec::new();
    for i in 0..access_units {
        let pts = Duration::from_micros(video_frame_micros(i, fps));
        for nal in h264_access_unit(i, gop) {
            frames.push((id, Frame::new(pts, nal)));
        }
    }
    frames
}

/// The same stream as [`h264_frames`] as an Annex-B byte stream.
pub fn h264_annex_b(gop: u64, access_units: u64) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..access_units {
        for nal in h264_access_unit(i, gop) {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(&nal);
        }
    }
    out
}

/// Sequence number from the `mfhd` box of a media segment.
pub fn mfhd_sequence(segment: &[u8]) -> Option<u32> {
    let pos = segment.windows(4).position(|w| w == b"mfhd")?;
    let bytes = segment.get(pos + 8..pos + 12)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Base media decode time from the `tfdt` box of a media segment.
pub fn tfdt_base_decode_time(segment: &[u8]) -> Option<u64> {
    let pos = segment.windows(4).position(|w| w == b"tfdt")?;
    let version = *segment.get(pos + 4)?;
    if version == 1 {
        let bytes: [u8; 8] = segment.get(pos + 8..pos + 16)?.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    } else {
        let bytes: [u8; 4] = segment.get(pos + 8..pos + 12)?.try_into().ok()?;
        Some(u64::from(u32::from_be_bytes(bytes)))
    }
}

/// File names in `dir` that start with `prefix`, sorted.
pub fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(prefix))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[derive(Debug, Default)]
struct Recorded {
    writes: Vec<(PathBuf, Vec<u8>)>,
    removes: Vec<PathBuf>,
}

/// Store that writes through to disk and records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every written payload whose file name starts with `prefix`, in order.
    pub fn writes_with_prefix(&self, prefix: &str) -> Vec<(PathBuf, Vec<u8>)> {
        let recorded = self.inner.lock().unwrap();
        recorded
            .writes
            .iter()
            .filter(|(path, _)| file_name(path).starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn removes(&self) -> Vec<PathBuf> {
        self.inner.lock().unwrap().removes.clone()
    }
}

impl SegmentStore for RecordingStore {
    fn write(&self, path: &Path, data: &[u8]) -> bool {
        self.inner
            .lock()
            .unwrap()
            .writes
            .push((path.to_path_buf(), data.to_vec()));
        FsStore.write(path, data)
    }

    fn remove(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().removes.push(path.to_path_buf());
        FsStore.remove(path)
    }
}

/// Store that rejects writes of media segments whose file name starts with
/// `prefix` and writes everything else to disk.
#[derive(Debug, Clone)]
pub struct FailingStore {
    prefix: String,
}

impl FailingStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl SegmentStore for FailingStore {
    fn write(&self, path: &Path, data: &[u8]) -> bool {
        let name = file_name(path);
        if name.starts_with(&self.prefix) && !name.contains("_init.") {
            return false;
        }
        FsStore.write(path, data)
    }

    fn remove(&self, path: &Path) -> bool {
        FsStore.remove(path)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
