//! Reusable segment buffers and the storage boundary they are written through.

use std::fs;
use std::io::Write;
use std::path::Path;

use bytes::BytesMut;
use livedash_common::{Error, Result};
use tempfile::NamedTempFile;

/// Default capacity of a media segment buffer.
pub const MEDIA_SEGMENT_CAPACITY: usize = 16 * 1024 * 1024;

/// Default capacity of an init segment buffer.
pub const INIT_SEGMENT_CAPACITY: usize = 256 * 1024;

/// The span of presentation time covered by a segment, in microseconds
/// relative to the session's timestamp offset.
///
/// Windows are clock-domain independent, so segments of tracks with
/// different time bases can be compared exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentWindow {
    pub start_micros: u64,
    pub end_micros: u64,
}

impl SegmentWindow {
    pub fn new(start_micros: u64, end_micros: u64) -> Self {
        Self {
            start_micros,
            end_micros,
        }
    }

    pub fn duration_micros(&self) -> u64 {
        self.end_micros.saturating_sub(self.start_micros)
    }
}

/// A fixed-capacity byte buffer holding one media or init segment.
///
/// The buffer is allocated once and recycled with [`Segment::clear`] after
/// every write, so a track keeps the same `Segment` for its whole lifetime.
#[derive(Debug)]
pub struct Segment {
    data: BytesMut,
    capacity: usize,
    sequence_number: u64,
    timestamp: u64,
    duration: u64,
    window: Option<SegmentWindow>,
    complete: bool,
}

impl Segment {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
            sequence_number: 0,
            timestamp: 0,
            duration: 0,
            window: None,
            complete: false,
        }
    }

    /// A buffer sized for media segments.
    pub fn media() -> Self {
        Self::new(MEDIA_SEGMENT_CAPACITY)
    }

    /// A buffer sized for init segments.
    pub fn init() -> Self {
        Self::new(INIT_SEGMENT_CAPACITY)
    }

    /// Replace the buffer contents with `payload`.
    pub fn fill(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.capacity {
            return Err(Error::segment(format!(
                "payload of {} bytes exceeds segment capacity of {} bytes",
                payload.len(),
                self.capacity
            )));
        }
        self.data.clear();
        self.data.extend_from_slice(payload);
        Ok(())
    }

    /// Reset timestamp, duration, length and completeness.
    ///
    /// The sequence number is kept: it identifies the last generated segment.
    pub fn clear(&mut self) {
        self.data.clear();
        self.timestamp = 0;
        self.duration = 0;
        self.window = None;
        self.complete = false;
    }

    /// Mark the buffer as holding a finished segment.
    pub(crate) fn mark_complete(
        &mut self,
        sequence_number: u64,
        timestamp: u64,
        duration: u64,
        window: SegmentWindow,
    ) {
        self.sequence_number = sequence_number;
        self.timestamp = timestamp;
        self.duration = duration;
        self.window = Some(window);
        self.complete = true;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Start time in the track's time base.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Duration in the track's time base.
    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn window(&self) -> Option<SegmentWindow> {
        self.window
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Persist exactly `len()` bytes through `store`.
    pub fn write_to(&self, store: &dyn SegmentStore, path: &Path) -> bool {
        store.write(path, &self.data)
    }

    /// Persist exactly `len()` bytes to the filesystem.
    pub fn write_to_disk(&self, path: &Path) -> bool {
        self.write_to(&FsStore, path)
    }
}

/// Durable write and delete of named byte buffers.
pub trait SegmentStore: Send + Sync {
    /// Write `bytes` to `path`, replacing any existing file.
    fn write(&self, path: &Path, bytes: &[u8]) -> bool;

    /// Delete the file at `path`.
    fn remove(&self, path: &Path) -> bool;
}

/// Filesystem-backed [`SegmentStore`].
///
/// Writes go to a temporary file in the destination directory that is
/// renamed into place, so readers never see a partial segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl FsStore {
    fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = NamedTempFile::new_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl SegmentStore for FsStore {
    fn write(&self, path: &Path, bytes: &[u8]) -> bool {
        match Self::write_atomic(path, bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Segment write failed");
                false
            }
        }
    }

    fn remove(&self, path: &Path) -> bool {
        match fs::remove_file(path) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Segment remove failed");
                false
            }
        }
    }
}

/// `{base}_{id}_{timestamp}.{ext}`
pub fn segment_file_name(base_name: &str, representation_id: &str, timestamp: u64, ext: &str) -> String {
    format!("{}_{}_{}.{}", base_name, representation_id, timestamp, ext)
}

/// `{base}_{id}_init.{ext}`
pub fn init_file_name(base_name: &str, representation_id: &str, ext: &str) -> String {
    format!("{}_{}_init.{}", base_name, representation_id, ext)
}

/// `{base}.mpd`
pub fn manifest_file_name(base_name: &str) -> String {
    format!("{}.mpd", base_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_clear_keep_allocation() {
        let mut segment = Segment::new(64);
        segment.fill(b"abcdef").unwrap();
        assert_eq!(segment.len(), 6);
        segment.mark_complete(1, 9000, 360000, SegmentWindow::new(100_000, 4_100_000));
        assert!(segment.is_complete());
        assert_eq!(segment.window().unwrap().duration_micros(), 4_000_000);

        segment.clear();
        assert!(segment.is_empty());
        assert!(!segment.is_complete());
        assert_eq!(segment.timestamp(), 0);
        assert_eq!(segment.duration(), 0);
        assert_eq!(segment.sequence_number(), 1);
        assert_eq!(segment.capacity(), 64);
    }

    #[test]
    fn test_fill_rejects_oversized_payload() {
        let mut segment = Segment::new(4);
        let err = segment.fill(b"too long").unwrap_err();
        assert!(matches!(err, Error::Segment(_)));
        assert!(segment.is_empty());
    }

    #[test]
    fn test_write_to_disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live_0_0.m4a");

        let mut segment = Segment::new(1024);
        segment.fill(&[1, 2, 3, 4, 5]).unwrap();
        assert!(segment.write_to_disk(&path));
        assert_eq!(fs::read(&path).unwrap(), segment.data());

        // Overwrite with a shorter payload: exactly len() bytes land on disk.
        segment.fill(&[9, 9]).unwrap();
        assert!(segment.write_to_disk(&path));
        assert_eq!(fs::read(&path).unwrap(), vec![9, 9]);
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("seg.m4v");
        let mut segment = Segment::new(16);
        segment.fill(b"x").unwrap();
        assert!(!segment.write_to_disk(&path));
    }

    #[test]
    fn test_fs_store_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.m4v");
        assert!(FsStore.write(&path, b"data"));
        assert!(FsStore.remove(&path));
        assert!(!path.exists());
        assert!(!FsStore.remove(&path));
    }

    #[test]
    fn test_file_names() {
        assert_eq!(segment_file_name("live", "0", 360000, "m4v"), "live_0_360000.m4v");
        assert_eq!(init_file_name("live", "1", "m4a"), "live_1_init.m4a");
        assert_eq!(manifest_file_name("live"), "live.mpd");
    }
}
