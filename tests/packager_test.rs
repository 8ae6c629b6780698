//! End-to-end packaging scenarios against a temporary output folder.

mod common;

use std::time::Duration;

use common::*;
use livedash::ingest::interleave;
use livedash::Packager;
use livedash_common::{CodecFamily, DashConfig, Error, Frame, TrackId, TrackSpec};
use livedash_media::{SegmentStore, AUDIO_ADAPTATION_SET_ID, VIDEO_ADAPTATION_SET_ID};
use tempfile::tempdir;

const AUDIO: TrackId = TrackId::new(1);
const VIDEO: TrackId = TrackId::new(0);

fn audio_spec() -> TrackSpec {
    TrackSpec::audio(CodecFamily::Aac, 48000, 2).with_bitrate(128_000)
}

fn video_spec() -> TrackSpec {
    TrackSpec::video(CodecFamily::Avc, 640, 360, 30).with_bitrate(1_000_000)
}

fn configured(config: DashConfig) -> Packager {
    let mut packager = Packager::new();
    packager.configure(config).unwrap();
    packager
}

fn configured_with(store: impl SegmentStore + 'static, config: DashConfig) -> Packager {
    let mut packager = Packager::with_store(Box::new(store));
    packager.configure(config).unwrap();
    packager
}

fn feed(packager: &mut Packager, frames: impl IntoIterator<Item = (TrackId, Frame)>) {
    for (id, frame) in frames {
        packager.process_frame(id, &frame).unwrap();
    }
}

fn read_mpd(dir: &std::path::Path) -> String {
    std::fs::read_to_string(dir.join("live.mpd")).unwrap()
}

#[test]
fn test_audio_only_session() {
    let dir = tempdir().unwrap();
    let config = DashConfig::new(dir.path(), "live")
        .with_segment_duration(4)
        .with_max_segments(3);
    let mut packager = configured(config);
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();

    feed(&mut packager, aac_frames(TrackId::new(0), 48000, 12));

    // Cuts land on the first frame at or past each 4 s boundary.
    let manifest = packager.manifest().unwrap();
    assert_eq!(manifest.timeline(AUDIO_ADAPTATION_SET_ID), vec![0, 192_511]);

    // End of input closes the last window.
    packager.finish().unwrap();
    let manifest = packager.manifest().unwrap();
    assert_eq!(manifest.timeline(AUDIO_ADAPTATION_SET_ID), vec![0, 192_511, 385_023]);
    let set = manifest.adaptation_set(AUDIO_ADAPTATION_SET_ID).unwrap();
    for entry in &set.timeline {
        // about 4 s: within one AAC frame of the target
        assert!((190_000..=193_100).contains(&entry.d), "duration {}", entry.d);
    }

    assert_eq!(
        files_with_prefix(dir.path(), "live_0_"),
        vec![
            "live_0_0.m4a",
            "live_0_192511.m4a",
            "live_0_385023.m4a",
            "live_0_init.m4a"
        ]
    );

    let mpd = read_mpd(dir.path());
    assert!(mpd.contains(r#"type="dynamic""#));
    assert!(mpd.contains(r#"contentType="audio""#));
    assert!(!mpd.contains(r#"contentType="video""#));
    assert!(mpd.contains(r#"codecs="mp4a.40.2""#));
    assert!(mpd.contains(r#"audioSamplingRate="48000""#));
    // two channels
    assert!(mpd.contains(r#"value="2""#));
    assert!(mpd.contains(r#"bandwidth="128000""#));
    assert!(mpd.contains(r#"media="live_$RepresentationID$_$Time$.m4a""#));
}

#[test]
fn test_single_batch_cuts_once_until_flushed() {
    let dir = tempdir().unwrap();
    let mut packager = configured(DashConfig::new(dir.path(), "live").with_segment_duration(4));
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();

    packager
        .process_frames(&aac_frames(TrackId::new(0), 48000, 12))
        .unwrap();

    // A complete segment is not regenerated before the end-of-batch flush.
    let manifest = packager.manifest().unwrap();
    assert_eq!(manifest.timeline(AUDIO_ADAPTATION_SET_ID), vec![0]);
}

#[test]
fn test_window_retains_at_most_max_segments() {
    let dir = tempdir().unwrap();
    let store = RecordingStore::new();
    let config = DashConfig::new(dir.path(), "live")
        .with_segment_duration(4)
        .with_max_segments(3);
    let mut packager = configured_with(store.clone(), config);
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();

    feed(&mut packager, aac_frames(TrackId::new(0), 48000, 30));

    let timeline = packager.manifest().unwrap().timeline(AUDIO_ADAPTATION_SET_ID);
    assert_eq!(timeline.len(), 3);

    let mut expected: Vec<String> = timeline.iter().map(|t| format!("live_0_{}.m4a", t)).collect();
    expected.push("live_0_init.m4a".to_string());
    expected.sort();
    assert_eq!(files_with_prefix(dir.path(), "live_0_"), expected);

    // Every evicted segment was removed through the store.
    let written = store.writes_with_prefix("live_0_").len() - 1;
    assert_eq!(store.removes().len(), written - 3);

    let mpd = read_mpd(dir.path());
    assert!(mpd.contains(&format!(r#"<S t="{}""#, timeline[0])));
}

#[test]
fn test_sequence_numbers_are_consecutive() {
    let dir = tempdir().unwrap();
    let store = RecordingStore::new();
    let mut packager = configured_with(
        store.clone(),
        DashConfig::new(dir.path(), "live").with_segment_duration(2),
    );
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();
    feed(&mut packager, aac_frames(TrackId::new(0), 48000, 15));
    packager.finish().unwrap();

    let sequences: Vec<u32> = store
        .writes_with_prefix("live_0_")
        .iter()
        .filter(|(path, _)| !path.to_string_lossy().ends_with("_init.m4a"))
        .map(|(_, data)| mfhd_sequence(data).unwrap())
        .collect();
    assert!(sequences.len() >= 7);
    let expected: Vec<u32> = (1..=sequences.len() as u32).collect();
    assert_eq!(sequences, expected);
}

#[test]
fn test_written_bytes_match_segments_on_disk() {
    let dir = tempdir().unwrap();
    let store = RecordingStore::new();
    let mut packager = configured_with(
        store.clone(),
        DashConfig::new(dir.path(), "live").with_segment_duration(4),
    );
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();
    feed(&mut packager, aac_frames(TrackId::new(0), 48000, 10));

    let writes = store.writes_with_prefix("live_0_");
    assert!(!writes.is_empty());
    for (path, data) in writes {
        assert_eq!(std::fs::read(&path).unwrap(), data, "{}", path.display());
    }
}

#[test]
fn test_init_segment_is_written_once() {
    let dir = tempdir().unwrap();
    let store = RecordingStore::new();
    let mut packager = configured_with(
        store.clone(),
        DashConfig::new(dir.path(), "live").with_segment_duration(2),
    );
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();
    feed(&mut packager, aac_frames(TrackId::new(0), 48000, 10));

    let inits = store.writes_with_prefix("live_0_init");
    assert_eq!(inits.len(), 1);
    let on_disk = std::fs::read(dir.path().join("live_0_init.m4a")).unwrap();
    assert_eq!(on_disk, inits[0].1);
    assert_eq!(&on_disk[4..8], b"ftyp");
}

#[test]
fn test_timestamps_anchor_to_first_frame() {
    let dir = tempdir().unwrap();
    let mut packager = configured(DashConfig::new(dir.path(), "live").with_segment_duration(4));
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();

    let start = Duration::from_secs(3600);
    let frames = aac_frames(TrackId::new(0), 48000, 6)
        .into_iter()
        .map(|(id, frame)| {
            let pts = frame.presentation_time + start;
            (id, Frame::new(pts, frame.payload))
        });
    feed(&mut packager, frames);

    assert_eq!(packager.timestamp_offset(), Some(start));
    assert_eq!(
        packager.manifest().unwrap().timeline(AUDIO_ADAPTATION_SET_ID),
        vec![0]
    );
    assert!(dir.path().join("live_0_0.m4a").exists());
}

#[test]
fn test_audio_follows_video_windows() {
    let dir = tempdir().unwrap();
    let mut packager = configured(DashConfig::new(dir.path(), "live").with_segment_duration(4));
    packager.attach_track(VIDEO, video_spec()).unwrap();
    packager.attach_track(AUDIO, audio_spec()).unwrap();

    let video = h264_frames(VIDEO, 30, 60, 270);
    let audio = aac_frames(AUDIO, 48000, 9);
    feed(&mut packager, interleave(video, audio));

    assert!(packager.video_started());
    let manifest = packager.manifest().unwrap();
    assert_eq!(manifest.timeline(VIDEO_ADAPTATION_SET_ID), vec![0, 360_000]);
    assert_eq!(manifest.timeline(AUDIO_ADAPTATION_SET_ID), vec![0, 192_000]);

    packager.finish().unwrap();
    let manifest = packager.manifest().unwrap();
    let video_set = manifest.adaptation_set(VIDEO_ADAPTATION_SET_ID).unwrap();
    let audio_set = manifest.adaptation_set(AUDIO_ADAPTATION_SET_ID).unwrap();
    assert_eq!(video_set.timeline.len(), 3);
    assert_eq!(audio_set.timeline.len(), 3);

    // Same wall-clock windows in both time bases.
    for (v, a) in video_set.timeline.iter().zip(&audio_set.timeline) {
        assert_eq!(v.t * 1_000_000 / 90_000, a.t * 1_000_000 / 48_000);
        let video_us = (v.d * 1_000_000 / 90_000) as i64;
        let audio_us = (a.d * 1_000_000 / 48_000) as i64;
        assert!((video_us - audio_us).abs() <= 50, "{} vs {}", video_us, audio_us);
    }
    assert_eq!(video_set.timeline[2].t, 720_000);
    assert_eq!(audio_set.timeline[2].t, 384_000);

    for name in [
        "live_0_init.m4v",
        "live_0_0.m4v",
        "live_0_360000.m4v",
        "live_0_720000.m4v",
        "live_1_init.m4a",
        "live_1_0.m4a",
        "live_1_192000.m4a",
        "live_1_384000.m4a",
    ] {
        assert!(dir.path().join(name).exists(), "{}", name);
    }

    let mpd = read_mpd(dir.path());
    assert!(mpd.contains(r#"startWithSAP="1""#));
    assert!(mpd.contains(r#"codecs="avc1.64001f""#));
    assert!(mpd.contains(r#"width="640" height="360" frameRate="30""#));
    assert!(mpd.contains(r#"timescale="90000""#));
    assert!(mpd.contains(r#"timescale="48000""#));
}

#[test]
fn test_detaching_video_hands_cadence_back_to_audio() {
    let dir = tempdir().unwrap();
    let mut packager = configured(DashConfig::new(dir.path(), "live").with_segment_duration(4));
    packager.attach_track(VIDEO, video_spec()).unwrap();
    packager.attach_track(AUDIO, audio_spec()).unwrap();

    // 5 s of both tracks: one aligned segment pair is written.
    let video = h264_frames(VIDEO, 30, 60, 150);
    let audio = aac_frames_range(AUDIO, 48000, 0..235);
    feed(&mut packager, interleave(video, audio));
    assert_eq!(
        packager.manifest().unwrap().timeline(AUDIO_ADAPTATION_SET_ID),
        vec![0]
    );

    packager.detach_track(VIDEO).unwrap();
    assert!(!packager.has_video());
    assert!(!packager.video_started());
    assert!(files_with_prefix(dir.path(), "live_0_").is_empty());
    assert!(!read_mpd(dir.path()).contains(r#"contentType="video""#));

    feed(&mut packager, aac_frames_range(AUDIO, 48000, 235..660));
    assert_eq!(
        packager.manifest().unwrap().timeline(AUDIO_ADAPTATION_SET_ID),
        vec![0, 192_000, 384_000]
    );
    let mpd = read_mpd(dir.path());
    assert!(!mpd.contains(r#"contentType="video""#));
    assert!(mpd.contains(r#"<S t="0" d="192000" r="1"/>"#));
}

#[test]
fn test_configure_rejects_non_directory() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"x").unwrap();

    let mut packager = Packager::new();
    let result = packager.configure(DashConfig::new(&file, "live"));
    assert!(matches!(result, Err(Error::Config(_))));
    assert!(!packager.is_configured());
    assert!(packager.manifest().is_none());
    assert!(!dir.path().join("live.mpd").exists());

    let frames = aac_frames(TrackId::new(0), 48000, 1);
    assert!(matches!(
        packager.process_frames(&frames),
        Err(Error::NotConfigured)
    ));
}

#[cfg(unix)]
#[test]
fn test_configure_rejects_read_only_directory() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let out = dir.path().join("read-only");
    std::fs::create_dir(&out).unwrap();
    std::fs::set_permissions(&out, std::fs::Permissions::from_mode(0o555)).unwrap();

    // Permission bits do not bind a privileged user.
    if std::fs::write(out.join("write-check"), b"x").is_ok() {
        eprintln!("Skipping: directory permissions are not enforced for this user");
        std::fs::set_permissions(&out, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let mut packager = Packager::new();
    let result = packager.configure(DashConfig::new(&out, "live"));
    std::fs::set_permissions(&out, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert!(matches!(result, Err(Error::Config(_))));
    assert!(!packager.is_configured());
    assert!(std::fs::read_dir(&out).unwrap().next().is_none());
}

#[test]
fn test_moving_output_restarts_the_window() {
    let first = tempdir().unwrap();
    let second = tempdir().unwrap();
    let mut packager = configured(DashConfig::new(first.path(), "live").with_segment_duration(2));
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();

    feed(&mut packager, aac_frames_range(TrackId::new(0), 48000, 0..200));
    assert_eq!(
        packager.manifest().unwrap().timeline(AUDIO_ADAPTATION_SET_ID),
        vec![0, 96_255]
    );

    packager
        .configure(DashConfig::new(second.path(), "live").with_segment_duration(2))
        .unwrap();
    assert!(packager.manifest().unwrap().timeline(AUDIO_ADAPTATION_SET_ID).is_empty());
    assert!(files_with_prefix(first.path(), "live").is_empty());

    feed(&mut packager, aac_frames_range(TrackId::new(0), 48000, 200..300));

    // Every advertised segment exists next to the manifest.
    let timeline = packager.manifest().unwrap().timeline(AUDIO_ADAPTATION_SET_ID);
    assert_eq!(timeline, vec![192_511]);
    for t in &timeline {
        assert!(second.path().join(format!("live_0_{}.m4a", t)).exists());
    }
    assert!(second.path().join("live_0_init.m4a").exists());
    let mpd = read_mpd(second.path());
    assert!(!mpd.contains(r#"<S t="0""#));
    assert!(mpd.contains(r#"<S t="192511""#));
}

#[test]
fn test_audio_before_first_video_is_not_advertised() {
    let dir = tempdir().unwrap();
    let mut packager = configured(DashConfig::new(dir.path(), "live").with_segment_duration(4));
    packager.attach_track(VIDEO, video_spec()).unwrap();
    packager.attach_track(AUDIO, audio_spec()).unwrap();

    let late = Duration::from_millis(500);
    let video = h264_frames(VIDEO, 30, 60, 150)
        .into_iter()
        .map(|(id, frame)| (id, Frame::new(frame.presentation_time + late, frame.payload)));
    let audio = aac_frames(AUDIO, 48000, 6);
    feed(&mut packager, interleave(audio, video));

    let manifest = packager.manifest().unwrap();
    assert_eq!(manifest.timeline(VIDEO_ADAPTATION_SET_ID), vec![45_000]);
    assert_eq!(manifest.timeline(AUDIO_ADAPTATION_SET_ID), vec![24_000]);

    // The fragment decodes from the advertised time.
    let segment = std::fs::read(dir.path().join("live_1_24000.m4a")).unwrap();
    assert_eq!(tfdt_base_decode_time(&segment), Some(24_000));
    let segment = std::fs::read(dir.path().join("live_0_45000.m4v")).unwrap();
    assert_eq!(tfdt_base_decode_time(&segment), Some(45_000));
}

#[test]
fn test_failed_writes_do_not_block_sibling_tracks() {
    let dir = tempdir().unwrap();
    let store = FailingStore::new("live_1_");
    let mut packager = configured_with(
        store,
        DashConfig::new(dir.path(), "live").with_segment_duration(4),
    );
    packager.attach_track(TrackId::new(0), audio_spec()).unwrap();
    packager.attach_track(TrackId::new(1), audio_spec()).unwrap();

    let first = aac_frames(TrackId::new(0), 48000, 12);
    let second = aac_frames(TrackId::new(1), 48000, 12);
    feed(&mut packager, interleave(first, second));

    // The timeline still advances: writes are at-most-once.
    assert_eq!(
        packager.manifest().unwrap().timeline(AUDIO_ADAPTATION_SET_ID),
        vec![0, 192_511]
    );
    assert_eq!(
        files_with_prefix(dir.path(), "live_0_"),
        vec!["live_0_0.m4a", "live_0_192511.m4a", "live_0_init.m4a"]
    );
    assert_eq!(files_with_prefix(dir.path(), "live_1_"), vec!["live_1_init.m4a"]);
}
