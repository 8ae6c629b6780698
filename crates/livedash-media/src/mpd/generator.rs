//! MPD XML generation.

use std::fmt::Write;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};

use livedash_common::MediaKind;

use super::types::{AdaptationSet, RepresentationInfo, TimelineEntry};

/// Channel configuration scheme for `AudioChannelConfiguration`.
const CHANNEL_CONFIGURATION_SCHEME: &str = "urn:mpeg:dash:23003:3:audio_channel_configuration:2011";

/// Document-level attributes of a dynamic MPD.
#[derive(Debug, Clone)]
pub struct MpdHeader {
    pub availability_start_time: DateTime<Utc>,
    pub publish_time: DateTime<Utc>,
    pub minimum_update_period: Duration,
    pub min_buffer_time: Duration,
    pub time_shift_buffer_depth: Duration,
}

/// Render a dynamic, isoff-live MPD.
///
/// Adaptation sets without representations are omitted.
pub fn generate_mpd<'a>(header: &MpdHeader, sets: impl IntoIterator<Item = &'a AdaptationSet>) -> String {
    let mut out = String::new();

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#).unwrap();
    writeln!(
        out,
        r#"<MPD xmlns="urn:mpeg:dash:schema:mpd:2011" profiles="urn:mpeg:dash:profile:isoff-live:2011" type="dynamic" availabilityStartTime="{}" publishTime="{}" minimumUpdatePeriod="{}" minBufferTime="{}" timeShiftBufferDepth="{}">"#,
        format_datetime(&header.availability_start_time),
        format_datetime(&header.publish_time),
        format_duration(header.minimum_update_period),
        format_duration(header.min_buffer_time),
        format_duration(header.time_shift_buffer_depth),
    )
    .unwrap();
    writeln!(out, r#"  <Period id="0" start="PT0S">"#).unwrap();

    for set in sets.into_iter().filter(|s| !s.representations.is_empty()) {
        write_adaptation_set(&mut out, set);
    }

    writeln!(out, "  </Period>").unwrap();
    writeln!(out, "</MPD>").unwrap();
    out
}

fn write_adaptation_set(out: &mut String, set: &AdaptationSet) {
    write!(
        out,
        r#"    <AdaptationSet id="{}" contentType="{}" mimeType="{}" segmentAlignment="true""#,
        set.id,
        set.kind,
        set.kind.mime_type()
    )
    .unwrap();
    if set.kind == MediaKind::Video {
        write!(out, r#" startWithSAP="1""#).unwrap();
    }
    writeln!(out, ">").unwrap();

    writeln!(
        out,
        r#"      <SegmentTemplate timescale="{}" media="{}" initialization="{}">"#,
        set.template.timescale,
        escape_xml(&set.template.media),
        escape_xml(&set.template.initialization)
    )
    .unwrap();
    writeln!(out, "        <SegmentTimeline>").unwrap();
    for (entry, repeat) in compact_timeline(set.timeline.iter().copied()) {
        if repeat > 0 {
            writeln!(out, r#"          <S t="{}" d="{}" r="{}"/>"#, entry.t, entry.d, repeat).unwrap();
        } else {
            writeln!(out, r#"          <S t="{}" d="{}"/>"#, entry.t, entry.d).unwrap();
        }
    }
    writeln!(out, "        </SegmentTimeline>").unwrap();
    writeln!(out, "      </SegmentTemplate>").unwrap();

    for (id, info) in &set.representations {
        match info {
            RepresentationInfo::Video(video) => {
                write!(out, r#"      <Representation id="{}""#, escape_xml(id)).unwrap();
                if !video.codecs.is_empty() {
                    write!(out, r#" codecs="{}""#, escape_xml(&video.codecs)).unwrap();
                }
                write!(
                    out,
                    r#" bandwidth="{}" width="{}" height="{}""#,
                    video.bandwidth, video.width, video.height
                )
                .unwrap();
                if video.frame_rate > 0 {
                    write!(out, r#" frameRate="{}""#, video.frame_rate).unwrap();
                }
                writeln!(out, "/>").unwrap();
            }
            RepresentationInfo::Audio(audio) => {
                write!(out, r#"      <Representation id="{}""#, escape_xml(id)).unwrap();
                if !audio.codecs.is_empty() {
                    write!(out, r#" codecs="{}""#, escape_xml(&audio.codecs)).unwrap();
                }
                writeln!(
                    out,
                    r#" bandwidth="{}" audioSamplingRate="{}">"#,
                    audio.bandwidth, audio.sample_rate
                )
                .unwrap();
                writeln!(
                    out,
                    r#"        <AudioChannelConfiguration schemeIdUri="{}" value="{}"/>"#,
                    CHANNEL_CONFIGURATION_SCHEME, audio.channels
                )
                .unwrap();
                writeln!(out, "      </Representation>").unwrap();
            }
        }
    }

    writeln!(out, "    </AdaptationSet>").unwrap();
}

/// Collapse contiguous entries of equal duration into `(first, repeat)`.
fn compact_timeline(entries: impl Iterator<Item = TimelineEntry>) -> Vec<(TimelineEntry, u32)> {
    let mut runs: Vec<(TimelineEntry, u32)> = Vec::new();
    for entry in entries {
        if let Some((first, repeat)) = runs.last_mut() {
            let next_t = first.t + first.d * (*repeat as u64 + 1);
            if first.d == entry.d && next_t == entry.t {
                *repeat += 1;
                continue;
            }
        }
        runs.push((entry, 0));
    }
    runs
}

/// ISO 8601 duration, e.g. `PT4S` or `PT2.5S`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.subsec_millis();
    if millis == 0 {
        format!("PT{}S", duration.as_secs())
    } else {
        let frac = format!("{:03}", millis);
        format!("PT{}.{}S", duration.as_secs(), frac.trim_end_matches('0'))
    }
}

fn format_datetime(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
