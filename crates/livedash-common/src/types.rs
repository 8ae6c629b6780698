//! Media-domain types: kinds, codec families, track specs and frames.
//!
//! Enums serialize in lowercase (via `serde(rename_all = "lowercase")`) and
//! implement `Display` manually for consistent string representation.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Media kind of a track. Decides the adaptation set a track belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// File extension used for this kind's init and media segments.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Video => "m4v",
            Self::Audio => "m4a",
        }
    }

    /// MIME type advertised on the adaptation set.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Audio => "audio/mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

// ---------------------------------------------------------------------------
// CodecFamily
// ---------------------------------------------------------------------------

/// Codec families the packager can segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecFamily {
    /// H.264 / AVC video.
    #[serde(alias = "h264")]
    Avc,
    /// H.265 / HEVC video.
    #[serde(alias = "h265")]
    Hevc,
    /// AAC audio.
    Aac,
}

impl CodecFamily {
    /// The media kind this codec family produces.
    pub fn kind(self) -> MediaKind {
        match self {
            Self::Avc | Self::Hevc => MediaKind::Video,
            Self::Aac => MediaKind::Audio,
        }
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avc => write!(f, "h264"),
            Self::Hevc => write!(f, "h265"),
            Self::Aac => write!(f, "aac"),
        }
    }
}

impl std::str::FromStr for CodecFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Ok(Self::Avc),
            "h265" | "hevc" => Ok(Self::Hevc),
            "aac" => Ok(Self::Aac),
            other => Err(Error::binding(format!("unsupported codec: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// TrackSpec
// ---------------------------------------------------------------------------

/// Stream description a control plane supplies when attaching a track.
///
/// Video fields are zero for audio tracks and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSpec {
    /// Codec family of the incoming frames.
    pub codec: CodecFamily,
    /// Video width in pixels.
    #[serde(default)]
    pub width: u32,
    /// Video height in pixels.
    #[serde(default)]
    pub height: u32,
    /// Nominal video frame rate (frames per second).
    #[serde(default)]
    pub frame_rate: u32,
    /// Audio sample rate in Hz.
    #[serde(default)]
    pub sample_rate: u32,
    /// Audio channel count.
    #[serde(default)]
    pub channels: u16,
    /// Advertised bitrate in bits per second.
    #[serde(default)]
    pub bitrate: u64,
}

impl TrackSpec {
    /// Describe a video track.
    pub fn video(codec: CodecFamily, width: u32, height: u32, frame_rate: u32) -> Self {
        Self {
            codec,
            width,
            height,
            frame_rate,
            sample_rate: 0,
            channels: 0,
            bitrate: 0,
        }
    }

    /// Describe an audio track.
    pub fn audio(codec: CodecFamily, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec,
            width: 0,
            height: 0,
            frame_rate: 0,
            sample_rate,
            channels,
            bitrate: 0,
        }
    }

    /// Set the advertised bitrate.
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Media kind derived from the codec family.
    pub fn kind(&self) -> MediaKind {
        self.codec.kind()
    }

    /// Check that the description is usable for its codec family.
    pub fn validate(&self) -> Result<()> {
        match self.kind() {
            MediaKind::Video if self.width == 0 || self.height == 0 => Err(Error::binding(
                format!("{} track needs a non-zero width and height", self.codec),
            )),
            MediaKind::Audio if self.sample_rate == 0 || self.channels == 0 => {
                Err(Error::binding(format!(
                    "{} track needs a non-zero sample rate and channel count",
                    self.codec
                )))
            }
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One timestamped, codec-encoded frame delivered by an upstream source.
///
/// Video sources deliver one NAL unit (or an Annex-B chunk) per frame; every
/// NAL unit of one picture shares the same presentation time. Audio sources
/// deliver one coded AAC frame per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Presentation time on the source's microsecond clock.
    pub presentation_time: Duration,
    /// Capture/origin time on the source's clock.
    pub origin_time: Duration,
    /// Source sequence number.
    pub sequence_number: u64,
    /// Codec payload.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame whose origin time equals its presentation time.
    pub fn new(presentation_time: Duration, payload: impl Into<Bytes>) -> Self {
        Self {
            presentation_time,
            origin_time: presentation_time,
            sequence_number: 0,
            payload: payload.into(),
        }
    }

    /// Set the source sequence number.
    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }
}
