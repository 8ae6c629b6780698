//! Livedash-Common: shared types, errors and configuration.
//!
//! This crate provides the vocabulary used across livedash:
//!
//! - **Typed IDs**: [`TrackId`], which doubles as the DASH representation id
//! - **Media Types**: [`MediaKind`], [`CodecFamily`], [`TrackSpec`] and [`Frame`]
//! - **Configuration**: [`DashConfig`] with configure-time validation
//! - **Error Handling**: the unified [`Error`] type and [`Result`] alias
//!
//! # Examples
//!
//! ```
//! use livedash_common::{CodecFamily, MediaKind, TrackId, TrackSpec};
//!
//! let id = TrackId::new(2);
//! let spec = TrackSpec::audio(CodecFamily::Aac, 48000, 2);
//!
//! assert_eq!(id.to_string(), "2");
//! assert_eq!(spec.kind(), MediaKind::Audio);
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use config::DashConfig;
pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
