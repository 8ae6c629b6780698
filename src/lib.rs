//! Livedash - live DASH packager
//!
//! This library crate exposes the packager, its control adapter and the
//! file-based frame sources for integration testing.

pub mod control;
pub mod ingest;
pub mod packager;
pub mod worker;

pub use control::{ControlRequest, ControlResponse};
pub use packager::{Packager, PackagerState, TrackSummary};
pub use worker::PackagerHandle;
