//! Common error types used throughout livedash.
//!
//! The variants follow the packager's error taxonomy: configuration errors
//! are rejected at configure time, binding errors reject a track attach, and
//! I/O errors are surfaced to callers that asked for them (segment and
//! manifest writes inside a batch are logged instead).

/// Common error type for livedash.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration was rejected (unwritable folder, empty base name, ...).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A track could not be bound (unsupported codec, duplicate id, ...).
    #[error("Binding error: {0}")]
    Binding(String),

    /// The referenced track is not attached.
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    /// The packager was used before `configure` succeeded.
    #[error("Packager is not configured")]
    NotConfigured,

    /// A segment buffer could not hold or produce a payload.
    #[error("Segment error: {0}")]
    Segment(String),

    /// The manifest could not be rendered or persisted.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new Config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new Binding error.
    pub fn binding<S: Into<String>>(msg: S) -> Self {
        Self::Binding(msg.into())
    }

    /// Create a new TrackNotFound error.
    pub fn track_not_found(id: impl std::fmt::Display) -> Self {
        Self::TrackNotFound(id.to_string())
    }

    /// Create a new Segment error.
    pub fn segment<S: Into<String>>(msg: S) -> Self {
        Self::Segment(msg.into())
    }

    /// Create a new Manifest error.
    pub fn manifest<S: Into<String>>(msg: S) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
