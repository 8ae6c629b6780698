//! Typed ID wrappers.
//!
//! A [`TrackId`] identifies one attached output reader. The same number is
//! used as the DASH representation id and inside segment file names, so its
//! `Display` form is part of the on-disk naming scheme.

use serde::{Deserialize, Serialize};

/// Identifier of an attached track (and of its manifest representation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(u32);

impl TrackId {
    /// Wrap a raw reader id.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw numeric id.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The representation id advertised in the manifest.
    pub fn representation_id(self) -> String {
        self.0.to_string()
    }
}

impl From<u32> for TrackId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<TrackId> for u32 {
    fn from(id: TrackId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_display() {
        let id = TrackId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(id.representation_id(), "42");
    }

    #[test]
    fn test_track_id_conversions() {
        let id: TrackId = 3.into();
        let raw: u32 = id.into();
        assert_eq!(raw, 3);
        assert_eq!(id.get(), 3);
    }

    #[test]
    fn test_track_id_ordering() {
        assert!(TrackId::new(1) < TrackId::new(2));
    }

    #[test]
    fn test_track_id_serde_transparent() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            id: TrackId,
        }
        let parsed: Wrapper = toml::from_str("id = 9").unwrap();
        assert_eq!(parsed.id, TrackId::new(9));
    }
}
