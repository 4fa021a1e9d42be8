//! Domain models for the library snapshot
//!
//! Values handed in by the library parser and handed back to the serializer.
//! Ids come from the imported catalog, so they are opaque strings rather than
//! UUIDs; `new()` still mints a UUID for records created by the engine or by
//! tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a track
    TrackId
);
string_id!(
    /// Unique identifier for a playlist
    PlaylistId
);
string_id!(
    /// Unique identifier for a computer that contributed to the library
    ComputerId
);

// =============================================================================
// Text Normalization
// =============================================================================

/// Normalize a string for comparison.
///
/// Decomposes to NFD, drops combining marks (so "Beyoncé" compares equal to
/// "beyonce"), lowercases, and collapses whitespace runs.
pub fn normalize_text(s: &str) -> String {
    let folded: String = s
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize a string into a bucketing key: [`normalize_text`] with every
/// non-alphanumeric character removed.
pub fn normalize_key(s: &str) -> String {
    normalize_text(s)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Separator between the title and artist parts of a bucket key.
const KEY_SEPARATOR: char = '\u{1f}';

// =============================================================================
// Domain Models
// =============================================================================

/// A track entry of the library catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Unique identifier, immutable for the session
    pub id: TrackId,
    /// Track title
    pub title: String,
    /// Track artist
    pub artist: String,
    /// Album name
    pub album: Option<String>,
    /// Duration in seconds
    pub duration_seconds: Option<f64>,
    /// Bitrate in kbps
    pub bitrate_kbps: Option<u32>,
    /// File size in bytes
    pub file_size_bytes: Option<u64>,
    /// Canonical file path
    pub location: String,
    /// Provider-relative path inside a cloud sync folder
    pub cloud_path: Option<String>,
    /// Computer whose library this entry belongs to
    pub owner_computer_id: Option<ComputerId>,
    /// Rating on a 0-100 scale
    pub rating: Option<u8>,
    #[serde(default)]
    pub play_count: u32,
    pub date_added: Option<DateTime<Utc>>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<u32>,
}

impl Track {
    /// Create a track with the required fields; everything else is empty.
    pub fn new(
        id: impl Into<TrackId>,
        title: impl Into<String>,
        artist: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration_seconds: None,
            bitrate_kbps: None,
            file_size_bytes: None,
            location: location.into(),
            cloud_path: None,
            owner_computer_id: None,
            rating: None,
            play_count: 0,
            date_added: None,
            genre: None,
            year: None,
            track_number: None,
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_bitrate(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }

    pub fn with_file_size(mut self, bytes: u64) -> Self {
        self.file_size_bytes = Some(bytes);
        self
    }

    pub fn with_cloud_path(mut self, cloud_path: impl Into<String>) -> Self {
        self.cloud_path = Some(cloud_path.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<ComputerId>) -> Self {
        self.owner_computer_id = Some(owner.into());
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    pub fn with_play_count(mut self, play_count: u32) -> Self {
        self.play_count = play_count;
        self
    }

    pub fn with_date_added(mut self, date_added: DateTime<Utc>) -> Self {
        self.date_added = Some(date_added);
        self
    }

    /// Validate track invariants
    pub fn validate(&self) -> Result<(), String> {
        if self.id.as_str().trim().is_empty() {
            return Err("Track id cannot be empty".to_string());
        }

        if self.location.trim().is_empty() {
            return Err(format!("Track {} has an empty location", self.id));
        }

        if let Some(duration) = self.duration_seconds {
            if !duration.is_finite() || duration < 0.0 {
                return Err(format!(
                    "Track {} duration must be a non-negative number",
                    self.id
                ));
            }
        }

        if let Some(rating) = self.rating {
            if rating > 100 {
                return Err(format!("Track {} rating {} exceeds 100", self.id, rating));
            }
        }

        Ok(())
    }

    /// Bucketing key built from the normalized title and artist.
    pub fn title_artist_key(&self) -> String {
        format!(
            "{}{}{}",
            normalize_key(&self.title),
            KEY_SEPARATOR,
            normalize_key(&self.artist)
        )
    }

    /// Number of optional metadata fields that carry a value.
    pub fn metadata_completeness(&self) -> usize {
        let text = |s: &str| usize::from(!s.trim().is_empty());
        let opt_text = |s: &Option<String>| {
            usize::from(s.as_deref().is_some_and(|v| !v.trim().is_empty()))
        };

        text(&self.title)
            + text(&self.artist)
            + opt_text(&self.album)
            + opt_text(&self.genre)
            + usize::from(self.duration_seconds.is_some())
            + usize::from(self.bitrate_kbps.is_some())
            + usize::from(self.file_size_bytes.is_some())
            + usize::from(self.rating.is_some())
            + usize::from(self.date_added.is_some())
            + usize::from(self.year.is_some())
            + usize::from(self.track_number.is_some())
    }
}

/// Ordered list of track references
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    #[serde(default)]
    pub track_ids: Vec<TrackId>,
}

impl Playlist {
    pub fn new(
        id: impl Into<PlaylistId>,
        name: impl Into<String>,
        track_ids: Vec<TrackId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            track_ids,
        }
    }

    pub fn contains(&self, track_id: &TrackId) -> bool {
        self.track_ids.contains(track_id)
    }
}

/// A machine whose library was merged into this catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Computer {
    pub id: ComputerId,
    pub name: String,
    /// Path prefixes under which this machine keeps its music
    #[serde(default)]
    pub library_roots: Vec<String>,
}

impl Computer {
    pub fn new(
        id: impl Into<ComputerId>,
        name: impl Into<String>,
        library_roots: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            library_roots,
        }
    }
}

/// A complete library snapshot as exchanged with the parser/serializer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Library {
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub playlists: Vec<Playlist>,
    #[serde(default)]
    pub computers: Vec<Computer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids() {
        let a = TrackId::new();
        let b = TrackId::new();
        assert_ne!(a, b);
        assert_eq!(TrackId::from("42").to_string(), "42");
        assert_eq!(ComputerId::from("mac-mini").as_str(), "mac-mini");
    }

    #[test]
    fn test_track_id_serializes_transparently() {
        let json = serde_json::to_string(&TrackId::from("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Beyoncé  "), "beyonce");
        assert_eq!(normalize_text("Sigur  Rós\tÁgætis"), "sigur ros agætis");
        assert_eq!(normalize_text("UPPERCASE"), "uppercase");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_normalize_key_drops_punctuation() {
        assert_eq!(normalize_key("Don't Stop Me Now!"), "dontstopmenow");
        assert_eq!(normalize_key("AC/DC"), "acdc");
    }

    #[test]
    fn test_title_artist_key() {
        let a = Track::new("1", "Halo", "Beyoncé", "/m/a.mp3");
        let b = Track::new("2", "HALO ", "beyonce", "/m/b.mp3");
        let c = Track::new("3", "Halo", "Someone Else", "/m/c.mp3");
        assert_eq!(a.title_artist_key(), b.title_artist_key());
        assert_ne!(a.title_artist_key(), c.title_artist_key());
    }

    #[test]
    fn test_track_validation() {
        let mut track = Track::new("t1", "Song", "Artist", "/music/song.mp3").with_rating(80);
        assert!(track.validate().is_ok());

        track.location = "  ".to_string();
        assert!(track.validate().is_err());

        track.location = "/music/song.mp3".to_string();
        track.rating = Some(101);
        assert!(track.validate().is_err());

        track.rating = None;
        track.duration_seconds = Some(f64::NAN);
        assert!(track.validate().is_err());

        track.duration_seconds = Some(-1.0);
        assert!(track.validate().is_err());

        track.duration_seconds = Some(215.4);
        track.id = TrackId::from("");
        assert!(track.validate().is_err());
    }

    #[test]
    fn test_metadata_completeness() {
        let sparse = Track::new("t1", "Song", "", "/a.mp3");
        let rich = Track::new("t2", "Song", "Artist", "/b.mp3")
            .with_album("Album")
            .with_duration(200.0)
            .with_bitrate(320)
            .with_file_size(8_000_000);
        assert_eq!(sparse.metadata_completeness(), 1);
        assert_eq!(rich.metadata_completeness(), 6);
    }

    #[test]
    fn test_library_deserializes_with_missing_collections() {
        let library: Library = serde_json::from_str(
            r#"{"tracks":[{"id":"t1","title":"Song","artist":"A","location":"/a.mp3"}]}"#,
        )
        .unwrap();
        assert_eq!(library.tracks.len(), 1);
        assert_eq!(library.tracks[0].play_count, 0);
        assert!(library.playlists.is_empty());
        assert!(library.computers.is_empty());
    }
}
