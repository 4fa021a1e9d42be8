//! # Library Index
//!
//! In-memory indexed view of a library snapshot, built once per
//! reconciliation session.
//!
//! ## Overview
//!
//! The index owns every track, playlist, and computer record for the session.
//! Readers get lookups by id, by normalized title/artist key, and by owning
//! computer, always in the stable insertion order of the original snapshot.
//!
//! All writes go through the mutation API below. Each mutation validates the
//! complete change before touching any state, so a failed call leaves the
//! index exactly as it was, and the secondary indexes are kept in step with
//! the primary records.

use crate::error::{LibraryError, Result};
use crate::models::{Computer, ComputerId, Library, Playlist, PlaylistId, Track, TrackId};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Result of merging duplicate tracks into a survivor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    pub survivor_id: TrackId,
    pub removed_ids: Vec<TrackId>,
    pub playlists_updated: Vec<PlaylistId>,
}

/// An empty index is equivalent to building from `Library::default()`.
#[derive(Debug, Clone, Default)]
pub struct LibraryIndex {
    tracks: HashMap<TrackId, Track>,
    order: Vec<TrackId>,
    by_key: HashMap<String, Vec<TrackId>>,
    by_owner: HashMap<ComputerId, Vec<TrackId>>,
    playlists: Vec<Playlist>,
    computers: Vec<Computer>,
}

impl LibraryIndex {
    /// Build an index from a snapshot.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for duplicate track or computer ids and for tracks that
    /// fail [`Track::validate`]. Playlist entries naming unknown tracks are
    /// dropped with a warning rather than failing the build.
    pub fn build(library: Library) -> Result<Self> {
        let Library {
            tracks,
            playlists,
            computers,
        } = library;

        let mut computer_ids = HashSet::new();
        for computer in &computers {
            if !computer_ids.insert(computer.id.clone()) {
                return Err(LibraryError::InvalidInput {
                    field: "computers".to_string(),
                    message: format!("duplicate computer id {}", computer.id),
                });
            }
        }

        let mut index = Self {
            tracks: HashMap::with_capacity(tracks.len()),
            order: Vec::with_capacity(tracks.len()),
            by_key: HashMap::new(),
            by_owner: HashMap::new(),
            playlists: Vec::with_capacity(playlists.len()),
            computers,
        };

        for track in tracks {
            track.validate().map_err(|message| LibraryError::InvalidInput {
                field: "tracks".to_string(),
                message,
            })?;

            if index.tracks.contains_key(&track.id) {
                return Err(LibraryError::InvalidInput {
                    field: "tracks".to_string(),
                    message: format!("duplicate track id {}", track.id),
                });
            }

            index.order.push(track.id.clone());
            index.add_secondary(&track);
            index.tracks.insert(track.id.clone(), track);
        }

        for mut playlist in playlists {
            let before = playlist.track_ids.len();
            playlist.track_ids.retain(|id| index.tracks.contains_key(id));
            let dropped = before - playlist.track_ids.len();
            if dropped > 0 {
                warn!(
                    playlist_id = %playlist.id,
                    dropped,
                    "Dropped playlist entries referencing unknown tracks"
                );
            }
            index.playlists.push(playlist);
        }

        debug!(
            tracks = index.order.len(),
            playlists = index.playlists.len(),
            computers = index.computers.len(),
            "Built library index"
        );

        Ok(index)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &TrackId) -> Option<&Track> {
        self.tracks.get(id)
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.tracks.contains_key(id)
    }

    /// Tracks in insertion order.
    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.order.iter().filter_map(|id| self.tracks.get(id))
    }

    /// Track ids in insertion order.
    pub fn track_ids(&self) -> &[TrackId] {
        &self.order
    }

    /// Position of a track in insertion order.
    pub fn position(&self, id: &TrackId) -> Option<usize> {
        self.order.iter().position(|candidate| candidate == id)
    }

    /// Tracks sharing a normalized title/artist key, in insertion order.
    pub fn by_title_artist(&self, key: &str) -> Vec<&Track> {
        self.lookup(self.by_key.get(key))
    }

    /// Tracks whose recorded owner is `computer_id`, in insertion order.
    pub fn owned_by(&self, computer_id: &ComputerId) -> Vec<&Track> {
        self.lookup(self.by_owner.get(computer_id))
    }

    pub fn computers(&self) -> &[Computer] {
        &self.computers
    }

    pub fn computer(&self, id: &ComputerId) -> Option<&Computer> {
        self.computers.iter().find(|computer| &computer.id == id)
    }

    pub fn playlists(&self) -> &[Playlist] {
        &self.playlists
    }

    pub fn playlists_containing(&self, id: &TrackId) -> Vec<&Playlist> {
        self.playlists
            .iter()
            .filter(|playlist| playlist.contains(id))
            .collect()
    }

    fn lookup(&self, ids: Option<&Vec<TrackId>>) -> Vec<&Track> {
        ids.map(|ids| ids.iter().filter_map(|id| self.tracks.get(id)).collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Mutation API
    // =========================================================================

    /// Merge `losers` into `survivor`.
    ///
    /// Every playlist reference to a loser is rewritten to the survivor (a
    /// playlist that already lists the survivor simply loses the loser
    /// entries), the losers are removed, and the survivor's record is replaced
    /// by `merged`.
    pub fn merge_tracks(
        &mut self,
        survivor: &TrackId,
        losers: &[TrackId],
        merged: Track,
    ) -> Result<MergeOutcome> {
        if !self.tracks.contains_key(survivor) {
            return Err(LibraryError::track_not_found(survivor));
        }
        if merged.id != *survivor {
            return Err(LibraryError::InvalidInput {
                field: "merged".to_string(),
                message: format!(
                    "merged record id {} does not match survivor {}",
                    merged.id, survivor
                ),
            });
        }
        merged.validate().map_err(|message| LibraryError::InvalidInput {
            field: "merged".to_string(),
            message,
        })?;
        if losers.is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "losers".to_string(),
                message: "at least one track must be merged into the survivor".to_string(),
            });
        }

        let mut loser_set = HashSet::with_capacity(losers.len());
        for loser in losers {
            if loser == survivor {
                return Err(LibraryError::InvalidInput {
                    field: "losers".to_string(),
                    message: format!("survivor {} cannot also be merged away", survivor),
                });
            }
            if !self.tracks.contains_key(loser) {
                return Err(LibraryError::track_not_found(loser));
            }
            if !loser_set.insert(loser.clone()) {
                return Err(LibraryError::InvalidInput {
                    field: "losers".to_string(),
                    message: format!("track {} listed twice", loser),
                });
            }
        }

        // Validation done; nothing below can fail.
        let mut playlists_updated = Vec::new();
        for playlist in &mut self.playlists {
            if !playlist.track_ids.iter().any(|id| loser_set.contains(id)) {
                continue;
            }

            let mut has_survivor = playlist.contains(survivor);
            let mut rewritten = Vec::with_capacity(playlist.track_ids.len());
            for id in playlist.track_ids.drain(..) {
                if !loser_set.contains(&id) {
                    rewritten.push(id);
                } else if !has_survivor {
                    rewritten.push(survivor.clone());
                    has_survivor = true;
                }
            }
            playlist.track_ids = rewritten;
            playlists_updated.push(playlist.id.clone());
        }

        for loser in losers {
            if let Some(track) = self.tracks.remove(loser) {
                self.remove_secondary(&track);
            }
        }
        self.order.retain(|id| !loser_set.contains(id));

        self.replace_track(merged);

        debug!(
            survivor_id = %survivor,
            removed = losers.len(),
            playlists = playlists_updated.len(),
            "Merged duplicate tracks"
        );

        Ok(MergeOutcome {
            survivor_id: survivor.clone(),
            removed_ids: losers.to_vec(),
            playlists_updated,
        })
    }

    /// Point a track at a new file. Returns the previous location.
    pub fn set_location(&mut self, id: &TrackId, location: impl Into<String>) -> Result<String> {
        let location = location.into();
        if location.trim().is_empty() {
            return Err(LibraryError::InvalidInput {
                field: "location".to_string(),
                message: "location cannot be empty".to_string(),
            });
        }

        let track = self
            .tracks
            .get_mut(id)
            .ok_or_else(|| LibraryError::track_not_found(id))?;
        Ok(std::mem::replace(&mut track.location, location))
    }

    /// Set or clear a track's cloud path. Returns the previous value.
    pub fn set_cloud_path(
        &mut self,
        id: &TrackId,
        cloud_path: Option<String>,
    ) -> Result<Option<String>> {
        let track = self
            .tracks
            .get_mut(id)
            .ok_or_else(|| LibraryError::track_not_found(id))?;
        Ok(std::mem::replace(&mut track.cloud_path, cloud_path))
    }

    /// Assign a track to a known computer. Returns the previous owner.
    pub fn set_owner(&mut self, id: &TrackId, owner: &ComputerId) -> Result<Option<ComputerId>> {
        if self.computer(owner).is_none() {
            return Err(LibraryError::computer_not_found(owner));
        }
        let mut track = self
            .tracks
            .get(id)
            .cloned()
            .ok_or_else(|| LibraryError::track_not_found(id))?;

        let previous = track.owner_computer_id.replace(owner.clone());
        self.replace_track(track);
        Ok(previous)
    }

    /// Hand the (possibly mutated) snapshot back, consuming the index.
    pub fn into_library(self) -> Library {
        let Self {
            mut tracks,
            order,
            playlists,
            computers,
            ..
        } = self;

        Library {
            tracks: order.iter().filter_map(|id| tracks.remove(id)).collect(),
            playlists,
            computers,
        }
    }

    /// Copy of the current snapshot.
    pub fn to_library(&self) -> Library {
        Library {
            tracks: self.tracks().cloned().collect(),
            playlists: self.playlists.clone(),
            computers: self.computers.clone(),
        }
    }

    // =========================================================================
    // Secondary index maintenance
    // =========================================================================

    /// Swap in a new record for an existing track id, keeping its position.
    fn replace_track(&mut self, track: Track) {
        if let Some(previous) = self.tracks.remove(&track.id) {
            self.remove_secondary(&previous);
        }
        self.add_secondary(&track);
        self.tracks.insert(track.id.clone(), track);
    }

    fn add_secondary(&mut self, track: &Track) {
        let position = |list: &Vec<TrackId>, order: &Vec<TrackId>| {
            let rank = order.iter().position(|id| id == &track.id);
            list.iter()
                .position(|id| order.iter().position(|o| o == id) > rank)
                .unwrap_or(list.len())
        };

        let key = track.title_artist_key();
        let bucket = self.by_key.entry(key).or_default();
        let at = position(bucket, &self.order);
        bucket.insert(at, track.id.clone());

        if let Some(owner) = &track.owner_computer_id {
            let owned = self.by_owner.entry(owner.clone()).or_default();
            let at = position(owned, &self.order);
            owned.insert(at, track.id.clone());
        }
    }

    fn remove_secondary(&mut self, track: &Track) {
        let key = track.title_artist_key();
        if let Some(bucket) = self.by_key.get_mut(&key) {
            bucket.retain(|id| id != &track.id);
            if bucket.is_empty() {
                self.by_key.remove(&key);
            }
        }

        if let Some(owner) = &track.owner_computer_id {
            if let Some(owned) = self.by_owner.get_mut(owner) {
                owned.retain(|id| id != &track.id);
                if owned.is_empty() {
                    self.by_owner.remove(owner);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn library() -> Library {
        Library {
            tracks: vec![
                Track::new("a", "Halo", "Beyoncé", "/music/a.mp3")
                    .with_bitrate(320)
                    .with_owner("mac"),
                Track::new("b", "halo", "Beyonce", "/music/b.mp3").with_bitrate(128),
                Track::new("c", "Other", "Someone", "/music/c.mp3").with_owner("mac"),
            ],
            playlists: vec![
                Playlist::new("p1", "Favorites", vec!["b".into(), "c".into()]),
                Playlist::new("p2", "Both", vec!["a".into(), "b".into()]),
                Playlist::new("p3", "Ghost", vec!["zzz".into(), "c".into()]),
            ],
            computers: vec![
                Computer::new("mac", "Mac", vec!["/music".to_string()]),
                Computer::new("pc", "PC", vec!["D:/Music".to_string()]),
            ],
        }
    }

    #[test]
    fn test_build_and_lookups() {
        let index = LibraryIndex::build(library()).unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.get(&"b".into()).unwrap().bitrate_kbps, Some(128));
        let ids: Vec<_> = index.tracks().map(|t| t.id.as_str().to_string()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let key = index.get(&"a".into()).unwrap().title_artist_key();
        let bucket: Vec<_> = index.by_title_artist(&key).iter().map(|t| t.id.clone()).collect();
        assert_eq!(bucket, vec![TrackId::from("a"), TrackId::from("b")]);

        let owned: Vec<_> = index.owned_by(&"mac".into()).iter().map(|t| t.id.clone()).collect();
        assert_eq!(owned, vec![TrackId::from("a"), TrackId::from("c")]);
        assert!(index.owned_by(&"pc".into()).is_empty());

        assert_eq!(index.position(&"c".into()), Some(2));
        assert_eq!(index.playlists_containing(&"b".into()).len(), 2);
    }

    #[test]
    fn test_build_drops_unknown_playlist_entries() {
        let index = LibraryIndex::build(library()).unwrap();
        let ghost = index.playlists().iter().find(|p| p.id.as_str() == "p3").unwrap();
        assert_eq!(ghost.track_ids, vec![TrackId::from("c")]);
    }

    #[test]
    fn test_build_rejects_duplicate_track_ids() {
        let mut lib = library();
        lib.tracks.push(Track::new("a", "Again", "X", "/music/x.mp3"));
        let err = LibraryIndex::build(lib).unwrap_err();
        assert!(matches!(err, LibraryError::InvalidInput { .. }));
    }

    #[test]
    fn test_build_rejects_duplicate_computer_ids() {
        let mut lib = library();
        lib.computers.push(Computer::new("mac", "Mac again", vec![]));
        assert!(LibraryIndex::build(lib).is_err());
    }

    #[test]
    fn test_build_rejects_invalid_track() {
        let mut lib = library();
        lib.tracks.push(Track::new("d", "No path", "X", ""));
        assert!(LibraryIndex::build(lib).is_err());
    }

    #[test]
    fn test_merge_rewrites_playlists_and_removes_losers() {
        let mut index = LibraryIndex::build(library()).unwrap();
        let merged = index.get(&"a".into()).unwrap().clone().with_play_count(7);

        let outcome = index
            .merge_tracks(&"a".into(), &["b".into()], merged)
            .unwrap();

        assert_eq!(outcome.removed_ids, vec![TrackId::from("b")]);
        assert_eq!(
            outcome.playlists_updated,
            vec![PlaylistId::from("p1"), PlaylistId::from("p2")]
        );
        assert!(!index.contains(&"b".into()));
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&"a".into()).unwrap().play_count, 7);

        let p1 = &index.playlists()[0];
        assert_eq!(p1.track_ids, vec![TrackId::from("a"), TrackId::from("c")]);
        // p2 already listed the survivor
        let p2 = &index.playlists()[1];
        assert_eq!(p2.track_ids, vec![TrackId::from("a")]);

        let key = index.get(&"a".into()).unwrap().title_artist_key();
        assert_eq!(index.by_title_artist(&key).len(), 1);
    }

    #[test]
    fn test_merge_failure_leaves_index_untouched() {
        let mut index = LibraryIndex::build(library()).unwrap();
        let before = index.to_library();
        let merged = index.get(&"a".into()).unwrap().clone();

        let err = index
            .merge_tracks(&"a".into(), &["b".into(), "missing".into()], merged)
            .unwrap_err();

        assert!(matches!(err, LibraryError::NotFound { .. }));
        assert_eq!(index.to_library(), before);
    }

    #[test]
    fn test_merge_rejects_survivor_in_losers() {
        let mut index = LibraryIndex::build(library()).unwrap();
        let merged = index.get(&"a".into()).unwrap().clone();
        assert!(index.merge_tracks(&"a".into(), &["a".into()], merged).is_err());
    }

    #[test]
    fn test_set_location_and_cloud_path() {
        let mut index = LibraryIndex::build(library()).unwrap();

        let previous = index.set_location(&"c".into(), "/new/c.mp3").unwrap();
        assert_eq!(previous, "/music/c.mp3");
        assert_eq!(index.get(&"c".into()).unwrap().location, "/new/c.mp3");
        assert!(index.set_location(&"c".into(), "").is_err());
        assert!(index.set_location(&"zzz".into(), "/x.mp3").is_err());

        let previous = index
            .set_cloud_path(&"c".into(), Some("/Music/c.mp3".to_string()))
            .unwrap();
        assert_eq!(previous, None);
        assert_eq!(
            index.get(&"c".into()).unwrap().cloud_path.as_deref(),
            Some("/Music/c.mp3")
        );
    }

    #[test]
    fn test_set_owner_updates_owner_index() {
        let mut index = LibraryIndex::build(library()).unwrap();

        let previous = index.set_owner(&"a".into(), &"pc".into()).unwrap();
        assert_eq!(previous, Some(ComputerId::from("mac")));

        let mac: Vec<_> = index.owned_by(&"mac".into()).iter().map(|t| t.id.clone()).collect();
        assert_eq!(mac, vec![TrackId::from("c")]);
        assert_eq!(index.owned_by(&"pc".into()).len(), 1);

        let err = index.set_owner(&"a".into(), &"nas".into()).unwrap_err();
        assert!(matches!(err, LibraryError::NotFound { .. }));
    }

    #[test]
    fn test_secondary_index_keeps_insertion_order_after_reindex() {
        let mut index = LibraryIndex::build(library()).unwrap();
        index.set_owner(&"c".into(), &"pc".into()).unwrap();
        index.set_owner(&"c".into(), &"mac".into()).unwrap();

        let owned: Vec<_> = index.owned_by(&"mac".into()).iter().map(|t| t.id.clone()).collect();
        assert_eq!(owned, vec![TrackId::from("a"), TrackId::from("c")]);
    }

    #[test]
    fn test_into_library_preserves_order() {
        let index = LibraryIndex::build(library()).unwrap();
        let lib = index.into_library();
        let ids: Vec<_> = lib.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
