//! # Multi-Computer Ownership
//!
//! A library merged from several machines records which computer each track
//! belongs to. When a track's location falls under the library roots of more
//! than one known computer, the owner is ambiguous.
//!
//! ## Suggested owner
//!
//! Among the matching computers the suggestion is picked by, in order:
//!
//! 1. the longest matching library root
//! 2. the most recent `date_added` among tracks that computer already owns
//! 3. the lexically smallest computer id
//!
//! A track is reported when more than one computer claims it, counting the
//! recorded owner as a claim even when its roots do not contain the
//! location. A track already owned by its suggested computer is settled and
//! is not reported again.

use crate::batch::{BatchItem, ItemFailure};
use crate::error::{ReconcileError, Result};
use crate::paths;
use chrono::{DateTime, Utc};
use core_library::{Computer, ComputerId, Library, LibraryIndex, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipIssue {
    pub track_id: TrackId,
    /// Sorted, at least two entries
    pub conflicting_computer_ids: Vec<ComputerId>,
    pub suggested_owner_id: ComputerId,
    pub current_owner_id: Option<ComputerId>,
}

impl BatchItem for OwnershipIssue {
    fn item_id(&self) -> String {
        self.track_id.to_string()
    }
}

/// Owner assignment for one track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipFix {
    pub track_id: TrackId,
    pub owner_id: ComputerId,
}

impl OwnershipFix {
    pub fn new(track_id: impl Into<TrackId>, owner_id: impl Into<ComputerId>) -> Self {
        Self {
            track_id: track_id.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl From<&OwnershipIssue> for OwnershipFix {
    fn from(issue: &OwnershipIssue) -> Self {
        Self {
            track_id: issue.track_id.clone(),
            owner_id: issue.suggested_owner_id.clone(),
        }
    }
}

impl BatchItem for OwnershipFix {
    fn item_id(&self) -> String {
        self.track_id.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipChange {
    pub track_id: TrackId,
    pub previous_owner_id: Option<ComputerId>,
    pub owner_id: ComputerId,
}

/// Result of applying ownership fixes to a whole library snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryOwnershipUpdate {
    pub library: Library,
    pub applied: Vec<OwnershipChange>,
    pub failed: Vec<ItemFailure>,
}

/// A computer whose roots contain a track, with the deepest matching root.
struct RootMatch<'a> {
    computer: &'a Computer,
    depth: usize,
    latest_added: Option<DateTime<Utc>>,
}

impl RootMatch<'_> {
    /// Ordering where the preferred owner sorts first.
    fn preference(&self, other: &Self) -> Ordering {
        other
            .depth
            .cmp(&self.depth)
            .then_with(|| other.latest_added.cmp(&self.latest_added))
            .then_with(|| self.computer.id.cmp(&other.computer.id))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OwnershipResolver;

impl OwnershipResolver {
    pub fn new() -> Self {
        Self
    }

    fn matching_roots<'a>(
        track: &Track,
        computers: &'a [Computer],
        index: &LibraryIndex,
    ) -> Vec<RootMatch<'a>> {
        computers
            .iter()
            .filter_map(|computer| {
                let depth = computer
                    .library_roots
                    .iter()
                    .filter(|root| paths::relative_to(&track.location, root).is_some())
                    .map(|root| paths::depth(root))
                    .max()?;
                let latest_added = index
                    .owned_by(&computer.id)
                    .iter()
                    .filter_map(|t| t.date_added)
                    .max();
                Some(RootMatch {
                    computer,
                    depth,
                    latest_added,
                })
            })
            .collect()
    }

    /// Issue for one track, if its owner is ambiguous and unsettled.
    pub fn check(
        &self,
        track: &Track,
        computers: &[Computer],
        index: &LibraryIndex,
    ) -> Option<OwnershipIssue> {
        let mut matches = Self::matching_roots(track, computers, index);
        matches.sort_by(|a, b| a.preference(b));
        let suggested_owner_id = matches.first()?.computer.id.clone();

        let owner = track.owner_computer_id.as_ref();
        if owner == Some(&suggested_owner_id) {
            return None;
        }

        // A recorded owner outside the matches still claims the track.
        let mut conflicting_computer_ids: Vec<ComputerId> = matches
            .iter()
            .map(|m| m.computer.id.clone())
            .chain(owner.cloned())
            .collect();
        conflicting_computer_ids.sort();
        conflicting_computer_ids.dedup();
        if conflicting_computer_ids.len() < 2 {
            return None;
        }

        Some(OwnershipIssue {
            track_id: track.id.clone(),
            conflicting_computer_ids,
            suggested_owner_id,
            current_owner_id: track.owner_computer_id.clone(),
        })
    }

    #[instrument(skip_all, fields(tracks = tracks.len(), computers = computers.len()))]
    pub fn detect(
        &self,
        tracks: &[Track],
        computers: &[Computer],
        index: &LibraryIndex,
    ) -> Vec<OwnershipIssue> {
        let issues: Vec<_> = tracks
            .iter()
            .filter_map(|track| self.check(track, computers, index))
            .collect();
        info!(issues = issues.len(), "Ownership analysis finished");
        issues
    }

    /// Assign the owner for a detected issue.
    ///
    /// Uses `owner_override` when given, otherwise the suggestion.
    ///
    /// # Errors
    ///
    /// `Conflict` if the track's owner changed since detection; library
    /// errors for an unknown track or computer.
    pub fn fix(
        &self,
        index: &mut LibraryIndex,
        issue: &OwnershipIssue,
        owner_override: Option<&ComputerId>,
    ) -> Result<OwnershipChange> {
        let track = index
            .get(&issue.track_id)
            .ok_or_else(|| ReconcileError::track_not_found(&issue.track_id))?;

        if track.owner_computer_id != issue.current_owner_id {
            return Err(ReconcileError::conflict(
                &issue.track_id,
                "owner changed since the issue was detected",
            ));
        }

        let owner = owner_override.unwrap_or(&issue.suggested_owner_id);
        self.apply_fix(
            index,
            &OwnershipFix {
                track_id: issue.track_id.clone(),
                owner_id: owner.clone(),
            },
        )
    }

    /// Assign an owner unconditionally.
    pub fn apply_fix(
        &self,
        index: &mut LibraryIndex,
        fix: &OwnershipFix,
    ) -> Result<OwnershipChange> {
        let previous_owner_id = index.set_owner(&fix.track_id, &fix.owner_id)?;
        debug!(
            track_id = %fix.track_id,
            owner = %fix.owner_id,
            previous = ?previous_owner_id,
            "Track owner assigned"
        );
        Ok(OwnershipChange {
            track_id: fix.track_id.clone(),
            previous_owner_id,
            owner_id: fix.owner_id.clone(),
        })
    }

    /// Apply fixes to a standalone snapshot.
    ///
    /// Each fix succeeds or fails on its own; an unknown track or computer
    /// only fails that fix. Errors only when the snapshot itself is invalid.
    #[instrument(skip_all, fields(fixes = fixes.len()))]
    pub fn update_library_ownership(
        &self,
        library: Library,
        fixes: &[OwnershipFix],
    ) -> Result<LibraryOwnershipUpdate> {
        let mut index = LibraryIndex::build(library)?;
        let mut applied = Vec::new();
        let mut failed = Vec::new();

        for fix in fixes {
            match self.apply_fix(&mut index, fix) {
                Ok(change) => applied.push(change),
                Err(e) => {
                    warn!(track_id = %fix.track_id, error = %e, "Ownership fix failed");
                    failed.push(ItemFailure {
                        item_id: fix.track_id.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            applied = applied.len(),
            failed = failed.len(),
            "Library ownership updated"
        );

        Ok(LibraryOwnershipUpdate {
            library: index.into_library(),
            applied,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn computers() -> Vec<Computer> {
        vec![
            Computer::new("studio", "Studio Mac", vec!["/Volumes/Shared".to_string()]),
            Computer::new("laptop", "Laptop", vec!["/Volumes/Shared".to_string()]),
            Computer::new(
                "desktop",
                "Desktop",
                vec!["/Volumes/Shared/Desktop".to_string(), "D:\\Music".to_string()],
            ),
        ]
    }

    fn library(tracks: Vec<Track>) -> Library {
        Library {
            tracks,
            playlists: Vec::new(),
            computers: computers(),
        }
    }

    #[test]
    fn test_single_match_is_not_an_issue() {
        let index = LibraryIndex::build(library(vec![Track::new(
            "t1",
            "A",
            "X",
            "d:/music/a.mp3",
        )]))
        .unwrap();
        let tracks: Vec<Track> = index.tracks().cloned().collect();
        let issues = OwnershipResolver::new().detect(&tracks, index.computers(), &index);
        assert!(issues.is_empty());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let index = LibraryIndex::build(library(vec![Track::new(
            "t1",
            "A",
            "X",
            "/Volumes/Shared/Desktop/a.mp3",
        )]))
        .unwrap();
        let track = index.get(&"t1".into()).unwrap();

        let issue = OwnershipResolver::new()
            .check(track, index.computers(), &index)
            .unwrap();

        assert_eq!(issue.suggested_owner_id.as_str(), "desktop");
        assert_eq!(
            issue.conflicting_computer_ids,
            vec!["desktop".into(), "laptop".into(), "studio".into()]
        );
        assert_eq!(issue.current_owner_id, None);
    }

    #[test]
    fn test_recent_activity_breaks_equal_prefix() {
        let old = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let index = LibraryIndex::build(library(vec![
            Track::new("t1", "A", "X", "/Volumes/Shared/a.mp3"),
            Track::new("s", "S", "X", "/elsewhere/s.mp3")
                .with_owner("studio")
                .with_date_added(old),
            Track::new("l", "L", "X", "/elsewhere/l.mp3")
                .with_owner("laptop")
                .with_date_added(recent),
        ]))
        .unwrap();

        let issue = OwnershipResolver::new()
            .check(index.get(&"t1".into()).unwrap(), index.computers(), &index)
            .unwrap();
        assert_eq!(issue.suggested_owner_id.as_str(), "laptop");
    }

    #[test]
    fn test_lexical_tie_break() {
        let index =
            LibraryIndex::build(library(vec![Track::new("t1", "A", "X", "/Volumes/Shared/a.mp3")]))
                .unwrap();

        let issue = OwnershipResolver::new()
            .check(index.get(&"t1".into()).unwrap(), index.computers(), &index)
            .unwrap();
        assert_eq!(issue.suggested_owner_id.as_str(), "laptop");
    }

    #[test]
    fn test_owner_equal_to_suggestion_is_not_reported() {
        let index = LibraryIndex::build(library(vec![
            Track::new("t1", "A", "X", "/Volumes/Shared/Desktop/a.mp3").with_owner("desktop"),
            Track::new("t2", "B", "X", "d:/music/b.mp3").with_owner("desktop"),
        ]))
        .unwrap();
        let resolver = OwnershipResolver::new();
        for id in ["t1", "t2"] {
            assert!(resolver
                .check(index.get(&id.into()).unwrap(), index.computers(), &index)
                .is_none());
        }
    }

    #[test]
    fn test_matching_owner_other_than_suggestion_is_reported() {
        let index = LibraryIndex::build(library(vec![
            Track::new("t1", "A", "X", "/Volumes/Shared/Desktop/a.mp3").with_owner("studio"),
        ]))
        .unwrap();

        let issue = OwnershipResolver::new()
            .check(index.get(&"t1".into()).unwrap(), index.computers(), &index)
            .unwrap();

        assert_eq!(issue.suggested_owner_id.as_str(), "desktop");
        assert_eq!(issue.current_owner_id, Some(ComputerId::from("studio")));
        assert_eq!(
            issue.conflicting_computer_ids,
            vec!["desktop".into(), "laptop".into(), "studio".into()]
        );
    }

    #[test]
    fn test_owner_outside_single_match_is_reported() {
        let index = LibraryIndex::build(library(vec![
            Track::new("t1", "A", "X", "d:/music/a.mp3").with_owner("studio"),
            Track::new("t2", "B", "X", "d:/music/b.mp3"),
        ]))
        .unwrap();
        let resolver = OwnershipResolver::new();

        let issue = resolver
            .check(index.get(&"t1".into()).unwrap(), index.computers(), &index)
            .unwrap();
        assert_eq!(issue.suggested_owner_id.as_str(), "desktop");
        assert_eq!(
            issue.conflicting_computer_ids,
            vec!["desktop".into(), "studio".into()]
        );

        // Unowned with a single match is unambiguous.
        assert!(resolver
            .check(index.get(&"t2".into()).unwrap(), index.computers(), &index)
            .is_none());
    }

    #[test]
    fn test_fix_and_override() {
        let resolver = OwnershipResolver::new();
        let mut index = LibraryIndex::build(library(vec![
            Track::new("t1", "A", "X", "/Volumes/Shared/a.mp3"),
            Track::new("t2", "B", "X", "/Volumes/Shared/b.mp3"),
        ]))
        .unwrap();
        let tracks: Vec<Track> = index.tracks().cloned().collect();
        let computers = index.computers().to_vec();
        let issues = resolver.detect(&tracks, &computers, &index);
        assert_eq!(issues.len(), 2);

        let change = resolver.fix(&mut index, &issues[0], None).unwrap();
        assert_eq!(change.owner_id.as_str(), "laptop");
        assert_eq!(change.previous_owner_id, None);

        let studio = ComputerId::from("studio");
        resolver.fix(&mut index, &issues[1], Some(&studio)).unwrap();
        assert_eq!(index.owned_by(&studio).len(), 1);

        // The override stays visible until it agrees with the suggestion.
        let tracks: Vec<Track> = index.tracks().cloned().collect();
        let remaining = resolver.detect(&tracks, &computers, &index);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].track_id.as_str(), "t2");
        assert_eq!(remaining[0].current_owner_id, Some(studio));
    }

    #[test]
    fn test_stale_issue_is_conflict() {
        let resolver = OwnershipResolver::new();
        let mut index =
            LibraryIndex::build(library(vec![Track::new("t1", "A", "X", "/Volumes/Shared/a.mp3")]))
                .unwrap();
        let issue = resolver
            .check(index.get(&"t1".into()).unwrap(), index.computers(), &index)
            .unwrap();

        index.set_owner(&"t1".into(), &"studio".into()).unwrap();

        let err = resolver.fix(&mut index, &issue, None).unwrap_err();
        assert!(matches!(err, ReconcileError::Conflict { .. }));
    }

    #[test]
    fn test_update_library_ownership_isolates_failures() {
        let update = OwnershipResolver::new()
            .update_library_ownership(
                library(vec![
                    Track::new("t1", "A", "X", "/Volumes/Shared/a.mp3"),
                    Track::new("t2", "B", "X", "/Volumes/Shared/b.mp3"),
                ]),
                &[
                    OwnershipFix::new("t1", "studio"),
                    OwnershipFix::new("ghost", "studio"),
                    OwnershipFix::new("t2", "nobody"),
                ],
            )
            .unwrap();

        assert_eq!(update.applied.len(), 1);
        assert_eq!(update.failed.len(), 2);
        assert_eq!(update.failed[0].item_id, "ghost");
        assert_eq!(
            update.library.tracks[0].owner_computer_id,
            Some(ComputerId::from("studio"))
        );
        assert_eq!(update.library.tracks[1].owner_computer_id, None);
    }
}
