//! # Duplicate Resolution
//!
//! Collapses each duplicate group into a single surviving track.
//!
//! ## Overview
//!
//! A resolution names a group and a policy:
//! - **KeepHighestBitrate**: keep the best-sounding copy
//! - **KeepMostCompleteMetadata**: keep the best-tagged copy and fill its
//!   blanks from the others
//! - **KeepExplicitChoice**: keep the track the user picked
//!
//! Whatever the policy, the survivor keeps its identity and location while
//! usage data is folded in from the removed copies: play counts are summed,
//! the highest rating wins, and the earliest `date_added` is kept. Playlist
//! references are rewritten through [`LibraryIndex::merge_tracks`], so each
//! group is applied atomically. Groups are independent; one failing group
//! does not stop the others.

use crate::duplicates::DuplicateGroup;
use crate::error::{ReconcileError, Result};
use core_library::{LibraryIndex, PlaylistId, Track, TrackId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Survivor selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    #[default]
    KeepHighestBitrate,
    KeepMostCompleteMetadata,
    KeepExplicitChoice,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateResolution {
    pub group_id: String,
    /// Required for `KeepExplicitChoice`; overrides the policy's pick otherwise
    pub survivor_id: Option<TrackId>,
    pub policy: ResolutionPolicy,
}

impl DuplicateResolution {
    pub fn keep_highest_bitrate(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            survivor_id: None,
            policy: ResolutionPolicy::KeepHighestBitrate,
        }
    }

    pub fn keep_most_complete(group_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            survivor_id: None,
            policy: ResolutionPolicy::KeepMostCompleteMetadata,
        }
    }

    pub fn keep(group_id: impl Into<String>, survivor_id: impl Into<TrackId>) -> Self {
        Self {
            group_id: group_id.into(),
            survivor_id: Some(survivor_id.into()),
            policy: ResolutionPolicy::KeepExplicitChoice,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedMerge {
    pub group_id: String,
    pub survivor_id: TrackId,
    pub removed_ids: Vec<TrackId>,
    pub playlists_updated: Vec<PlaylistId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedResolution {
    pub group_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub applied: Vec<AppliedMerge>,
    pub failed: Vec<FailedResolution>,
}

/// A validated merge, ready to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct MergePlan {
    pub group_id: String,
    pub survivor_id: TrackId,
    pub loser_ids: Vec<TrackId>,
    pub merged: Track,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Resolver;

impl Resolver {
    pub fn new() -> Self {
        Self
    }

    /// Apply every resolution, collecting per-group outcomes.
    #[instrument(skip_all, fields(resolutions = resolutions.len()))]
    pub fn resolve(
        &self,
        index: &mut LibraryIndex,
        groups: &[DuplicateGroup],
        resolutions: &[DuplicateResolution],
    ) -> ResolutionSummary {
        let mut summary = ResolutionSummary::default();

        for resolution in resolutions {
            let outcome = find_group(groups, &resolution.group_id)
                .and_then(|group| self.resolve_group(index, group, resolution));

            match outcome {
                Ok(applied) => summary.applied.push(applied),
                Err(e) => {
                    warn!(group_id = %resolution.group_id, error = %e, "Resolution failed");
                    summary.failed.push(FailedResolution {
                        group_id: resolution.group_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            applied = summary.applied.len(),
            failed = summary.failed.len(),
            "Duplicate resolution finished"
        );
        summary
    }

    /// Validate and apply one resolution.
    pub fn resolve_group(
        &self,
        index: &mut LibraryIndex,
        group: &DuplicateGroup,
        resolution: &DuplicateResolution,
    ) -> Result<AppliedMerge> {
        let plan = self.plan(index, group, resolution)?;
        let outcome = index.merge_tracks(&plan.survivor_id, &plan.loser_ids, plan.merged)?;

        debug!(
            group_id = %plan.group_id,
            survivor_id = %outcome.survivor_id,
            removed = outcome.removed_ids.len(),
            "Applied duplicate merge"
        );

        Ok(AppliedMerge {
            group_id: plan.group_id,
            survivor_id: outcome.survivor_id,
            removed_ids: outcome.removed_ids,
            playlists_updated: outcome.playlists_updated,
        })
    }

    /// Work out the merge for a resolution against the index's current state,
    /// without changing anything.
    pub fn plan(
        &self,
        index: &LibraryIndex,
        group: &DuplicateGroup,
        resolution: &DuplicateResolution,
    ) -> Result<MergePlan> {
        let invalid = |reason: String| ReconcileError::InvalidResolution {
            group_id: group.id.clone(),
            reason,
        };

        if resolution.group_id != group.id {
            return Err(invalid(format!(
                "resolution targets group {}",
                resolution.group_id
            )));
        }

        let mut members = Vec::with_capacity(group.track_ids.len());
        for id in &group.track_ids {
            let track = index
                .get(id)
                .ok_or_else(|| invalid(format!("member {} no longer exists", id)))?;
            members.push(track);
        }
        if members.len() < 2 {
            return Err(invalid("group has fewer than two members".to_string()));
        }

        let survivor_id = match (&resolution.survivor_id, resolution.policy) {
            (Some(chosen), _) => {
                if !group.contains(chosen) {
                    return Err(invalid(format!("survivor {} is not in the group", chosen)));
                }
                chosen.clone()
            }
            (None, ResolutionPolicy::KeepExplicitChoice) => {
                return Err(invalid(
                    "an explicit choice requires a survivor id".to_string(),
                ));
            }
            (None, policy) => select_survivor(&members, policy)
                .map(|t| t.id.clone())
                .ok_or_else(|| invalid("group has no members".to_string()))?,
        };

        let survivor = members
            .iter()
            .find(|t| t.id == survivor_id)
            .copied()
            .ok_or_else(|| invalid(format!("survivor {} not found", survivor_id)))?;
        let losers: Vec<&Track> = members
            .iter()
            .copied()
            .filter(|t| t.id != survivor_id)
            .collect();

        let fill_missing = resolution.policy == ResolutionPolicy::KeepMostCompleteMetadata;
        let merged = merge_metadata(survivor, &losers, fill_missing);

        Ok(MergePlan {
            group_id: group.id.clone(),
            survivor_id,
            loser_ids: losers.iter().map(|t| t.id.clone()).collect(),
            merged,
        })
    }
}

fn find_group<'a>(groups: &'a [DuplicateGroup], group_id: &str) -> Result<&'a DuplicateGroup> {
    groups
        .iter()
        .find(|g| g.id == group_id)
        .ok_or_else(|| ReconcileError::InvalidResolution {
            group_id: group_id.to_string(),
            reason: "unknown group".to_string(),
        })
}

/// Pick the survivor among `members` (given in group order).
///
/// Ties fall through to the other criterion and finally to the earliest
/// member.
pub fn select_survivor<'a>(members: &[&'a Track], policy: ResolutionPolicy) -> Option<&'a Track> {
    let rank = |t: &Track| {
        let bitrate = t.bitrate_kbps.unwrap_or(0);
        let completeness = t.metadata_completeness();
        match policy {
            ResolutionPolicy::KeepMostCompleteMetadata => (completeness as u64, bitrate as u64),
            _ => (bitrate as u64, completeness as u64),
        }
    };

    members
        .iter()
        .copied()
        .reduce(|best, candidate| if rank(candidate) > rank(best) { candidate } else { best })
}

/// Fold the losers' usage data into the survivor's record.
pub fn merge_metadata(survivor: &Track, losers: &[&Track], fill_missing: bool) -> Track {
    let mut merged = survivor.clone();

    for loser in losers {
        merged.play_count = merged.play_count.saturating_add(loser.play_count);
        merged.rating = merged.rating.max(loser.rating);
        merged.date_added = match (merged.date_added, loser.date_added) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        if fill_missing {
            fill_blank_text(&mut merged.title, &loser.title);
            fill_blank_text(&mut merged.artist, &loser.artist);
            fill_blank(&mut merged.album, &loser.album);
            fill_blank(&mut merged.genre, &loser.genre);
            fill_blank(&mut merged.year, &loser.year);
            fill_blank(&mut merged.track_number, &loser.track_number);
            fill_blank(&mut merged.duration_seconds, &loser.duration_seconds);
            fill_blank(&mut merged.bitrate_kbps, &loser.bitrate_kbps);
            fill_blank(&mut merged.file_size_bytes, &loser.file_size_bytes);
        }
    }

    merged
}

fn fill_blank<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
    if target.is_none() {
        target.clone_from(source);
    }
}

fn fill_blank_text(target: &mut String, source: &str) {
    if target.trim().is_empty() && !source.trim().is_empty() {
        *target = source.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_library::{Library, Playlist};

    fn library() -> Library {
        Library {
            tracks: vec![
                Track::new("a", "Halo", "Beyonce", "/m/a.mp3")
                    .with_bitrate(128)
                    .with_play_count(3)
                    .with_rating(60)
                    .with_date_added(Utc.with_ymd_and_hms(2020, 5, 1, 0, 0, 0).unwrap()),
                Track::new("b", "Halo", "Beyonce", "/m/b.mp3")
                    .with_bitrate(320)
                    .with_play_count(4)
                    .with_date_added(Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap()),
                Track::new("c", "Halo", "Beyonce", "/m/c.mp3")
                    .with_album("I Am... Sasha Fierce")
                    .with_duration(261.0)
                    .with_play_count(1)
                    .with_rating(80),
            ],
            playlists: vec![
                Playlist::new("p1", "Mix", vec!["a".into(), "c".into()]),
                Playlist::new("p2", "Car", vec!["c".into(), "b".into(), "a".into()]),
            ],
            computers: vec![],
        }
    }

    fn group() -> DuplicateGroup {
        DuplicateGroup {
            id: "group-a".to_string(),
            track_ids: vec!["a".into(), "b".into(), "c".into()],
            scores: vec![],
        }
    }

    #[test]
    fn test_keep_highest_bitrate_merges_usage() {
        let mut index = LibraryIndex::build(library()).unwrap();

        let summary = Resolver::new().resolve(
            &mut index,
            &[group()],
            &[DuplicateResolution::keep_highest_bitrate("group-a")],
        );

        assert!(summary.failed.is_empty());
        let applied = &summary.applied[0];
        assert_eq!(applied.survivor_id, TrackId::from("b"));
        assert_eq!(applied.removed_ids, vec![TrackId::from("a"), TrackId::from("c")]);

        let survivor = index.get(&"b".into()).unwrap();
        assert_eq!(survivor.play_count, 8);
        assert_eq!(survivor.rating, Some(80));
        assert_eq!(
            survivor.date_added,
            Some(Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(survivor.location, "/m/b.mp3");
        // Metadata is not filled under this policy
        assert_eq!(survivor.album, None);
    }

    #[test]
    fn test_referential_integrity_after_merge() {
        let mut index = LibraryIndex::build(library()).unwrap();

        Resolver::new().resolve(
            &mut index,
            &[group()],
            &[DuplicateResolution::keep("group-a", "a")],
        );

        assert!(!index.contains(&"b".into()));
        assert!(!index.contains(&"c".into()));
        for playlist in index.playlists() {
            assert_eq!(playlist.track_ids, vec![TrackId::from("a")]);
        }
    }

    #[test]
    fn test_keep_most_complete_fills_blanks() {
        let mut index = LibraryIndex::build(library()).unwrap();

        let summary = Resolver::new().resolve(
            &mut index,
            &[group()],
            &[DuplicateResolution::keep_most_complete("group-a")],
        );

        // a and c both carry five fields; a wins on bitrate
        assert_eq!(summary.applied[0].survivor_id, TrackId::from("a"));
        let survivor = index.get(&"a".into()).unwrap();
        assert_eq!(survivor.album.as_deref(), Some("I Am... Sasha Fierce"));
        assert_eq!(survivor.duration_seconds, Some(261.0));
        assert_eq!(survivor.bitrate_kbps, Some(128));
    }

    #[test]
    fn test_explicit_choice_requires_survivor() {
        let mut index = LibraryIndex::build(library()).unwrap();
        let resolution = DuplicateResolution {
            group_id: "group-a".to_string(),
            survivor_id: None,
            policy: ResolutionPolicy::KeepExplicitChoice,
        };

        let summary = Resolver::new().resolve(&mut index, &[group()], &[resolution]);

        assert!(summary.applied.is_empty());
        assert_eq!(summary.failed[0].group_id, "group-a");
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_survivor_outside_group_rejected() {
        let index = LibraryIndex::build(library()).unwrap();
        let err = Resolver::new()
            .plan(&index, &group(), &DuplicateResolution::keep("group-a", "zzz"))
            .unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidResolution { .. }));
    }

    #[test]
    fn test_unknown_group_fails_without_blocking_others() {
        let mut index = LibraryIndex::build(library()).unwrap();

        let summary = Resolver::new().resolve(
            &mut index,
            &[group()],
            &[
                DuplicateResolution::keep_highest_bitrate("group-missing"),
                DuplicateResolution::keep_highest_bitrate("group-a"),
            ],
        );

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].group_id, "group-missing");
        assert_eq!(summary.applied.len(), 1);
    }

    #[test]
    fn test_resolving_twice_fails_second_time() {
        let mut index = LibraryIndex::build(library()).unwrap();
        let resolution = DuplicateResolution::keep_highest_bitrate("group-a");

        let summary = Resolver::new().resolve(
            &mut index,
            &[group()],
            &[resolution.clone(), resolution],
        );

        assert_eq!(summary.applied.len(), 1);
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].reason.contains("no longer exists"));
    }

    #[test]
    fn test_select_survivor_ties_keep_earliest() {
        let a = Track::new("a", "S", "A", "/a.mp3").with_bitrate(256);
        let b = Track::new("b", "S", "A", "/b.mp3").with_bitrate(256);
        assert_eq!(
            select_survivor(&[&a, &b], ResolutionPolicy::KeepHighestBitrate)
                .unwrap()
                .id,
            TrackId::from("a")
        );
    }
}
