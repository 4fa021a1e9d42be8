//! # Relocation Matching
//!
//! Finds catalog entries whose files have moved and proposes where they went.
//!
//! ## Overview
//!
//! Relocation is a pipeline of small steps, each usable on its own:
//!
//! 1. [`RelocationMatcher::find_missing_tracks`] asks the filesystem probe
//!    which recorded locations no longer resolve.
//! 2. [`RelocationMatcher::collect_candidates`] walks the search roots
//!    through the probe and gathers audio files.
//! 3. [`RelocationMatcher::find_relocation_candidates`] scores every file
//!    against a missing track with the relocation weights and ranks them.
//! 4. [`RelocationMatcher::decide`] applies the top candidate only when its
//!    confidence clears the auto-relocate threshold.
//!
//! Explicit relocations (the user already picked the file) skip scoring: the
//! probe confirms the target exists and the index checks the track has not
//! moved since the request was made.

use crate::batch::BatchItem;
use crate::config::{ReconcileConfig, ScoreWeights};
use crate::error::{ReconcileError, Result};
use crate::paths;
use crate::scorer::{CandidateFile, ConfidenceScorer, MatchSubject, Signal};
use bridge_traits::FileSystemProbe;
use core_library::{LibraryIndex, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Kind of evidence that supported a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    Filename,
    Metadata,
    Size,
    Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelocationCandidate {
    pub track_id: TrackId,
    pub candidate_path: String,
    pub confidence: f64,
    pub evidence: BTreeSet<Evidence>,
}

/// Outcome of the auto-relocate gate
#[derive(Debug, Clone, PartialEq)]
pub enum AutoRelocateDecision {
    Apply(RelocationCandidate),
    NeedsReview(Vec<RelocationCandidate>),
}

/// Per-track result of an auto-relocate batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AutoRelocateOutcome {
    Relocated {
        candidate: RelocationCandidate,
    },
    /// Needs manual review; ranked candidates attached, possibly none
    NeedsReview {
        candidates: Vec<RelocationCandidate>,
    },
}

/// An already-chosen relocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationRequest {
    pub track_id: TrackId,
    pub old_location: String,
    pub new_location: String,
}

impl RelocationRequest {
    pub fn new(
        track_id: impl Into<TrackId>,
        old_location: impl Into<String>,
        new_location: impl Into<String>,
    ) -> Self {
        Self {
            track_id: track_id.into(),
            old_location: old_location.into(),
            new_location: new_location.into(),
        }
    }
}

impl BatchItem for RelocationRequest {
    fn item_id(&self) -> String {
        self.track_id.to_string()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelocationOptions {
    pub search_paths: Vec<String>,
    /// Overrides the configured relocation weights for this call
    pub weights: Option<ScoreWeights>,
}

#[derive(Debug, Clone)]
pub struct RelocationMatcher {
    scorer: ConfidenceScorer,
    weights: ScoreWeights,
    max_candidates: usize,
    extensions: HashSet<String>,
}

impl Default for RelocationMatcher {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

impl RelocationMatcher {
    pub fn new(
        scorer: ConfidenceScorer,
        weights: ScoreWeights,
        max_candidates: usize,
        extensions: &[String],
    ) -> Self {
        Self {
            scorer,
            weights,
            max_candidates,
            extensions: extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self::new(
            ConfidenceScorer::new(config.scoring),
            config.relocation_weights,
            config.max_relocation_candidates,
            &config.audio_extensions,
        )
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    /// Tracks whose recorded location does not resolve.
    ///
    /// A probe error counts as missing; the error is logged.
    #[instrument(skip_all, fields(tracks = tracks.len()))]
    pub async fn find_missing_tracks(
        &self,
        tracks: &[Track],
        probe: &dyn FileSystemProbe,
    ) -> Vec<Track> {
        let mut missing = Vec::new();

        for track in tracks {
            match probe.exists(Path::new(&track.location)).await {
                Ok(true) => {}
                Ok(false) => missing.push(track.clone()),
                Err(e) => {
                    warn!(
                        track_id = %track.id,
                        error = %e,
                        "Existence check failed, treating track as missing"
                    );
                    missing.push(track.clone());
                }
            }
        }

        info!(missing = missing.len(), "Missing track scan finished");
        missing
    }

    /// Audio files under the search roots, walked recursively through the
    /// probe and sorted by path.
    ///
    /// Unreadable directories and entries are logged and skipped.
    #[instrument(skip_all, fields(roots = search_paths.len()))]
    pub async fn collect_candidates(
        &self,
        search_paths: &[String],
        probe: &dyn FileSystemProbe,
    ) -> Vec<CandidateFile> {
        let mut candidates = Vec::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut pending: Vec<PathBuf> = search_paths.iter().rev().map(PathBuf::from).collect();

        while let Some(dir) = pending.pop() {
            if !visited.insert(dir.clone()) {
                continue;
            }

            let entries = match probe.list_directory(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        path = %dir.display(),
                        error = %e,
                        "Skipping unreadable directory"
                    );
                    continue;
                }
            };

            let mut subdirs = Vec::new();
            for entry in entries {
                let metadata = match probe.metadata(&entry).await {
                    Ok(metadata) => metadata,
                    Err(e) => {
                        debug!(path = %entry.display(), error = %e, "Skipping unreadable entry");
                        continue;
                    }
                };

                if metadata.is_directory {
                    subdirs.push(entry);
                    continue;
                }

                let path = entry.to_string_lossy().into_owned();
                if self.is_audio_file(&path) && visited.insert(entry) {
                    candidates.push(CandidateFile::new(path).with_size(metadata.size));
                }
            }

            pending.extend(subdirs.into_iter().rev());
        }

        candidates.sort_by(|a, b| a.path.cmp(&b.path));
        debug!(candidates = candidates.len(), "Collected relocation candidates");
        candidates
    }

    pub fn is_audio_file(&self, path: &str) -> bool {
        paths::extension(path).map_or(false, |ext| self.extensions.contains(&ext))
    }

    /// Score and rank `candidates` as new homes for `track`.
    ///
    /// Zero-confidence candidates and the track's own recorded location are
    /// dropped. Ranking is by confidence, then by edit distance to the old
    /// location, then lexically; the list is cut to the configured maximum.
    pub fn find_relocation_candidates(
        &self,
        track: &Track,
        candidates: &[CandidateFile],
        weights: Option<&ScoreWeights>,
    ) -> Vec<RelocationCandidate> {
        let weights = weights.unwrap_or(&self.weights);
        let subject = MatchSubject::from(track);

        let mut ranked: Vec<(RelocationCandidate, usize)> = candidates
            .iter()
            .filter(|file| file.path != track.location)
            .filter_map(|file| {
                let breakdown =
                    self.scorer
                        .score_detailed(&subject, &MatchSubject::from(file), weights);
                if breakdown.confidence <= 0.0 {
                    return None;
                }

                let mut evidence = BTreeSet::new();
                if breakdown.contributed(Signal::Path) {
                    evidence.insert(Evidence::Filename);
                }
                if [Signal::Title, Signal::Artist, Signal::Album]
                    .into_iter()
                    .any(|s| breakdown.contributed(s))
                {
                    evidence.insert(Evidence::Metadata);
                }
                if breakdown.contributed(Signal::Size) {
                    evidence.insert(Evidence::Size);
                }
                if breakdown.contributed(Signal::Duration) {
                    evidence.insert(Evidence::Duration);
                }

                let distance = strsim::levenshtein(&file.path, &track.location);
                Some((
                    RelocationCandidate {
                        track_id: track.id.clone(),
                        candidate_path: file.path.clone(),
                        confidence: breakdown.confidence,
                        evidence,
                    },
                    distance,
                ))
            })
            .collect();

        ranked.sort_by(|(a, da), (b, db)| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then(da.cmp(db))
                .then_with(|| a.candidate_path.cmp(&b.candidate_path))
        });
        ranked.truncate(self.max_candidates);

        ranked.into_iter().map(|(candidate, _)| candidate).collect()
    }

    /// Apply the top candidate when it reaches `auto_threshold`, otherwise
    /// hand the ranked list back for review.
    pub fn decide(
        mut candidates: Vec<RelocationCandidate>,
        auto_threshold: f64,
    ) -> AutoRelocateDecision {
        let apply = candidates
            .first()
            .map_or(false, |top| top.confidence >= auto_threshold);
        if apply {
            AutoRelocateDecision::Apply(candidates.swap_remove(0))
        } else {
            AutoRelocateDecision::NeedsReview(candidates)
        }
    }

    /// Confirm an explicit relocation target exists.
    pub async fn verify_target(
        &self,
        request: &RelocationRequest,
        probe: &dyn FileSystemProbe,
    ) -> Result<()> {
        let rejected = |reason: String| ReconcileError::Relocation {
            track_id: request.track_id.to_string(),
            path: request.new_location.clone(),
            reason,
        };

        if request.new_location.trim().is_empty() {
            return Err(rejected("new location is empty".to_string()));
        }

        match probe.exists(Path::new(&request.new_location)).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(rejected("file does not exist".to_string())),
            Err(e) => Err(rejected(format!("existence check failed: {}", e))),
        }
    }

    /// Point the track at its new location, provided it still sits at the
    /// location the request was made against.
    pub fn apply_relocation(
        &self,
        index: &mut LibraryIndex,
        request: &RelocationRequest,
    ) -> Result<String> {
        let current = index
            .get(&request.track_id)
            .ok_or_else(|| ReconcileError::track_not_found(&request.track_id))?
            .location
            .clone();

        if current != request.old_location {
            return Err(ReconcileError::conflict(
                &request.track_id,
                "track location changed since the relocation was requested",
            ));
        }

        let previous = index.set_location(&request.track_id, request.new_location.clone())?;
        debug!(track_id = %request.track_id, "Track relocated");
        Ok(previous)
    }
}

/// Search roots for an auto-relocate run: the explicit paths plus the folder
/// holding the library file, without repeats.
pub fn search_roots(search_paths: &[String], library_path: Option<&str>) -> Vec<String> {
    let mut roots: Vec<String> = Vec::with_capacity(search_paths.len() + 1);
    let extra = library_path.and_then(paths::parent).map(str::to_string);

    for root in search_paths.iter().cloned().chain(extra) {
        if !root.trim().is_empty() && !roots.contains(&root) {
            roots.push(root);
        }
    }
    roots
}
