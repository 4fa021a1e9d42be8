//! # Duplicate Detection
//!
//! Groups catalog entries that describe the same recording.
//!
//! ## Algorithm
//!
//! 1. Bucket tracks by their normalized title + artist key. This only limits
//!    the pairs that get compared; the score itself still looks at every
//!    signal.
//! 2. Score every pair inside a bucket.
//! 3. Link two tracks when their confidence reaches the threshold.
//! 4. Connected components of that graph become groups, so duplicate-ness is
//!    transitive: A~B and B~C put A, B, and C together even when A~C alone
//!    falls short. Singletons are dropped.
//!
//! Output is deterministic: groups are ordered by the index position of their
//! first member and members keep index order.

use crate::config::{ReconcileConfig, ScoreWeights, ThresholdSpec};
use crate::error::Result;
use crate::scorer::{ConfidenceScorer, PairScorer};
use core_library::{LibraryIndex, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Confidence between two members of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub a: TrackId,
    pub b: TrackId,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Derived from the first member, stable across identical runs
    pub id: String,
    pub track_ids: Vec<TrackId>,
    pub scores: Vec<PairScore>,
}

impl DuplicateGroup {
    pub fn id_for(first_member: &TrackId) -> String {
        format!("group-{}", first_member)
    }

    pub fn contains(&self, track_id: &TrackId) -> bool {
        self.track_ids.contains(track_id)
    }

    /// Recorded confidence between two members, in either order.
    pub fn confidence(&self, a: &TrackId, b: &TrackId) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| (&s.a == a && &s.b == b) || (&s.a == b && &s.b == a))
            .map(|s| s.confidence)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateOptions {
    pub threshold: ThresholdSpec,
    /// Overrides the configured duplicate weights for this call
    pub weights: Option<ScoreWeights>,
}

impl DuplicateOptions {
    pub fn with_threshold(mut self, threshold: impl Into<ThresholdSpec>) -> Self {
        self.threshold = threshold.into();
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = Some(weights);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct DuplicateDetector {
    scorer: ConfidenceScorer,
    default_weights: ScoreWeights,
}

impl DuplicateDetector {
    pub fn new(scorer: ConfidenceScorer, default_weights: ScoreWeights) -> Self {
        Self {
            scorer,
            default_weights,
        }
    }

    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self::new(
            ConfidenceScorer::new(config.scoring),
            config.duplicate_weights,
        )
    }

    /// Find duplicate groups across the whole index.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an out-of-range explicit threshold, `Config` for
    /// invalid override weights.
    pub fn find_duplicates(
        &self,
        index: &LibraryIndex,
        options: &DuplicateOptions,
    ) -> Result<Vec<DuplicateGroup>> {
        let threshold = options.threshold.resolve(&self.scorer.config().thresholds)?;
        let weights = options.weights.unwrap_or(self.default_weights);
        weights.validate()?;

        Ok(detect_with(
            index,
            &self.scorer.with_weights(weights),
            threshold,
        ))
    }
}

/// Group duplicates using an arbitrary pair scorer.
pub fn detect_with(
    index: &LibraryIndex,
    scorer: &dyn PairScorer,
    threshold: f64,
) -> Vec<DuplicateGroup> {
    let tracks: Vec<_> = index.tracks().collect();

    // Buckets in order of first appearance.
    let mut bucket_of: HashMap<String, usize> = HashMap::new();
    let mut buckets: Vec<Vec<usize>> = Vec::new();
    for (position, track) in tracks.iter().enumerate() {
        let key = track.title_artist_key();
        let slot = *bucket_of.entry(key).or_insert_with(|| {
            buckets.push(Vec::new());
            buckets.len() - 1
        });
        buckets[slot].push(position);
    }

    let mut components = UnionFind::new(tracks.len());
    let mut scored: Vec<(usize, usize, f64)> = Vec::new();
    let mut comparisons = 0usize;

    for bucket in buckets.iter().filter(|b| b.len() > 1) {
        for (i, &a) in bucket.iter().enumerate() {
            for &b in &bucket[i + 1..] {
                let confidence = scorer.score_pair(tracks[a], tracks[b]);
                comparisons += 1;
                scored.push((a, b, confidence));
                if confidence >= threshold {
                    components.union(a, b);
                }
            }
        }
    }

    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut roots_in_order = Vec::new();
    for position in 0..tracks.len() {
        let root = components.find(position);
        let entry = members.entry(root).or_default();
        if entry.is_empty() {
            roots_in_order.push(root);
        }
        entry.push(position);
    }

    let mut scores_by_root: HashMap<usize, Vec<PairScore>> = HashMap::new();
    for (a, b, confidence) in scored {
        let root = components.find(a);
        if root == components.find(b) {
            scores_by_root.entry(root).or_default().push(PairScore {
                a: tracks[a].id.clone(),
                b: tracks[b].id.clone(),
                confidence,
            });
        }
    }

    let groups: Vec<DuplicateGroup> = roots_in_order
        .into_iter()
        .filter_map(|root| {
            let positions = members.remove(&root)?;
            if positions.len() < 2 {
                return None;
            }
            let track_ids: Vec<TrackId> = positions.iter().map(|&p| tracks[p].id.clone()).collect();
            Some(DuplicateGroup {
                id: DuplicateGroup::id_for(&track_ids[0]),
                track_ids,
                scores: scores_by_root.remove(&root).unwrap_or_default(),
            })
        })
        .collect();

    debug!(
        tracks = tracks.len(),
        comparisons,
        groups = groups.len(),
        threshold,
        "Duplicate detection finished"
    );

    groups
}

/// Disjoint-set forest with path halving.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Always roots at the smaller index, so a component's root is its first
    /// member in index order.
    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }
}
