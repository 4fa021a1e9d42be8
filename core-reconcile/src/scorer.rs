//! # Confidence Scoring
//!
//! Shared similarity primitive behind duplicate detection and relocation.
//!
//! ## Overview
//!
//! Two records are compared signal by signal:
//!
//! | Signal   | Similarity                                                   |
//! |----------|--------------------------------------------------------------|
//! | title    | normalized Levenshtein ratio after case/diacritic folding    |
//! | artist   | same as title                                                |
//! | album    | same as title                                                |
//! | duration | `max(0, 1 - |a - b| / tolerance)`                            |
//! | size     | same shape, tolerance is a percentage of the larger file     |
//! | path     | string similarity of the file names only                     |
//!
//! The confidence is the weighted mean over the signals present on both
//! sides. Weights of signals missing on either side are dropped and the rest
//! renormalized, so a sparse record is not punished for metadata it never
//! had. When nothing is comparable the confidence is `0.0`.
//!
//! Every signal is symmetric, so `score(a, b) == score(b, a)`.

use crate::config::{ConfidenceLevel, ScoreWeights, ScoringConfig};
use crate::paths;
use core_library::{normalize_text, Track};
use serde::{Deserialize, Serialize};

// =============================================================================
// Match Subjects
// =============================================================================

/// A file found on disk during a relocation search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFile {
    pub path: String,
    pub file_size_bytes: Option<u64>,
    pub duration_seconds: Option<f64>,
}

impl CandidateFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            file_size_bytes: None,
            duration_seconds: None,
        }
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.file_size_bytes = Some(bytes);
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }
}

/// The comparable view of either a catalog track or a file on disk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchSubject {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: Option<f64>,
    pub file_size_bytes: Option<u64>,
    pub path: Option<String>,
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl From<&Track> for MatchSubject {
    fn from(track: &Track) -> Self {
        Self {
            title: non_blank(&track.title),
            artist: non_blank(&track.artist),
            album: track.album.as_deref().and_then(non_blank),
            duration_seconds: track.duration_seconds,
            file_size_bytes: track.file_size_bytes,
            path: non_blank(&track.location),
        }
    }
}

impl From<&CandidateFile> for MatchSubject {
    /// Files are usually laid out as `Artist/Album/NN Title.ext`; the
    /// directory names stand in for the tags the catalog would carry.
    fn from(file: &CandidateFile) -> Self {
        let parts = paths::components(&file.path);
        let dir = |depth: usize| {
            parts
                .len()
                .checked_sub(depth + 1)
                .and_then(|i| parts.get(i))
                .and_then(|name| non_blank(name))
        };

        Self {
            title: non_blank(strip_track_number(paths::file_stem(&file.path))),
            artist: dir(2),
            album: dir(1),
            duration_seconds: file.duration_seconds,
            file_size_bytes: file.file_size_bytes,
            path: non_blank(&file.path),
        }
    }
}

/// Drop a leading track number such as `03 - `, `1. ` or `07_`.
///
/// A stem made only of digits is kept as is, since it is more likely a title
/// ("1979") than a bare track number.
pub fn strip_track_number(stem: &str) -> &str {
    let rest = stem.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == stem.len() {
        return stem;
    }
    let rest = rest.trim_start_matches(|c: char| c == ' ' || c == '-' || c == '.' || c == '_');
    if rest.is_empty() {
        stem
    } else {
        rest
    }
}

// =============================================================================
// Score Breakdown
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Title,
    Artist,
    Album,
    Duration,
    Size,
    Path,
}

/// One comparable signal and how much it counted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub signal: Signal,
    pub similarity: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub confidence: f64,
    /// Signals present on both sides, in a fixed order
    pub signals: Vec<SignalScore>,
}

impl ScoreBreakdown {
    /// Whether `signal` was comparable, weighted, and non-zero.
    pub fn contributed(&self, signal: Signal) -> bool {
        self.signals
            .iter()
            .any(|s| s.signal == signal && s.weight > 0.0 && s.similarity > 0.0)
    }
}

// =============================================================================
// Scorer
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    config: ScoringConfig,
}

impl ConfidenceScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn classify(&self, score: f64) -> ConfidenceLevel {
        self.config.thresholds.classify(score)
    }

    /// Confidence in `[0, 1]` that `a` and `b` describe the same recording.
    pub fn score(&self, a: &MatchSubject, b: &MatchSubject, weights: &ScoreWeights) -> f64 {
        self.score_detailed(a, b, weights).confidence
    }

    pub fn score_detailed(
        &self,
        a: &MatchSubject,
        b: &MatchSubject,
        weights: &ScoreWeights,
    ) -> ScoreBreakdown {
        let mut signals = Vec::with_capacity(6);
        let mut push = |signal, similarity: Option<f64>, weight| {
            if let Some(similarity) = similarity {
                signals.push(SignalScore {
                    signal,
                    similarity,
                    weight,
                });
            }
        };

        push(
            Signal::Title,
            both(&a.title, &b.title, |x, y| text_similarity(x, y)),
            weights.title,
        );
        push(
            Signal::Artist,
            both(&a.artist, &b.artist, |x, y| text_similarity(x, y)),
            weights.artist,
        );
        push(
            Signal::Album,
            both(&a.album, &b.album, |x, y| text_similarity(x, y)),
            weights.album,
        );
        push(
            Signal::Duration,
            both(&a.duration_seconds, &b.duration_seconds, |x, y| {
                Some(self.duration_similarity(*x, *y))
            }),
            weights.duration,
        );
        push(
            Signal::Size,
            both(&a.file_size_bytes, &b.file_size_bytes, |x, y| {
                Some(self.size_similarity(*x, *y))
            }),
            weights.size,
        );
        push(
            Signal::Path,
            both(&a.path, &b.path, |x, y| path_similarity(x, y)),
            weights.path,
        );

        let total_weight: f64 = signals.iter().map(|s| s.weight).sum();
        let confidence = if total_weight > 0.0 {
            let weighted: f64 = signals.iter().map(|s| s.weight * s.similarity).sum();
            (weighted / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ScoreBreakdown {
            confidence,
            signals,
        }
    }

    pub fn duration_similarity(&self, a: f64, b: f64) -> f64 {
        linear_falloff((a - b).abs(), self.config.duration_tolerance_seconds)
    }

    pub fn size_similarity(&self, a: u64, b: u64) -> f64 {
        if a == b {
            return 1.0;
        }
        let tolerance = a.max(b) as f64 * self.config.size_tolerance_percent / 100.0;
        linear_falloff(a.abs_diff(b) as f64, tolerance)
    }

    /// Bind a weight set, producing a [`PairScorer`] over catalog tracks.
    pub fn with_weights(&self, weights: ScoreWeights) -> WeightedScorer {
        WeightedScorer {
            scorer: self.clone(),
            weights,
        }
    }
}

fn both<T, F>(a: &Option<T>, b: &Option<T>, f: F) -> Option<f64>
where
    F: FnOnce(&T, &T) -> Option<f64>,
{
    match (a, b) {
        (Some(a), Some(b)) => f(a, b),
        _ => None,
    }
}

fn linear_falloff(difference: f64, tolerance: f64) -> f64 {
    if !difference.is_finite() || tolerance <= 0.0 {
        return if difference == 0.0 { 1.0 } else { 0.0 };
    }
    (1.0 - difference / tolerance).max(0.0)
}

/// Similarity of two free-text values after normalization.
///
/// Values that normalize to nothing are treated as absent.
pub fn text_similarity(a: &str, b: &str) -> Option<f64> {
    let a = normalize_text(a);
    let b = normalize_text(b);
    if a.is_empty() || b.is_empty() {
        return None;
    }
    if a == b {
        return Some(1.0);
    }
    Some(strsim::normalized_levenshtein(&a, &b))
}

/// Similarity of the file names of two paths; directories are ignored.
pub fn path_similarity(a: &str, b: &str) -> Option<f64> {
    text_similarity(paths::file_name(a), paths::file_name(b))
}

// =============================================================================
// Pair Scoring Seam
// =============================================================================

/// Scores a pair of catalog tracks.
///
/// Duplicate detection scores through this trait, so callers can plug in a
/// differently weighted scorer or a fixed table.
pub trait PairScorer: Send + Sync {
    fn score_pair(&self, a: &Track, b: &Track) -> f64;
}

/// [`ConfidenceScorer`] bound to one weight set.
#[derive(Debug, Clone)]
pub struct WeightedScorer {
    scorer: ConfidenceScorer,
    weights: ScoreWeights,
}

impl WeightedScorer {
    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }
}

impl PairScorer for WeightedScorer {
    fn score_pair(&self, a: &Track, b: &Track) -> f64 {
        self.scorer
            .score(&MatchSubject::from(a), &MatchSubject::from(b), &self.weights)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scorer() -> ConfidenceScorer {
        ConfidenceScorer::default()
    }

    fn track(id: &str, title: &str, artist: &str, location: &str) -> Track {
        Track::new(id, title, artist, location)
    }

    #[test]
    fn test_identical_tracks_score_one() {
        let a = track("1", "Halo", "Beyoncé", "/m/Halo.mp3")
            .with_duration(261.0)
            .with_file_size(10_000_000);
        let b = track("2", "halo", "BEYONCE", "/other/Halo.mp3")
            .with_duration(261.0)
            .with_file_size(10_000_000);

        let score = scorer().score(&(&a).into(), &(&b).into(), &ScoreWeights::duplicate());
        assert!((score - 1.0).abs() < 1e-9, "score was {}", score);
        assert_eq!(scorer().classify(score), ConfidenceLevel::Exact);
    }

    #[test]
    fn test_score_is_symmetric() {
        let a = track("1", "Halo", "Beyonce", "/m/01 Halo.mp3")
            .with_duration(261.0)
            .with_file_size(10_000_000);
        let b = track("2", "Halo (Live)", "Beyonce", "/m/Halo live.m4a")
            .with_duration(262.5)
            .with_file_size(10_150_000);

        for weights in [ScoreWeights::duplicate(), ScoreWeights::relocation()] {
            let ab = scorer().score(&(&a).into(), &(&b).into(), &weights);
            let ba = scorer().score(&(&b).into(), &(&a).into(), &weights);
            assert_eq!(ab, ba);
            assert!(ab > 0.0 && ab < 1.0);
        }
    }

    #[test]
    fn test_missing_signals_are_renormalized() {
        // Only title and artist are comparable; both match exactly.
        let a = track("1", "Song", "Artist", "/a/x.mp3").with_duration(200.0);
        let b = track("2", "Song", "Artist", "/b/y.mp3");
        let weights = ScoreWeights {
            path: 0.0,
            ..ScoreWeights::duplicate()
        };

        let score = scorer().score(&(&a).into(), &(&b).into(), &weights);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_nothing_comparable_scores_zero() {
        let empty = MatchSubject::default();
        let other = MatchSubject {
            title: Some("Song".to_string()),
            ..MatchSubject::default()
        };
        assert_eq!(scorer().score(&empty, &other, &ScoreWeights::duplicate()), 0.0);
    }

    #[test]
    fn test_duration_similarity_tolerance() {
        let s = scorer();
        assert_eq!(s.duration_similarity(200.0, 200.0), 1.0);
        assert!((s.duration_similarity(200.0, 201.0) - 0.5).abs() < 1e-9);
        assert_eq!(s.duration_similarity(200.0, 203.0), 0.0);
    }

    #[test]
    fn test_size_similarity_tolerance() {
        let s = scorer();
        assert_eq!(s.size_similarity(1_000_000, 1_000_000), 1.0);
        // 1% of the larger file with a 2% tolerance
        assert!((s.size_similarity(1_000_000, 990_000) - 0.5).abs() < 1e-9);
        assert_eq!(s.size_similarity(1_000_000, 900_000), 0.0);
        assert_eq!(s.size_similarity(0, 10), 0.0);
    }

    #[test]
    fn test_text_similarity_normalizes() {
        assert_eq!(text_similarity("Sigur Rós", "sigur ros"), Some(1.0));
        assert_eq!(text_similarity("  ", "x"), None);
        let partial = text_similarity("Halo", "Hallo").unwrap();
        assert!(partial > 0.7 && partial < 1.0);
    }

    #[test]
    fn test_path_similarity_uses_file_names_only() {
        assert_eq!(
            path_similarity("/old/disk/Halo.mp3", "D:\\new\\place\\Halo.mp3"),
            Some(1.0)
        );
    }

    #[test]
    fn test_candidate_subject_from_layout() {
        let file = CandidateFile::new("/Volumes/Ext/Beyonce/I Am Sasha Fierce/03 - Halo.mp3")
            .with_size(9_000_000);
        let subject = MatchSubject::from(&file);

        assert_eq!(subject.title.as_deref(), Some("Halo"));
        assert_eq!(subject.album.as_deref(), Some("I Am Sasha Fierce"));
        assert_eq!(subject.artist.as_deref(), Some("Beyonce"));
        assert_eq!(subject.file_size_bytes, Some(9_000_000));
    }

    #[test]
    fn test_strip_track_number() {
        assert_eq!(strip_track_number("03 - Halo"), "Halo");
        assert_eq!(strip_track_number("1. Intro"), "Intro");
        assert_eq!(strip_track_number("07_Outro"), "Outro");
        assert_eq!(strip_track_number("1979"), "1979");
        assert_eq!(strip_track_number("Halo"), "Halo");
    }

    #[test]
    fn test_breakdown_reports_contributing_signals() {
        let a = track("1", "Song", "Artist", "/a/Song.mp3").with_file_size(5_000_000);
        let b = track("2", "Song", "Other", "/b/Song.mp3").with_file_size(1_000);
        let breakdown =
            scorer().score_detailed(&(&a).into(), &(&b).into(), &ScoreWeights::relocation());

        assert!(breakdown.contributed(Signal::Title));
        assert!(breakdown.contributed(Signal::Path));
        assert!(!breakdown.contributed(Signal::Size));
        assert!(!breakdown.contributed(Signal::Duration));
    }

    #[test]
    fn test_weighted_scorer_implements_pair_scorer() {
        let a = track("1", "Song", "Artist", "/a/Song.mp3");
        let b = track("2", "Song", "Artist", "/b/Song.mp3");
        let pair = scorer().with_weights(ScoreWeights::duplicate());
        assert!((pair.score_pair(&a, &b) - 1.0).abs() < 1e-9);
    }
}
