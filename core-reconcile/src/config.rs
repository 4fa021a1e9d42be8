//! # Reconciliation Configuration
//!
//! Weights, thresholds, and tolerances used by the matching engines.
//!
//! ## Overview
//!
//! Every numeric knob of the engine lives here rather than as a constant in
//! the matchers. The defaults are a baseline tuned for typical personal
//! libraries; hosts may persist a tuned `ReconcileConfig` (it round-trips
//! through serde, and missing fields fall back to the defaults).
//!
//! ## Usage
//!
//! ```ignore
//! use core_reconcile::config::{ReconcileConfig, ThresholdSpec, ConfidenceLevel};
//!
//! let config = ReconcileConfig::default()
//!     .with_max_relocation_candidates(5)
//!     .with_auto_relocate_threshold(ThresholdSpec::Level(ConfidenceLevel::Exact));
//! config.validate()?;
//! ```

use crate::cloud_sync::CloudRoot;
use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Score Weights
// =============================================================================

/// Relative weight of each matching signal.
///
/// Weights do not need to sum to one; the scorer renormalizes over the signals
/// that are present on both sides of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub title: f64,
    pub artist: f64,
    pub album: f64,
    pub duration: f64,
    pub size: f64,
    pub path: f64,
}

impl ScoreWeights {
    /// Weights for comparing two catalog entries.
    pub fn duplicate() -> Self {
        Self {
            title: 0.3,
            artist: 0.3,
            album: 0.0,
            duration: 0.15,
            size: 0.15,
            path: 0.1,
        }
    }

    /// Weights for comparing a catalog entry against a file on disk, where the
    /// filename carries most of the evidence.
    pub fn relocation() -> Self {
        Self {
            title: 0.15,
            artist: 0.1,
            album: 0.05,
            duration: 0.15,
            size: 0.15,
            path: 0.4,
        }
    }

    pub fn total(&self) -> f64 {
        self.title + self.artist + self.album + self.duration + self.size + self.path
    }

    pub fn validate(&self) -> Result<()> {
        let all = [
            ("title", self.title),
            ("artist", self.artist),
            ("album", self.album),
            ("duration", self.duration),
            ("size", self.size),
            ("path", self.path),
        ];

        for (name, weight) in all {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ReconcileError::Config(format!(
                    "Weight for {} must be a non-negative number, got {}",
                    name, weight
                )));
            }
        }

        if self.total() <= 0.0 {
            return Err(ReconcileError::Config(
                "At least one weight must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self::duplicate()
    }
}

// =============================================================================
// Confidence Levels & Thresholds
// =============================================================================

/// Named confidence bands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    Exact,
}

impl ConfidenceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Medium => "medium",
            ConfidenceLevel::High => "high",
            ConfidenceLevel::Exact => "exact",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower bounds of the confidence bands
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub exact: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            exact: 0.95,
            high: 0.80,
            medium: 0.60,
        }
    }
}

impl Thresholds {
    /// Band a score falls into.
    pub fn classify(&self, score: f64) -> ConfidenceLevel {
        if score >= self.exact {
            ConfidenceLevel::Exact
        } else if score >= self.high {
            ConfidenceLevel::High
        } else if score >= self.medium {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }

    /// Minimum score of a band.
    pub fn value(&self, level: ConfidenceLevel) -> f64 {
        match level {
            ConfidenceLevel::Exact => self.exact,
            ConfidenceLevel::High => self.high,
            ConfidenceLevel::Medium => self.medium,
            ConfidenceLevel::Low => 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("exact", self.exact), ("high", self.high), ("medium", self.medium)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReconcileError::Config(format!(
                    "Threshold {} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if !(self.medium <= self.high && self.high <= self.exact) {
            return Err(ReconcileError::Config(
                "Thresholds must satisfy medium <= high <= exact".to_string(),
            ));
        }

        Ok(())
    }
}

/// A threshold given either as a named band or as an explicit score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdSpec {
    Level(ConfidenceLevel),
    Value(f64),
}

impl Default for ThresholdSpec {
    fn default() -> Self {
        ThresholdSpec::Level(ConfidenceLevel::High)
    }
}

impl ThresholdSpec {
    /// Resolve to a concrete minimum score.
    pub fn resolve(&self, thresholds: &Thresholds) -> Result<f64> {
        match *self {
            ThresholdSpec::Level(level) => Ok(thresholds.value(level)),
            ThresholdSpec::Value(value) if (0.0..=1.0).contains(&value) => Ok(value),
            ThresholdSpec::Value(value) => Err(ReconcileError::invalid_input(
                "threshold",
                format!("threshold must be within [0, 1], got {}", value),
            )),
        }
    }
}

impl From<ConfidenceLevel> for ThresholdSpec {
    fn from(level: ConfidenceLevel) -> Self {
        ThresholdSpec::Level(level)
    }
}

impl From<f64> for ThresholdSpec {
    fn from(value: f64) -> Self {
        ThresholdSpec::Value(value)
    }
}

// =============================================================================
// Scoring Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub thresholds: Thresholds,

    /// Duration difference at which the duration signal drops to zero
    pub duration_tolerance_seconds: f64,

    /// Size difference, as a percentage of the larger file, at which the size
    /// signal drops to zero
    pub size_tolerance_percent: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            duration_tolerance_seconds: 2.0,
            size_tolerance_percent: 2.0,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;

        if !self.duration_tolerance_seconds.is_finite() || self.duration_tolerance_seconds <= 0.0 {
            return Err(ReconcileError::Config(
                "Duration tolerance must be positive".to_string(),
            ));
        }

        if !self.size_tolerance_percent.is_finite() || self.size_tolerance_percent <= 0.0 {
            return Err(ReconcileError::Config(
                "Size tolerance must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Reconcile Configuration
// =============================================================================

/// Default audio file extensions considered during relocation searches.
pub const DEFAULT_AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "m4p", "aac", "alac", "flac", "wav", "aif", "aiff", "ogg", "oga", "opus", "wma",
];

pub const DEFAULT_MAX_RELOCATION_CANDIDATES: usize = 10;

/// Engine-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub scoring: ScoringConfig,

    /// Weights used when comparing catalog entries with each other
    pub duplicate_weights: ScoreWeights,

    /// Weights used when comparing a catalog entry with a file on disk
    pub relocation_weights: ScoreWeights,

    /// Ranked candidates kept per missing track
    pub max_relocation_candidates: usize,

    /// Gate for applying the top candidate without review
    pub auto_relocate_threshold: ThresholdSpec,

    /// Lowercase extensions (without the dot) treated as audio files
    pub audio_extensions: Vec<String>,

    /// Local folders kept in sync by a cloud provider
    pub cloud_roots: Vec<CloudRoot>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            duplicate_weights: ScoreWeights::duplicate(),
            relocation_weights: ScoreWeights::relocation(),
            max_relocation_candidates: DEFAULT_MAX_RELOCATION_CANDIDATES,
            auto_relocate_threshold: ThresholdSpec::default(),
            audio_extensions: DEFAULT_AUDIO_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
            cloud_roots: Vec::new(),
        }
    }
}

impl ReconcileConfig {
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_duplicate_weights(mut self, weights: ScoreWeights) -> Self {
        self.duplicate_weights = weights;
        self
    }

    pub fn with_relocation_weights(mut self, weights: ScoreWeights) -> Self {
        self.relocation_weights = weights;
        self
    }

    pub fn with_max_relocation_candidates(mut self, max: usize) -> Self {
        self.max_relocation_candidates = max;
        self
    }

    pub fn with_auto_relocate_threshold(mut self, threshold: impl Into<ThresholdSpec>) -> Self {
        self.auto_relocate_threshold = threshold.into();
        self
    }

    pub fn with_audio_extensions(mut self, extensions: Vec<String>) -> Self {
        self.audio_extensions = extensions;
        self
    }

    pub fn with_cloud_root(mut self, root: CloudRoot) -> Self {
        self.cloud_roots.push(root);
        self
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.scoring.validate()?;
        self.duplicate_weights.validate()?;
        self.relocation_weights.validate()?;

        if self.max_relocation_candidates == 0 {
            return Err(ReconcileError::Config(
                "max_relocation_candidates must be greater than 0".to_string(),
            ));
        }

        self.auto_relocate_threshold
            .resolve(&self.scoring.thresholds)
            .map_err(|e| ReconcileError::Config(e.to_string()))?;

        if self.audio_extensions.is_empty() {
            return Err(ReconcileError::Config(
                "At least one audio extension is required".to_string(),
            ));
        }

        for root in &self.cloud_roots {
            root.validate()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ReconcileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_relocation_candidates, 10);
        assert_eq!(config.scoring.duration_tolerance_seconds, 2.0);
    }

    #[test]
    fn test_weight_validation() {
        let mut weights = ScoreWeights::duplicate();
        weights.size = -0.1;
        assert!(weights.validate().is_err());

        let zero = ScoreWeights {
            title: 0.0,
            artist: 0.0,
            album: 0.0,
            duration: 0.0,
            size: 0.0,
            path: 0.0,
        };
        assert!(zero.validate().is_err());

        let mut nan = ScoreWeights::relocation();
        nan.path = f64::NAN;
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_threshold_classification() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.classify(0.97), ConfidenceLevel::Exact);
        assert_eq!(thresholds.classify(0.95), ConfidenceLevel::Exact);
        assert_eq!(thresholds.classify(0.80), ConfidenceLevel::High);
        assert_eq!(thresholds.classify(0.79), ConfidenceLevel::Medium);
        assert_eq!(thresholds.classify(0.2), ConfidenceLevel::Low);
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let thresholds = Thresholds {
            exact: 0.9,
            high: 0.95,
            medium: 0.6,
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_threshold_spec_resolution() {
        let thresholds = Thresholds::default();
        assert_eq!(ThresholdSpec::default().resolve(&thresholds).unwrap(), 0.80);
        assert_eq!(
            ThresholdSpec::from(ConfidenceLevel::Medium)
                .resolve(&thresholds)
                .unwrap(),
            0.60
        );
        assert_eq!(ThresholdSpec::Value(0.7).resolve(&thresholds).unwrap(), 0.7);
        assert!(ThresholdSpec::Value(1.5).resolve(&thresholds).is_err());
        assert!(ThresholdSpec::Value(f64::NAN).resolve(&thresholds).is_err());
    }

    #[test]
    fn test_threshold_spec_serde() {
        let level: ThresholdSpec = serde_json::from_str("\"exact\"").unwrap();
        assert_eq!(level, ThresholdSpec::Level(ConfidenceLevel::Exact));

        let value: ThresholdSpec = serde_json::from_str("0.75").unwrap();
        assert_eq!(value, ThresholdSpec::Value(0.75));
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: ReconcileConfig =
            serde_json::from_str(r#"{"max_relocation_candidates": 3}"#).unwrap();
        assert_eq!(config.max_relocation_candidates, 3);
        assert_eq!(config.duplicate_weights, ScoreWeights::duplicate());
        assert!(!config.audio_extensions.is_empty());
    }

    #[test]
    fn test_zero_candidates_rejected() {
        let config = ReconcileConfig::default().with_max_relocation_candidates(0);
        assert!(matches!(config.validate(), Err(ReconcileError::Config(_))));
    }
}
