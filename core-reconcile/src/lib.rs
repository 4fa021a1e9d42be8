//! # Reconciliation Engine
//!
//! Finds and repairs inconsistencies in a merged music library.
//!
//! ## Overview
//!
//! Every component works against a `LibraryIndex` from `core-library`:
//! detectors take a shared reference and return plain result records that
//! refer to tracks by id, resolvers take a mutable reference and re-read the
//! current track before changing it.
//!
//! ## Components
//!
//! - **Confidence Scorer** (`scorer`): Weighted similarity between two records
//! - **Duplicate Detector** (`duplicates`): Groups likely duplicates by connected components
//! - **Resolver** (`resolver`): Merges duplicate groups and rewrites playlist references
//! - **Relocation Matcher** (`relocation`): Finds and ranks new locations for missing files
//! - **Batch Runner** (`batch`, `job`): Cancellable, progress-reporting batch execution
//! - **Cloud Sync Analyzer** (`cloud_sync`): Checks recorded cloud paths against sync folders
//! - **Ownership Resolver** (`ownership`): Settles tracks claimed by several computers
//!
//! ## Usage
//!
//! ```ignore
//! use core_reconcile::{DuplicateDetector, DuplicateOptions, ReconcileConfig};
//!
//! let config = ReconcileConfig::default();
//! let detector = DuplicateDetector::from_config(&config);
//! let groups = detector.find_duplicates(&index, &DuplicateOptions::default())?;
//! ```

pub mod batch;
pub mod cloud_sync;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod job;
pub mod ownership;
mod paths;
pub mod relocation;
pub mod resolver;
pub mod scorer;

pub use batch::{
    BatchContext, BatchItem, BatchOperationRunner, BatchResult, ItemFailure, ItemSuccess,
};
pub use cloud_sync::{
    CloudFixApplied, CloudFixStrategy, CloudProvider, CloudRoot, CloudSyncAnalyzer,
    CloudSyncIssue, CloudSyncIssueKind,
};
pub use config::{
    ConfidenceLevel, ReconcileConfig, ScoreWeights, ScoringConfig, ThresholdSpec, Thresholds,
};
pub use duplicates::{DuplicateDetector, DuplicateGroup, DuplicateOptions, PairScore};
pub use error::{ReconcileError, Result};
pub use job::{BatchProgress, OperationId, OperationKind, OperationStatus};
pub use ownership::{
    LibraryOwnershipUpdate, OwnershipChange, OwnershipFix, OwnershipIssue, OwnershipResolver,
};
pub use relocation::{
    AutoRelocateDecision, AutoRelocateOutcome, Evidence, RelocationCandidate, RelocationMatcher,
    RelocationOptions, RelocationRequest,
};
pub use resolver::{
    AppliedMerge, DuplicateResolution, FailedResolution, MergePlan, ResolutionPolicy,
    ResolutionSummary, Resolver,
};
pub use scorer::{CandidateFile, ConfidenceScorer, MatchSubject, PairScorer, ScoreBreakdown};
