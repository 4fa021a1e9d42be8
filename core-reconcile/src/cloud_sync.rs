//! # Cloud Sync Reconciliation
//!
//! Detects catalog entries whose recorded cloud path disagrees with where the
//! file actually sits inside a cloud-synced folder.
//!
//! ## Overview
//!
//! Each configured [`CloudRoot`] maps a local folder to a provider. A track
//! located under a root has an expected provider-relative path
//! (`/<path below the root>`). Comparing that with the recorded `cloud_path`
//! gives three kinds of issue:
//!
//! - **MissingCloudPath**: under a root, nothing recorded
//! - **PathMismatch**: under a root, recorded path differs
//! - **OrphanedCloudEntry**: a path is recorded but the track is under no root
//!
//! Root matching is separator-aware and case-insensitive, and the deepest
//! matching root wins when roots are nested.

use crate::batch::BatchItem;
use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, Result};
use crate::paths;
use core_library::{LibraryIndex, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudProvider {
    Dropbox,
    GoogleDrive,
    OneDrive,
    #[serde(rename = "icloud_drive")]
    ICloudDrive,
    Other(String),
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloudProvider::Dropbox => f.write_str("Dropbox"),
            CloudProvider::GoogleDrive => f.write_str("Google Drive"),
            CloudProvider::OneDrive => f.write_str("OneDrive"),
            CloudProvider::ICloudDrive => f.write_str("iCloud Drive"),
            CloudProvider::Other(name) => f.write_str(name),
        }
    }
}

/// Local folder kept in sync by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudRoot {
    pub provider: CloudProvider,
    pub local_root: String,
}

impl CloudRoot {
    pub fn new(provider: CloudProvider, local_root: impl Into<String>) -> Self {
        Self {
            provider,
            local_root: local_root.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if paths::components(&self.local_root).is_empty() {
            return Err(ReconcileError::Config(format!(
                "Cloud root for {} must name a folder",
                self.provider
            )));
        }
        Ok(())
    }

    /// Local path for a provider-relative path under this root.
    fn local_path_for(&self, cloud_path: &str) -> String {
        let separator = paths::separator_of(&self.local_root).to_string();
        let root = self
            .local_root
            .trim_end_matches(|c: char| c == '/' || c == '\\');
        let relative = paths::components(cloud_path).join(separator.as_str());
        format!("{}{}{}", root, separator, relative)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudSyncIssueKind {
    PathMismatch,
    MissingCloudPath,
    OrphanedCloudEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSyncIssue {
    pub track_id: TrackId,
    pub kind: CloudSyncIssueKind,
    /// Derived from the location; `None` for orphaned entries
    pub expected_path: Option<String>,
    /// Recorded at detection time
    pub actual_path: Option<String>,
    pub provider: Option<CloudProvider>,
    pub sync_root: Option<String>,
}

impl BatchItem for CloudSyncIssue {
    fn item_id(&self) -> String {
        self.track_id.to_string()
    }
}

/// How to settle a disagreement between location and cloud path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudFixStrategy {
    /// Rewrite the cloud path from the location
    #[default]
    TrustLocation,
    /// Rewrite the location from the cloud path (path mismatches only)
    TrustCloudPath,
}

/// State of a track after a cloud fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudFixApplied {
    pub track_id: TrackId,
    pub cloud_path: Option<String>,
    pub location: String,
}

#[derive(Debug, Clone, Default)]
pub struct CloudSyncAnalyzer {
    roots: Vec<CloudRoot>,
}

impl CloudSyncAnalyzer {
    pub fn new(roots: Vec<CloudRoot>) -> Result<Self> {
        for root in &roots {
            root.validate()?;
        }
        Ok(Self { roots })
    }

    pub fn from_config(config: &ReconcileConfig) -> Result<Self> {
        Self::new(config.cloud_roots.clone())
    }

    pub fn roots(&self) -> &[CloudRoot] {
        &self.roots
    }

    /// Deepest root containing `location`, with the path below it.
    fn match_root<'a>(&'a self, location: &str) -> Option<(&'a CloudRoot, String)> {
        self.roots
            .iter()
            .filter_map(|root| {
                paths::relative_to(location, &root.local_root).map(|relative| {
                    let depth = paths::depth(&root.local_root);
                    (root, depth, paths::to_cloud_path(&relative))
                })
            })
            .max_by_key(|(_, depth, _)| *depth)
            .map(|(root, _, expected)| (root, expected))
    }

    /// Issue for a single track, if any.
    pub fn check(&self, track: &Track) -> Option<CloudSyncIssue> {
        let recorded = track
            .cloud_path
            .as_deref()
            .filter(|p| !p.trim().is_empty());

        let issue = |kind, expected: Option<String>, root: Option<&CloudRoot>| CloudSyncIssue {
            track_id: track.id.clone(),
            kind,
            expected_path: expected,
            actual_path: track.cloud_path.clone(),
            provider: root.map(|r| r.provider.clone()),
            sync_root: root.map(|r| r.local_root.clone()),
        };

        match (self.match_root(&track.location), recorded) {
            (Some((root, expected)), None) => {
                Some(issue(CloudSyncIssueKind::MissingCloudPath, Some(expected), Some(root)))
            }
            (Some((root, expected)), Some(actual))
                if !paths::cloud_paths_equal(&expected, actual) =>
            {
                Some(issue(CloudSyncIssueKind::PathMismatch, Some(expected), Some(root)))
            }
            (Some(_), Some(_)) => None,
            (None, Some(_)) => Some(issue(CloudSyncIssueKind::OrphanedCloudEntry, None, None)),
            (None, None) => None,
        }
    }

    pub fn detect(&self, tracks: &[Track]) -> Vec<CloudSyncIssue> {
        let issues: Vec<_> = tracks.iter().filter_map(|t| self.check(t)).collect();
        info!(
            tracks = tracks.len(),
            issues = issues.len(),
            "Cloud sync analysis finished"
        );
        issues
    }

    /// Apply the fix for one issue.
    ///
    /// # Errors
    ///
    /// `Conflict` when the track's cloud path or location changed since
    /// detection (a location change alters the expected path),
    /// `InvalidInput` when `TrustCloudPath` is used on anything but a path
    /// mismatch.
    pub fn fix(
        &self,
        index: &mut LibraryIndex,
        issue: &CloudSyncIssue,
        strategy: CloudFixStrategy,
    ) -> Result<CloudFixApplied> {
        let track = index
            .get(&issue.track_id)
            .ok_or_else(|| ReconcileError::track_not_found(&issue.track_id))?;

        let unchanged = match (&track.cloud_path, &issue.actual_path) {
            (Some(current), Some(recorded)) => paths::cloud_paths_equal(current, recorded),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            return Err(ReconcileError::conflict(
                &issue.track_id,
                "cloud path changed since the issue was detected",
            ));
        }

        // The location may have moved too; the expected path is derived from it.
        let still_expected = self
            .check(track)
            .is_some_and(|current| current.expected_path == issue.expected_path);
        if !still_expected {
            return Err(ReconcileError::conflict(
                &issue.track_id,
                "track location changed since the issue was detected",
            ));
        }

        match strategy {
            CloudFixStrategy::TrustLocation => {
                index.set_cloud_path(&issue.track_id, issue.expected_path.clone())?;
            }
            CloudFixStrategy::TrustCloudPath => {
                let (Some(actual), Some(root_path)) = (&issue.actual_path, &issue.sync_root) else {
                    return Err(ReconcileError::invalid_input(
                        "strategy",
                        "only path mismatches can be fixed from the cloud path",
                    ));
                };
                if issue.kind != CloudSyncIssueKind::PathMismatch {
                    return Err(ReconcileError::invalid_input(
                        "strategy",
                        "only path mismatches can be fixed from the cloud path",
                    ));
                }
                let root = self
                    .roots
                    .iter()
                    .find(|r| &r.local_root == root_path)
                    .ok_or_else(|| {
                        ReconcileError::invalid_input(
                            "sync_root",
                            format!("{} is not a configured cloud root", root_path),
                        )
                    })?;
                let location = root.local_path_for(actual);
                index.set_location(&issue.track_id, location)?;
            }
        }

        let track = index
            .get(&issue.track_id)
            .ok_or_else(|| ReconcileError::track_not_found(&issue.track_id))?;

        debug!(track_id = %issue.track_id, kind = ?issue.kind, ?strategy, "Cloud sync issue fixed");

        Ok(CloudFixApplied {
            track_id: track.id.clone(),
            cloud_path: track.cloud_path.clone(),
            location: track.location.clone(),
        })
    }
}
