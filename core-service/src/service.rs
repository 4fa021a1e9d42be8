//! # Reconcile Service
//!
//! Request/response surface of the reconciliation engine.
//!
//! ## Overview
//!
//! `ReconcileService` owns the session state:
//! - the [`LibraryIndex`] behind a `tokio::sync::RwLock`
//! - the duplicate groups from the latest detection, kept for resolution
//! - the [`BatchOperationRunner`] registry of in-flight batches
//! - the [`EventBus`] that carries lifecycle and mutation events
//!
//! Detectors take a read guard. Every mutation takes the write guard for a
//! single item's change and releases it before the next item, so polling and
//! cancellation stay responsive during long batches.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_service::{AutoRelocateOptions, ReconcileService};
//! use futures::StreamExt;
//!
//! let service = ReconcileService::new(core_config, ReconcileConfig::default())?;
//! service.load_library(library).await?;
//!
//! let missing = service.find_missing_tracks(&service.library_snapshot().await.tracks).await;
//! let mut handle = service
//!     .auto_relocate_tracks(missing, AutoRelocateOptions::default(), Some("/Music/Library.xml"))
//!     .await?;
//!
//! while let Some(progress) = handle.progress.next().await {
//!     println!("{}/{}", progress.processed, progress.total);
//! }
//! let result = handle.outcome.await??;
//! let library = service.export_library().await;
//! ```

use crate::error::Result;
use crate::progress::{AutoRelocateHandle, ProgressSender, ProgressStream};
use bridge_traits::FileSystemProbe;
use core_library::{Computer, ComputerId, Library, LibraryIndex, Track, TrackId};
use core_reconcile::relocation::search_roots;
use core_reconcile::{
    AutoRelocateDecision, AutoRelocateOutcome, BatchContext, BatchItem, BatchOperationRunner,
    BatchProgress, BatchResult, CandidateFile, CloudFixApplied, CloudFixStrategy,
    CloudSyncAnalyzer, CloudSyncIssue, DuplicateDetector, DuplicateGroup, DuplicateOptions,
    DuplicateResolution, LibraryOwnershipUpdate, OperationId, OperationKind, OwnershipChange,
    OwnershipFix, OwnershipIssue, OwnershipResolver, ReconcileConfig, RelocationCandidate,
    RelocationMatcher, RelocationOptions, RelocationRequest, ResolutionSummary, Resolver,
    ThresholdSpec,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, EventStream, LibraryEvent, ReconcileEvent};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

/// Options for an auto-relocate batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRelocateOptions {
    /// Falls back to the configured auto-relocate threshold
    pub auto_threshold: Option<ThresholdSpec>,
    pub search_paths: Vec<String>,
    /// Falls back to a fresh random id
    pub operation_id: Option<OperationId>,
}

impl AutoRelocateOptions {
    pub fn with_threshold(mut self, threshold: impl Into<ThresholdSpec>) -> Self {
        self.auto_threshold = Some(threshold.into());
        self
    }

    pub fn with_search_path(mut self, path: impl Into<String>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_operation_id(mut self, operation_id: OperationId) -> Self {
        self.operation_id = Some(operation_id);
        self
    }
}

/// Primary facade exposed to host applications.
#[derive(Clone)]
pub struct ReconcileService {
    config: ReconcileConfig,
    file_system: Arc<dyn FileSystemProbe>,
    event_bus: EventBus,
    index: Arc<RwLock<LibraryIndex>>,
    duplicate_groups: Arc<RwLock<Vec<DuplicateGroup>>>,
    detector: DuplicateDetector,
    resolver: Resolver,
    matcher: RelocationMatcher,
    cloud_sync: CloudSyncAnalyzer,
    ownership: OwnershipResolver,
    runner: BatchOperationRunner,
}

impl std::fmt::Debug for ReconcileService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcileService")
            .field("config", &self.config)
            .field("event_bus", &self.event_bus)
            .field("active_operations", &self.runner.active_operations())
            .finish()
    }
}

impl ReconcileService {
    /// Create a service with an empty library.
    ///
    /// # Errors
    ///
    /// Fails if either configuration does not validate.
    pub fn new(core_config: CoreConfig, config: ReconcileConfig) -> Result<Self> {
        core_config.validate()?;
        config.validate()?;

        let cloud_sync = CloudSyncAnalyzer::from_config(&config)?;

        info!(
            cloud_roots = config.cloud_roots.len(),
            event_buffer_size = core_config.event_buffer_size,
            "Reconcile service initialized"
        );

        Ok(Self {
            detector: DuplicateDetector::from_config(&config),
            resolver: Resolver::new(),
            matcher: RelocationMatcher::from_config(&config),
            cloud_sync,
            ownership: OwnershipResolver::new(),
            runner: BatchOperationRunner::new(core_config.clock.clone()),
            event_bus: EventBus::new(core_config.event_buffer_size),
            file_system: core_config.file_system,
            index: Arc::new(RwLock::new(LibraryIndex::default())),
            duplicate_groups: Arc::new(RwLock::new(Vec::new())),
            config,
        })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    fn emit(&self, event: CoreEvent) {
        self.event_bus.emit(event).ok();
    }

    // ===== Session =====

    /// Replace the session library with `library`.
    ///
    /// Remembered duplicate groups are discarded.
    #[instrument(skip(self, library), fields(tracks = library.tracks.len()))]
    pub async fn load_library(&self, library: Library) -> Result<()> {
        let index = LibraryIndex::build(library)?;
        let event = LibraryEvent::LibraryLoaded {
            track_count: index.len() as u64,
            playlist_count: index.playlists().len() as u64,
            computer_count: index.computers().len() as u64,
        };

        *self.index.write().await = index;
        self.duplicate_groups.write().await.clear();

        info!("Library loaded");
        self.emit(CoreEvent::Library(event));
        Ok(())
    }

    /// Hand the reconciled library back and reset the session to empty.
    pub async fn export_library(&self) -> Library {
        let index = std::mem::take(&mut *self.index.write().await);
        self.duplicate_groups.write().await.clear();
        info!(tracks = index.len(), "Library exported");
        index.into_library()
    }

    /// Copy of the current library, leaving the session untouched.
    pub async fn library_snapshot(&self) -> Library {
        self.index.read().await.to_library()
    }

    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    // ===== Duplicates =====

    /// Detect duplicate groups in the session library.
    ///
    /// The groups are remembered for [`resolve_duplicates`](Self::resolve_duplicates).
    #[instrument(skip(self, options))]
    pub async fn find_duplicates(&self, options: DuplicateOptions) -> Result<Vec<DuplicateGroup>> {
        let groups = {
            let index = self.index.read().await;
            self.detector.find_duplicates(&index, &options)?
        };

        info!(groups = groups.len(), "Duplicate detection finished");
        *self.duplicate_groups.write().await = groups.clone();
        Ok(groups)
    }

    /// Resolve remembered duplicate groups.
    ///
    /// Each resolution is applied on its own; failures are collected in the
    /// summary. Resolved groups are forgotten.
    #[instrument(skip(self, resolutions), fields(resolutions = resolutions.len()))]
    pub async fn resolve_duplicates(
        &self,
        resolutions: Vec<DuplicateResolution>,
    ) -> ResolutionSummary {
        let mut summary = ResolutionSummary::default();

        for resolution in &resolutions {
            let outcome = {
                let mut index = self.index.write().await;
                let mut groups = self.duplicate_groups.write().await;
                let outcome =
                    self.resolver
                        .resolve(&mut index, &groups, std::slice::from_ref(resolution));
                groups.retain(|g| !outcome.applied.iter().any(|a| a.group_id == g.id));
                outcome
            };

            for applied in &outcome.applied {
                self.emit(CoreEvent::Library(LibraryEvent::TracksMerged {
                    survivor_id: applied.survivor_id.to_string(),
                    removed_ids: applied.removed_ids.iter().map(|id| id.to_string()).collect(),
                    playlists_updated: applied
                        .playlists_updated
                        .iter()
                        .map(|id| id.to_string())
                        .collect(),
                }));
            }

            summary.applied.extend(outcome.applied);
            summary.failed.extend(outcome.failed);
        }

        summary
    }

    // ===== Relocation =====

    pub async fn find_missing_tracks(&self, tracks: &[Track]) -> Vec<Track> {
        self.matcher
            .find_missing_tracks(tracks, self.file_system.as_ref())
            .await
    }

    /// Ranked relocation candidates for one track.
    #[instrument(skip(self, track, options), fields(track_id = %track.id))]
    pub async fn find_relocation_candidates(
        &self,
        track: &Track,
        options: &RelocationOptions,
    ) -> Result<Vec<RelocationCandidate>> {
        if let Some(weights) = &options.weights {
            weights.validate()?;
        }

        let files = self
            .matcher
            .collect_candidates(&options.search_paths, self.file_system.as_ref())
            .await;
        Ok(self
            .matcher
            .find_relocation_candidates(track, &files, options.weights.as_ref()))
    }

    /// Apply an explicit relocation.
    ///
    /// # Errors
    ///
    /// `Conflict` when the track no longer sits at `old_location`,
    /// `Relocation` when the new path does not exist.
    #[instrument(skip(self, track_id, old_location, new_location), fields(track_id = %track_id))]
    pub async fn relocate_track(
        &self,
        track_id: TrackId,
        old_location: String,
        new_location: String,
    ) -> Result<()> {
        let request = RelocationRequest {
            track_id,
            old_location,
            new_location,
        };
        self.relocate(&request).await?;
        Ok(())
    }

    pub async fn batch_relocate_tracks(
        &self,
        relocations: Vec<RelocationRequest>,
        operation_id: Option<OperationId>,
    ) -> Result<BatchResult<()>> {
        let context = self.begin_batch(
            OperationKind::BatchRelocate,
            operation_id.unwrap_or_default(),
            relocations.len(),
        )?;
        self.execute_batch(
            context,
            relocations,
            move |request: RelocationRequest| async move { self.relocate(&request).await },
            None,
        )
        .await
    }

    /// Start relocating `tracks` in the background.
    ///
    /// The folder holding `library_path` is searched along with the explicit
    /// search paths. The top candidate of each track is applied when it
    /// reaches the threshold; otherwise the ranked list is returned for
    /// review.
    #[instrument(skip(self, tracks, options), fields(tracks = tracks.len()))]
    pub async fn auto_relocate_tracks(
        &self,
        tracks: Vec<Track>,
        options: AutoRelocateOptions,
        library_path: Option<&str>,
    ) -> Result<AutoRelocateHandle> {
        let threshold = options
            .auto_threshold
            .unwrap_or(self.config.auto_relocate_threshold)
            .resolve(&self.config.scoring.thresholds)?;
        let roots = search_roots(&options.search_paths, library_path);
        let operation_id = options.operation_id.unwrap_or_default();

        let context =
            self.begin_batch(OperationKind::AutoRelocate, operation_id.clone(), tracks.len())?;
        let (progress_tx, progress) = ProgressStream::channel();

        let service = self.clone();
        let outcome = tokio::spawn(async move {
            service
                .run_auto_relocate(context, tracks, roots, threshold, progress_tx)
                .await
        });

        Ok(AutoRelocateHandle {
            operation_id,
            progress,
            outcome,
        })
    }

    /// Stop a running batch at its next item boundary.
    ///
    /// Works for any batch started by this service, not only auto-relocate.
    pub fn cancel_auto_relocate(&self, operation_id: &OperationId) -> Result<()> {
        self.runner.cancel(operation_id)?;
        Ok(())
    }

    pub fn operation_progress(&self, operation_id: &OperationId) -> Option<BatchProgress> {
        self.runner.progress(operation_id)
    }

    pub fn active_operations(&self) -> Vec<OperationId> {
        self.runner.active_operations()
    }

    async fn run_auto_relocate(
        &self,
        context: BatchContext,
        tracks: Vec<Track>,
        roots: Vec<String>,
        threshold: f64,
        progress_tx: ProgressSender,
    ) -> Result<BatchResult<AutoRelocateOutcome>> {
        let files = self
            .matcher
            .collect_candidates(&roots, self.file_system.as_ref())
            .await;
        let files = &files;

        self.execute_batch(
            context,
            tracks,
            move |track: Track| async move {
                self.auto_relocate_one(track, files, threshold).await
            },
            Some(progress_tx),
        )
        .await
    }

    async fn auto_relocate_one(
        &self,
        track: Track,
        files: &[CandidateFile],
        threshold: f64,
    ) -> core_reconcile::Result<AutoRelocateOutcome> {
        let ranked = self.matcher.find_relocation_candidates(&track, files, None);

        match RelocationMatcher::decide(ranked, threshold) {
            AutoRelocateDecision::Apply(candidate) => {
                let request = RelocationRequest::new(
                    track.id.clone(),
                    track.location.clone(),
                    candidate.candidate_path.clone(),
                );
                self.relocate(&request).await?;
                Ok(AutoRelocateOutcome::Relocated { candidate })
            }
            AutoRelocateDecision::NeedsReview(candidates) => {
                debug!(
                    track_id = %track.id,
                    candidates = candidates.len(),
                    "Track needs manual review"
                );
                Ok(AutoRelocateOutcome::NeedsReview { candidates })
            }
        }
    }

    async fn relocate(&self, request: &RelocationRequest) -> core_reconcile::Result<()> {
        self.matcher
            .verify_target(request, self.file_system.as_ref())
            .await?;

        let previous = {
            let mut index = self.index.write().await;
            self.matcher.apply_relocation(&mut index, request)?
        };

        self.emit(CoreEvent::Library(LibraryEvent::TrackRelocated {
            track_id: request.track_id.to_string(),
            old_location: previous,
            new_location: request.new_location.clone(),
        }));
        Ok(())
    }

    // ===== Cloud Sync =====

    pub fn detect_cloud_sync_issues(&self, tracks: &[Track]) -> Vec<CloudSyncIssue> {
        self.cloud_sync.detect(tracks)
    }

    #[instrument(skip(self, issue), fields(track_id = %issue.track_id))]
    pub async fn fix_cloud_sync_issue(
        &self,
        issue: &CloudSyncIssue,
        strategy: CloudFixStrategy,
    ) -> Result<CloudFixApplied> {
        Ok(self.fix_cloud_issue(issue, strategy).await?)
    }

    pub async fn batch_fix_cloud_sync_issues(
        &self,
        issues: Vec<CloudSyncIssue>,
        strategy: CloudFixStrategy,
        operation_id: Option<OperationId>,
    ) -> Result<BatchResult<CloudFixApplied>> {
        let context = self.begin_batch(
            OperationKind::CloudSyncFix,
            operation_id.unwrap_or_default(),
            issues.len(),
        )?;
        self.execute_batch(
            context,
            issues,
            move |issue: CloudSyncIssue| async move {
                self.fix_cloud_issue(&issue, strategy).await
            },
            None,
        )
        .await
    }

    async fn fix_cloud_issue(
        &self,
        issue: &CloudSyncIssue,
        strategy: CloudFixStrategy,
    ) -> core_reconcile::Result<CloudFixApplied> {
        let applied = {
            let mut index = self.index.write().await;
            self.cloud_sync.fix(&mut index, issue, strategy)?
        };

        self.emit(CoreEvent::Library(LibraryEvent::CloudPathUpdated {
            track_id: applied.track_id.to_string(),
            cloud_path: applied.cloud_path.clone(),
            location: applied.location.clone(),
        }));
        Ok(applied)
    }

    // ===== Ownership =====

    pub async fn detect_ownership_issues(
        &self,
        tracks: &[Track],
        computers: &[Computer],
    ) -> Vec<OwnershipIssue> {
        let index = self.index.read().await;
        self.ownership.detect(tracks, computers, &index)
    }

    /// Assign the suggested owner, or `owner_override` when given.
    #[instrument(skip(self, issue), fields(track_id = %issue.track_id))]
    pub async fn fix_track_ownership(
        &self,
        issue: &OwnershipIssue,
        owner_override: Option<ComputerId>,
    ) -> Result<OwnershipChange> {
        Ok(self.fix_ownership(issue, owner_override.as_ref()).await?)
    }

    pub async fn batch_fix_ownership(
        &self,
        issues: Vec<OwnershipIssue>,
        operation_id: Option<OperationId>,
    ) -> Result<BatchResult<OwnershipChange>> {
        let context = self.begin_batch(
            OperationKind::OwnershipFix,
            operation_id.unwrap_or_default(),
            issues.len(),
        )?;
        self.execute_batch(
            context,
            issues,
            move |issue: OwnershipIssue| async move { self.fix_ownership(&issue, None).await },
            None,
        )
        .await
    }

    /// Apply ownership fixes to a standalone library, outside the session.
    pub fn update_library_ownership(
        &self,
        library: Library,
        fixes: &[OwnershipFix],
    ) -> Result<LibraryOwnershipUpdate> {
        Ok(self.ownership.update_library_ownership(library, fixes)?)
    }

    async fn fix_ownership(
        &self,
        issue: &OwnershipIssue,
        owner_override: Option<&ComputerId>,
    ) -> core_reconcile::Result<OwnershipChange> {
        let change = {
            let mut index = self.index.write().await;
            self.ownership.fix(&mut index, issue, owner_override)?
        };

        self.emit(CoreEvent::Library(LibraryEvent::TrackOwnerChanged {
            track_id: change.track_id.to_string(),
            previous_owner_id: change.previous_owner_id.as_ref().map(|id| id.to_string()),
            owner_id: change.owner_id.to_string(),
        }));
        Ok(change)
    }

    // ===== Batch plumbing =====

    fn begin_batch(
        &self,
        kind: OperationKind,
        operation_id: OperationId,
        total: usize,
    ) -> Result<BatchContext> {
        let context = self.runner.begin(operation_id)?;

        info!(operation_id = %context.operation_id(), %kind, total, "Batch operation started");
        self.emit(CoreEvent::Reconcile(ReconcileEvent::Started {
            operation_id: context.operation_id().to_string(),
            kind: kind.to_string(),
            total: total as u64,
        }));
        Ok(context)
    }

    /// Run a registered batch, mirroring its progress into the event bus and,
    /// when given, a progress stream. With a stream attached the next item
    /// waits until the consumer has taken the current record.
    async fn execute_batch<I, O, F, Fut>(
        &self,
        context: BatchContext,
        items: Vec<I>,
        process: F,
        progress_tx: Option<ProgressSender>,
    ) -> Result<BatchResult<O>>
    where
        I: BatchItem,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = core_reconcile::Result<O>>,
    {
        let operation_id = context.operation_id().to_string();
        let token = context.cancellation_token();

        let on_progress = |progress: &BatchProgress| {
            self.emit(CoreEvent::Reconcile(ReconcileEvent::Progress {
                operation_id: progress.operation_id.to_string(),
                processed: progress.processed,
                total: progress.total,
                current_item_id: progress.current_item_id.clone(),
                percent: progress.percent,
            }));
            let delivery = progress_tx
                .clone()
                .map(|tx| (tx, progress.clone(), token.clone()));
            async move {
                if let Some((tx, progress, token)) = delivery {
                    tx.deliver(progress, token).await;
                }
            }
        };

        match self.runner.execute(context, items, process, on_progress).await {
            Ok(result) => {
                let event = if result.is_cancelled() {
                    ReconcileEvent::Cancelled {
                        operation_id,
                        processed: result.processed_count() as u64,
                        not_started: result.not_started_count() as u64,
                    }
                } else {
                    ReconcileEvent::Completed {
                        operation_id,
                        succeeded: result.succeeded_count() as u64,
                        failed: result.failed_count() as u64,
                        duration_ms: result.duration_ms(),
                    }
                };
                if result.failed_count() > 0 {
                    warn!(failed = result.failed_count(), "Batch finished with failures");
                }
                self.emit(CoreEvent::Reconcile(event));
                Ok(result)
            }
            Err(e) => {
                error!(operation_id = %operation_id, error = %e, "Batch operation failed");
                self.emit(CoreEvent::Reconcile(ReconcileEvent::Failed {
                    operation_id,
                    message: e.to_string(),
                }));
                Err(e.into())
            }
        }
    }
}
