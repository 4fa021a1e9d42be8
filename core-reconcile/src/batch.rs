//! # Batch Operation Runner
//!
//! Runs one logical operation over many items with progress reporting and
//! cooperative cancellation.
//!
//! ## Overview
//!
//! Every batch is registered under a caller-visible [`OperationId`]. While it
//! runs, the runner tracks its [`CancellationToken`], lifecycle status, and
//! latest progress, so other tasks can poll or cancel it by id. At most one
//! batch may be in flight per id.
//!
//! ## Workflow
//!
//! 1. [`BatchOperationRunner::begin`] registers the id and returns a
//!    [`BatchContext`]. Registering before spawning means a cancel request can
//!    never race ahead of the batch it targets.
//! 2. [`BatchOperationRunner::execute`] processes items in order. Before each
//!    item the token is checked; a cancelled batch stops at that boundary and
//!    reports the rest as not started. Items are never interrupted midway.
//! 3. After each item the runner awaits the future returned by the progress
//!    callback, then yields to the scheduler. The token is checked only after
//!    that future resolves, so a callback that waits for its consumer makes
//!    a cancel issued while handling a record land at the very next boundary.
//! 4. Dropping the context (normally at the end of `execute`) removes the
//!    registration.
//!
//! Per-item errors are recorded in the result and never abort the batch.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let runner = BatchOperationRunner::default();
//! let result = runner
//!     .run(OperationId::new(), tracks, |track| async move { relocate(track).await }, |p| {
//!         println!("{}/{}", p.processed, p.total);
//!         async {}
//!     })
//!     .await?;
//! println!("{} relocated, {} failed", result.succeeded_count(), result.failed_count());
//! ```

use crate::error::{ReconcileError, Result};
use crate::job::{BatchProgress, OperationId, OperationStatus};
use bridge_traits::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_library::Track;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Anything a batch can process; the id keys results and progress.
pub trait BatchItem {
    fn item_id(&self) -> String;
}

impl BatchItem for Track {
    fn item_id(&self) -> String {
        self.id.to_string()
    }
}

impl BatchItem for String {
    fn item_id(&self) -> String {
        self.clone()
    }
}

// ============================================================================
// Result Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSuccess<O> {
    pub item_id: String,
    pub output: O,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub reason: String,
}

/// Summary of a finished batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult<O> {
    pub operation_id: OperationId,
    /// `Completed` or `Cancelled`
    pub status: OperationStatus,
    pub total: u64,
    pub succeeded: Vec<ItemSuccess<O>>,
    pub failed: Vec<ItemFailure>,
    /// Items skipped because the batch was cancelled first
    pub not_started: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl<O> BatchResult<O> {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn not_started_count(&self) -> usize {
        self.not_started.len()
    }

    /// Items that were attempted, successfully or not.
    pub fn processed_count(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == OperationStatus::Cancelled
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

// ============================================================================
// Registry
// ============================================================================

struct ActiveOperation {
    token: CancellationToken,
    status: OperationStatus,
    progress: Option<BatchProgress>,
}

type Registry = Arc<Mutex<HashMap<OperationId, ActiveOperation>>>;

/// Registration of one in-flight batch.
///
/// Created by [`BatchOperationRunner::begin`]; the registration lives exactly
/// as long as this value.
pub struct BatchContext {
    operation_id: OperationId,
    token: CancellationToken,
    registry: Registry,
}

impl BatchContext {
    pub fn operation_id(&self) -> &OperationId {
        &self.operation_id
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn transition(&self, next: OperationStatus) -> Result<()> {
        let mut active = self.registry.lock();
        match active.get_mut(&self.operation_id) {
            Some(op) => op.status.transition(next),
            None => Err(ReconcileError::OperationNotFound {
                operation_id: self.operation_id.to_string(),
            }),
        }
    }

    fn publish(&self, progress: &BatchProgress) {
        if let Some(op) = self.registry.lock().get_mut(&self.operation_id) {
            op.progress = Some(progress.clone());
        }
    }
}

impl std::fmt::Debug for BatchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchContext")
            .field("operation_id", &self.operation_id)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl Drop for BatchContext {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.operation_id);
    }
}

// ============================================================================
// Runner
// ============================================================================

#[derive(Clone)]
pub struct BatchOperationRunner {
    active: Registry,
    clock: Arc<dyn Clock>,
}

impl Default for BatchOperationRunner {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl BatchOperationRunner {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            active: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Register a batch under `operation_id`.
    ///
    /// # Errors
    ///
    /// `OperationInProgress` if a batch with the same id is still registered.
    pub fn begin(&self, operation_id: OperationId) -> Result<BatchContext> {
        let mut active = self.active.lock();
        if active.contains_key(&operation_id) {
            return Err(ReconcileError::OperationInProgress {
                operation_id: operation_id.to_string(),
            });
        }

        let token = CancellationToken::new();
        active.insert(
            operation_id.clone(),
            ActiveOperation {
                token: token.clone(),
                status: OperationStatus::Pending,
                progress: None,
            },
        );

        debug!(operation_id = %operation_id, "Registered batch operation");

        Ok(BatchContext {
            operation_id,
            token,
            registry: self.active.clone(),
        })
    }

    /// Register and execute in one step.
    pub async fn run<I, O, F, Fut, P, PF>(
        &self,
        operation_id: OperationId,
        items: Vec<I>,
        process: F,
        on_progress: P,
    ) -> Result<BatchResult<O>>
    where
        I: BatchItem,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = Result<O>>,
        P: FnMut(&BatchProgress) -> PF,
        PF: Future<Output = ()>,
    {
        let context = self.begin(operation_id)?;
        self.execute(context, items, process, on_progress).await
    }

    /// Process `items` in order under a registered context.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if two items share an id; nothing is processed in that
    /// case. Per-item errors are collected into the result instead.
    #[instrument(skip_all, fields(operation_id = %context.operation_id(), total = items.len()))]
    pub async fn execute<I, O, F, Fut, P, PF>(
        &self,
        context: BatchContext,
        items: Vec<I>,
        mut process: F,
        mut on_progress: P,
    ) -> Result<BatchResult<O>>
    where
        I: BatchItem,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = Result<O>>,
        P: FnMut(&BatchProgress) -> PF,
        PF: Future<Output = ()>,
    {
        let ids: Vec<String> = items.iter().map(|item| item.item_id()).collect();
        let mut seen = HashSet::with_capacity(ids.len());
        if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            context.transition(OperationStatus::Failed)?;
            return Err(ReconcileError::InvalidInput {
                field: "items".to_string(),
                message: format!("duplicate item id {}", duplicate),
            });
        }

        context.transition(OperationStatus::Running)?;

        let operation_id = context.operation_id().clone();
        let total = items.len() as u64;
        let started_at = self.clock.now();
        let mut progress = BatchProgress::new(operation_id.clone(), total);
        context.publish(&progress);

        info!("Batch started");

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut not_started = Vec::new();

        for (position, item) in items.into_iter().enumerate() {
            if context.is_cancelled() {
                not_started.extend(ids[position..].iter().cloned());
                break;
            }

            let item_id = ids[position].clone();
            match process(item).await {
                Ok(output) => {
                    debug!(item_id = %item_id, "Item succeeded");
                    succeeded.push(ItemSuccess {
                        item_id: item_id.clone(),
                        output,
                    });
                }
                Err(e) => {
                    warn!(item_id = %item_id, error = %e, "Item failed");
                    failed.push(ItemFailure {
                        item_id: item_id.clone(),
                        reason: e.to_string(),
                    });
                }
            }

            progress.advance(item_id);
            context.publish(&progress);
            on_progress(&progress).await;

            tokio::task::yield_now().await;
        }

        let status = if not_started.is_empty() {
            OperationStatus::Completed
        } else {
            OperationStatus::Cancelled
        };
        if let Err(e) = context.transition(status) {
            warn!(error = %e, "Could not record final batch status");
        }

        let result = BatchResult {
            operation_id,
            status,
            total,
            succeeded,
            failed,
            not_started,
            started_at,
            finished_at: self.clock.now(),
        };

        info!(
            status = %result.status,
            succeeded = result.succeeded_count(),
            failed = result.failed_count(),
            not_started = result.not_started_count(),
            "Batch finished"
        );

        Ok(result)
    }

    /// Ask a running batch to stop at its next item boundary.
    ///
    /// # Errors
    ///
    /// `OperationNotFound` if no batch is registered under `operation_id`.
    pub fn cancel(&self, operation_id: &OperationId) -> Result<()> {
        let active = self.active.lock();
        match active.get(operation_id) {
            Some(op) => {
                op.token.cancel();
                info!(operation_id = %operation_id, "Cancellation requested");
                Ok(())
            }
            None => Err(ReconcileError::OperationNotFound {
                operation_id: operation_id.to_string(),
            }),
        }
    }

    /// Latest progress of a running batch.
    pub fn progress(&self, operation_id: &OperationId) -> Option<BatchProgress> {
        self.active
            .lock()
            .get(operation_id)
            .and_then(|op| op.progress.clone())
    }

    pub fn status(&self, operation_id: &OperationId) -> Option<OperationStatus> {
        self.active.lock().get(operation_id).map(|op| op.status)
    }

    pub fn is_active(&self, operation_id: &OperationId) -> bool {
        self.active.lock().contains_key(operation_id)
    }

    /// Ids of every registered batch, sorted.
    pub fn active_operations(&self) -> Vec<OperationId> {
        let mut ids: Vec<_> = self.active.lock().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }
}
