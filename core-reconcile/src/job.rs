//! # Batch Operation State
//!
//! Identifiers, lifecycle, and progress records for batch operations.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     ↓         ↓
//!     └──────→ Failed
//!     └──────→ Cancelled
//! ```
//!
//! `Pending` is the state between registration and the first item; a batch
//! rejected before it runs goes straight to `Failed`.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Caller-visible identifier of a batch operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    /// Create a new random operation ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Use a caller-chosen operation ID
    ///
    /// # Errors
    ///
    /// Returns an error if the string is empty or only whitespace
    pub fn from_string(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ReconcileError::InvalidOperationId(
                "operation id cannot be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for OperationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid.to_string())
    }
}

// ============================================================================
// Operation Kind
// ============================================================================

/// What a batch operation does, for logs and lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    AutoRelocate,
    BatchRelocate,
    CloudSyncFix,
    OwnershipFix,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AutoRelocate => "auto_relocate",
            OperationKind::BatchRelocate => "batch_relocate",
            OperationKind::CloudSyncFix => "cloud_sync_fix",
            OperationKind::OwnershipFix => "ownership_fix",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Registered but no item processed yet
    Pending,
    /// Processing items
    Running,
    /// Every item was attempted
    Completed,
    /// Rejected before processing
    Failed,
    /// Stopped at an item boundary; the remaining items were not started
    Cancelled,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, OperationStatus::Pending | OperationStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Move to `next`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, next: OperationStatus) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(ReconcileError::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: next.as_str().to_string(),
                reason: if self.is_terminal() {
                    "operation already finished".to_string()
                } else {
                    "transition not allowed".to_string()
                },
            });
        }
        *self = next;
        Ok(())
    }
}

impl FromStr for OperationStatus {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(OperationStatus::Pending),
            "running" => Ok(OperationStatus::Running),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            "cancelled" => Ok(OperationStatus::Cancelled),
            _ => Err(ReconcileError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Progress Types
// ============================================================================

/// Progress of a running batch, reported after every item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub operation_id: OperationId,
    pub processed: u64,
    pub total: u64,
    /// Item finished most recently
    pub current_item_id: Option<String>,
    /// Progress percentage (0-100)
    pub percent: u8,
}

impl BatchProgress {
    pub fn new(operation_id: OperationId, total: u64) -> Self {
        Self {
            operation_id,
            processed: 0,
            total,
            current_item_id: None,
            percent: if total == 0 { 100 } else { 0 },
        }
    }

    /// Record one more finished item.
    pub fn advance(&mut self, item_id: impl Into<String>) {
        self.processed += 1;
        self.current_item_id = Some(item_id.into());
        self.percent = if self.total > 0 {
            ((self.processed as f64 / self.total as f64) * 100.0).min(100.0) as u8
        } else {
            100
        };
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_from_string() {
        let id = OperationId::from_string("  relocate-1 ").unwrap();
        assert_eq!(id.as_str(), "relocate-1");
        assert!(OperationId::from_string("   ").is_err());
        assert_ne!(OperationId::new(), OperationId::new());
    }

    #[test]
    fn test_status_transitions() {
        let mut status = OperationStatus::Pending;
        status.transition(OperationStatus::Running).unwrap();
        status.transition(OperationStatus::Cancelled).unwrap();
        assert!(status.is_terminal());

        let err = status.transition(OperationStatus::Running).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_pending_cannot_complete_directly() {
        assert!(!OperationStatus::Pending.can_transition_to(OperationStatus::Completed));
        assert!(OperationStatus::Pending.can_transition_to(OperationStatus::Failed));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(
            "Cancelled".parse::<OperationStatus>().unwrap(),
            OperationStatus::Cancelled
        );
        assert!("paused".parse::<OperationStatus>().is_err());
        assert_eq!(OperationStatus::Running.to_string(), "running");
    }

    #[test]
    fn test_progress_advance() {
        let mut progress = BatchProgress::new(OperationId::new(), 4);
        assert_eq!(progress.percent, 0);

        progress.advance("t1");
        assert_eq!(progress.processed, 1);
        assert_eq!(progress.percent, 25);
        assert_eq!(progress.current_item_id.as_deref(), Some("t1"));
        assert_eq!(progress.remaining(), 3);

        for id in ["t2", "t3", "t4"] {
            progress.advance(id);
        }
        assert_eq!(progress.percent, 100);
    }

    #[test]
    fn test_empty_batch_progress_is_complete() {
        assert_eq!(BatchProgress::new(OperationId::new(), 0).percent, 100);
    }
}
