//! # Event Bus System
//!
//! Broadcast channel carrying reconciliation lifecycle and library mutation
//! events from the engine to any number of host subscribers.
//!
//! ## Overview
//!
//! - **Event Types**: [`CoreEvent`] wraps [`ReconcileEvent`] (batch operation
//!   lifecycle and progress) and [`LibraryEvent`] (changes applied to the
//!   in-memory library)
//! - **EventBus**: `tokio::sync::broadcast` sender shared by the service
//! - **EventStream**: receiver wrapper with an optional filter
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, EventStream, ReconcileEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut progress = EventStream::new(bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Reconcile(ReconcileEvent::Progress { .. })));
//!
//! bus.emit(CoreEvent::Reconcile(ReconcileEvent::Progress {
//!     operation_id: "op-1".to_string(),
//!     processed: 1,
//!     total: 4,
//!     current_item_id: Some("track-1".to_string()),
//!     percent: 25,
//! }))
//! .ok();
//!
//! let event = progress.recv().await.unwrap();
//! assert_eq!(event.description(), "Batch operation in progress");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `RecvError::Lagged(n)` means a slow subscriber missed `n` events and can
//! keep reading; `RecvError::Closed` means the bus was dropped. `emit`
//! returns an error when nobody is subscribed, which callers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published through the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Batch operation lifecycle
    Reconcile(ReconcileEvent),
    /// Mutations applied to the library snapshot
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Reconcile(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Reconcile(ReconcileEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Reconcile(ReconcileEvent::Completed { failed, .. }) if *failed > 0 => {
                EventSeverity::Warning
            }
            CoreEvent::Reconcile(ReconcileEvent::Completed { .. })
            | CoreEvent::Reconcile(ReconcileEvent::Cancelled { .. }) => EventSeverity::Info,
            CoreEvent::Library(_) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Operation id carried by reconcile events.
    pub fn operation_id(&self) -> Option<&str> {
        match self {
            CoreEvent::Reconcile(e) => Some(e.operation_id()),
            CoreEvent::Library(_) => None,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Reconcile Events
// ============================================================================

/// Lifecycle of a batch operation run through the batch runner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum ReconcileEvent {
    /// Batch registered and about to process its first item.
    Started {
        operation_id: String,
        /// Operation kind, e.g. "auto_relocate"
        kind: String,
        total: u64,
    },
    /// One item finished (successfully or not).
    Progress {
        operation_id: String,
        processed: u64,
        total: u64,
        current_item_id: Option<String>,
        /// Progress percentage (0-100).
        percent: u8,
    },
    /// All items were attempted.
    Completed {
        operation_id: String,
        succeeded: u64,
        failed: u64,
        duration_ms: u64,
    },
    /// Cancelled at an item boundary.
    Cancelled {
        operation_id: String,
        processed: u64,
        not_started: u64,
    },
    /// The batch could not run at all.
    Failed {
        operation_id: String,
        message: String,
    },
}

impl ReconcileEvent {
    fn description(&self) -> &str {
        match self {
            ReconcileEvent::Started { .. } => "Batch operation started",
            ReconcileEvent::Progress { .. } => "Batch operation in progress",
            ReconcileEvent::Completed { .. } => "Batch operation completed",
            ReconcileEvent::Cancelled { .. } => "Batch operation cancelled",
            ReconcileEvent::Failed { .. } => "Batch operation failed",
        }
    }

    pub fn operation_id(&self) -> &str {
        match self {
            ReconcileEvent::Started { operation_id, .. }
            | ReconcileEvent::Progress { operation_id, .. }
            | ReconcileEvent::Completed { operation_id, .. }
            | ReconcileEvent::Cancelled { operation_id, .. }
            | ReconcileEvent::Failed { operation_id, .. } => operation_id,
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Changes applied to the in-memory library by resolutions and fixes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// A library snapshot was loaded into the session.
    LibraryLoaded {
        track_count: u64,
        playlist_count: u64,
        computer_count: u64,
    },
    /// Duplicate tracks were merged into a survivor.
    TracksMerged {
        survivor_id: String,
        removed_ids: Vec<String>,
        playlists_updated: Vec<String>,
    },
    /// A track's file location changed.
    TrackRelocated {
        track_id: String,
        old_location: String,
        new_location: String,
    },
    /// A track's cloud path (or location) was rewritten.
    CloudPathUpdated {
        track_id: String,
        cloud_path: Option<String>,
        location: String,
    },
    /// A track was assigned to a computer.
    TrackOwnerChanged {
        track_id: String,
        previous_owner_id: Option<String>,
        owner_id: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::LibraryLoaded { .. } => "Library snapshot loaded",
            LibraryEvent::TracksMerged { .. } => "Duplicate tracks merged",
            LibraryEvent::TrackRelocated { .. } => "Track relocated",
            LibraryEvent::CloudPathUpdated { .. } => "Cloud path updated",
            LibraryEvent::TrackOwnerChanged { .. } => "Track owner changed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for core events.
///
/// Cloning the bus is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Keep only reconcile events of one operation.
    pub fn for_operation(self, operation_id: impl Into<String>) -> Self {
        let operation_id = operation_id.into();
        self.filter(move |event| event.operation_id() == Some(operation_id.as_str()))
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
