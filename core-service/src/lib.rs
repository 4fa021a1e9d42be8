//! # Core Service
//!
//! Host-facing facade of the reconciliation engine.
//!
//! ## Overview
//!
//! This crate wires the host capabilities from a
//! [`CoreConfig`](core_runtime::config::CoreConfig) into the engine crates
//! and exposes every operation as a plain async method on
//! [`ReconcileService`]. There is no transport layer: hosts call the methods
//! directly and subscribe to the event bus for lifecycle and mutation events.
//!
//! Desktop hosts typically enable the `desktop-shims` feature, which makes
//! `bridge-desktop`'s [`TokioFileSystemProbe`] the default probe.

pub mod error;
pub mod progress;
pub mod service;

pub use error::{CoreError, Result};
pub use progress::{AutoRelocateHandle, ProgressStream};
pub use service::{AutoRelocateOptions, ReconcileService};

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop::TokioFileSystemProbe;

pub use core_library::{Computer, ComputerId, Library, Playlist, PlaylistId, Track, TrackId};
pub use core_reconcile::{
    AutoRelocateOutcome, BatchProgress, BatchResult, CloudFixStrategy, CloudSyncIssue,
    ConfidenceLevel, DuplicateGroup, DuplicateOptions, DuplicateResolution, OperationId,
    OwnershipFix, OwnershipIssue, ReconcileConfig, RelocationCandidate, RelocationOptions,
    RelocationRequest, ResolutionPolicy, ThresholdSpec,
};
pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{CoreEvent, EventStream, LibraryEvent, ReconcileEvent};
