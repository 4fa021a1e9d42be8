//! # Host Bridge Traits
//!
//! Capability traits the host must provide to the reconciliation engine.
//!
//! ## Overview
//!
//! The engine never touches the filesystem or a logging backend on its own.
//! Everything outside the in-memory library snapshot is reached through the
//! traits in this crate, so desktop hosts, test harnesses, and sandboxed
//! platforms can each plug in their own implementation.
//!
//! ## Traits
//!
//! - [`FileSystemProbe`](filesystem::FileSystemProbe) - Existence checks,
//!   directory enumeration, and file size reads used by relocation matching
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing:
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder().build();
//! // Err(CapabilityMissing { capability: "FileSystemProbe", .. })
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform errors into it and keep the offending path in the
//! message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across async
//! tasks behind an `Arc`.
//!
//! ## Example
//!
//! ```ignore
//! use bridge_traits::filesystem::{FileMetadata, FileSystemProbe};
//! use bridge_traits::error::Result;
//! use async_trait::async_trait;
//! use std::path::{Path, PathBuf};
//!
//! pub struct NullProbe;
//!
//! #[async_trait]
//! impl FileSystemProbe for NullProbe {
//!     async fn exists(&self, _path: &Path) -> Result<bool> {
//!         Ok(false)
//!     }
//!
//!     async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
//!         Err(bridge_traits::BridgeError::NotFound(path.display().to_string()))
//!     }
//!
//!     async fn list_directory(&self, _path: &Path) -> Result<Vec<PathBuf>> {
//!         Ok(Vec::new())
//!     }
//! }
//! ```

pub mod error;
pub mod filesystem;
pub mod time;

pub use error::BridgeError;

pub use filesystem::{FileMetadata, FileSystemProbe};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
