//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileSystemProbe` using `tokio::fs`
//!
//! Logging and time use the portable `ConsoleLogger` and `SystemClock` from
//! `bridge-traits`, so nothing else needs a desktop-specific adapter.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TokioFileSystemProbe;
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .file_system(Arc::new(TokioFileSystemProbe::new()))
//!     .build()?;
//! ```

mod filesystem;

pub use filesystem::TokioFileSystemProbe;
