//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the reconciliation crates:
//! - Logging and tracing bootstrap
//! - Host capability configuration
//! - Event bus for operation progress and library mutations
//!
//! ## Overview
//!
//! Nothing in here knows about tracks or duplicates. The engine crates emit
//! `tracing` events and [`CoreEvent`](events::CoreEvent)s; this crate decides
//! where they go.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
