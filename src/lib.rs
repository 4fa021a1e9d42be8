//! Workspace umbrella crate.
//!
//! Host applications depend on `reconcile-workspace` and get the
//! reconciliation service plus the desktop filesystem probe wired through
//! the `desktop-shims` feature, without naming each workspace crate.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
