//! # Library Module
//!
//! Holds the library snapshot for a reconciliation session.
//!
//! ## Overview
//!
//! This module provides:
//! - Domain models for tracks, playlists, and computers
//! - Text normalization shared by indexing and scoring
//! - [`LibraryIndex`], the indexed in-memory view every engine reads from
//!   and the single place mutations are applied

pub mod error;
pub mod index;
pub mod models;

pub use error::{LibraryError, Result};
pub use index::{LibraryIndex, MergeOutcome};
pub use models::{
    normalize_key, normalize_text, Computer, ComputerId, Library, Playlist, PlaylistId, Track,
    TrackId,
};
