//! # Core Configuration Module
//!
//! Host capabilities and runtime settings for a reconciliation session.
//!
//! ## Overview
//!
//! `CoreConfig` is assembled with [`CoreConfigBuilder`] and validated
//! fail-fast: a session cannot start without a filesystem probe, because
//! missing-track detection and relocation depend on it.
//!
//! ## Required Dependencies
//!
//! - `FileSystemProbe` - existence checks and directory enumeration
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - timestamps on batch results (default: `SystemClock`)
//! - `LoggerSink` - host log pipeline, handed to
//!   [`LoggingConfig`](crate::logging::LoggingConfig) by the host
//!
//! When the `desktop-shims` feature is enabled a `TokioFileSystemProbe` is
//! injected automatically if no probe was provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .file_system(Arc::new(MyProbe))
//!     .event_buffer_size(512)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, FileSystemProbe, LoggerSink, SystemClock};
use std::sync::Arc;

/// Upper bound for the event channel buffer.
const MAX_EVENT_BUFFER_SIZE: usize = 65_536;

/// Core configuration for a reconciliation session.
#[derive(Clone)]
pub struct CoreConfig {
    /// Filesystem probe (required)
    pub file_system: Arc<dyn FileSystemProbe>,

    /// Time source for batch timestamps
    pub clock: Arc<dyn Clock>,

    /// Host log sink, if the host wants core logs mirrored
    pub logger_sink: Option<Arc<dyn LoggerSink>>,

    /// Per-subscriber buffer of the event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("file_system", &"FileSystemProbe { ... }")
            .field("clock", &"Clock { ... }")
            .field(
                "logger_sink",
                &self.logger_sink.as_ref().map(|_| "LoggerSink { ... }"),
            )
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    file_system: Option<Arc<dyn FileSystemProbe>>,
    clock: Option<Arc<dyn Clock>>,
    logger_sink: Option<Arc<dyn LoggerSink>>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the filesystem probe.
    pub fn file_system(mut self, probe: Arc<dyn FileSystemProbe>) -> Self {
        self.file_system = Some(probe);
        self
    }

    /// Sets the time source.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the host logger sink.
    pub fn logger_sink(mut self, sink: Arc<dyn LoggerSink>) -> Self {
        self.logger_sink = Some(sink);
        self
    }

    /// Sets the event bus buffer size.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// `CapabilityMissing` when no filesystem probe is available, `Config`
    /// when a setting is out of range.
    pub fn build(self) -> Result<CoreConfig> {
        let file_system = match self.file_system {
            Some(probe) => probe,
            None => provide_default_file_system()?,
        };

        let config = CoreConfig {
            file_system,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            logger_sink: self.logger_sink,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemProbe>> {
    Ok(Arc::new(bridge_desktop::TokioFileSystemProbe::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemProbe>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemProbe".to_string(),
        message: "No filesystem probe provided. Desktop: enable the `desktop-shims` \
                  feature. Other hosts: inject a platform adapter with .file_system()."
            .to_string(),
    })
}
