//! Integration tests for the logging bootstrap

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

// Global subscriber can only be installed once per process, so the whole
// init path is covered by this single test.
#[test]
fn test_init_logging_forwards_to_sink_and_rejects_second_init() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Info)
        .with_logger_sink(sink.clone());

    init_logging(config).expect("first init succeeds");

    tracing::info!(
        target: "core_reconcile::batch",
        operation_id = "op-42",
        library_path = "/Users/ana/Music/Library.xml",
        "Batch started"
    );
    tracing::debug!(target: "core_reconcile::batch", "below level, filtered");

    let entries = sink.entries.lock().unwrap().clone();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "Batch started");
    assert_eq!(entries[0].fields.get("operation_id"), Some(&"op-42".to_string()));
    assert_eq!(
        entries[0].fields.get("library_path"),
        Some(&"Library.xml".to_string())
    );

    let second = init_logging(LoggingConfig::default());
    assert!(second.is_err());
}

#[test]
fn test_path_redaction_helpers() {
    assert_eq!(strip_path("/home/user/music/song.mp3"), "song.mp3");
    assert_eq!(strip_path("C:\\Users\\John\\Music\\song.mp3"), "song.mp3");
    assert_eq!(strip_path(""), "");

    assert_eq!(
        redact_if_sensitive("sync_root", "/Users/ana/Dropbox"),
        "Dropbox"
    );
    assert_eq!(redact_if_sensitive("confidence", "0.91"), "0.91");
}

#[test]
fn test_format_selection() {
    #[cfg(debug_assertions)]
    assert_eq!(LoggingConfig::default().format, LogFormat::Pretty);

    #[cfg(not(debug_assertions))]
    assert_eq!(LoggingConfig::default().format, LogFormat::Json);
}
