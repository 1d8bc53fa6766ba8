//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::time::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggerSinkLayer, LoggingConfig,
};
use std::sync::{Arc, Mutex};
use tracing_subscriber::layer::SubscriberExt;

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for RecordingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Warn
    }
}

#[test]
fn test_global_init_only_once() {
    // The only test in this binary that installs a global subscriber
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug);

    init_logging(config.clone()).unwrap();
    assert!(init_logging(config).is_err());
}

#[test]
fn test_sensitive_values_redacted() {
    assert_eq!(redact_if_sensitive("auth_token", "abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("USER_ID", "u-1"), "[REDACTED]");

    let redacted = redact_if_sensitive("contact", "dev@example.com");
    assert!(redacted.starts_with('d'));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_descriptor_fields_pass_through() {
    assert_eq!(redact_if_sensitive("sequence_id", "42"), "42");
    assert_eq!(redact_if_sensitive("name", "RangeError"), "RangeError");
    assert_eq!(redact_if_sensitive("state", "draining"), "draining");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/private/var/containers/main.jsbundle"), "main.jsbundle");
    assert_eq!(strip_path("D:\\app\\bundle.js"), "bundle.js");
    assert_eq!(strip_path("bundle.js"), "bundle.js");
    assert_eq!(strip_path(""), "");
}

#[test]
fn test_sink_respects_min_level() {
    let sink = Arc::new(RecordingSink::default());
    let trait_sink: Arc<dyn LoggerSink> = sink.clone();
    let subscriber = tracing_subscriber::registry().with(LoggerSinkLayer::new(Some(trait_sink)));

    tracing::subscriber::with_default(subscriber, || {
        tracing::info!("buffering descriptor");
        tracing::warn!(sequence_id = 3u64, "transient failure");
        tracing::error!(sequence_id = 4u64, "descriptor rejected");
    });

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].level, LogLevel::Warn);
    assert_eq!(entries[1].message, "descriptor rejected");
}

#[tokio::test]
async fn test_sink_delivery_on_runtime() {
    let sink = Arc::new(RecordingSink::default());
    let trait_sink: Arc<dyn LoggerSink> = sink.clone();
    let subscriber = tracing_subscriber::registry().with(LoggerSinkLayer::new(Some(trait_sink)));

    {
        let _guard = tracing::subscriber::set_default(subscriber);
        tracing::warn!(target: "core_reporting::guard", "pipeline unavailable");
    }

    // Delivery was spawned onto the current runtime
    for _ in 0..10 {
        if !sink.entries.lock().unwrap().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].target, "core_reporting::guard");
}
