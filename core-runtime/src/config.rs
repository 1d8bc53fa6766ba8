//! # Bridge Configuration Module
//!
//! Provides configuration management for the exception bridge.
//!
//! ## Overview
//!
//! A builder assembles a [`BridgeConfig`] holding the host-provided
//! aggregation pipeline and the limits that bound the bridge's memory use.
//! Validation is fail-fast: a missing pipeline or an out-of-range limit is
//! reported when the config is built, never later from a capture path.
//!
//! ## Required Dependencies
//!
//! - `AggregationPipeline` - the native crash/error backend
//!
//! ## Optional Dependencies
//!
//! - `Clock` - capture timestamp source (default: `SystemClock`)
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::BridgeConfig;
//! use std::sync::Arc;
//!
//! let config = BridgeConfig::builder()
//!     .pipeline(Arc::new(MyPipeline))
//!     .queue_capacity(512)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::BridgeConfig;
//!
//! // Panics with an actionable message: no pipeline was provided
//! let config = BridgeConfig::builder()
//!     .build()
//!     .expect("Should fail - missing aggregation pipeline");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{AggregationPipeline, Clock, SystemClock};
use std::sync::Arc;
use std::time::Duration;

/// Default number of descriptors buffered while the pipeline is unavailable.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Upper bound for the buffer; beyond this a crash loop costs real memory.
pub const MAX_QUEUE_CAPACITY: usize = 100_000;

/// Default number of stack frames kept per descriptor (innermost first).
pub const DEFAULT_MAX_STACK_FRAMES: usize = 128;

/// Default number of breadcrumbs attached to each descriptor.
pub const DEFAULT_MAX_BREADCRUMBS: usize = 32;

/// Default capacity of the diagnostic event bus.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Shortest accepted readiness poll interval.
pub const MIN_READINESS_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Which counter assigns sequence ids to captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceScope {
    /// Shared by every reporter in the process
    #[default]
    Process,
    /// Private to one reporter, for isolated scripting workers
    Isolated,
}

/// Configuration for the exception bridge.
///
/// Use [`BridgeConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Native aggregation backend (required)
    pub pipeline: Arc<dyn AggregationPipeline>,

    /// Time source for capture timestamps
    pub clock: Arc<dyn Clock>,

    /// Maximum descriptors held while the pipeline is not ready
    pub queue_capacity: usize,

    /// Maximum stack frames kept per descriptor
    pub max_stack_frames: usize,

    /// Maximum breadcrumbs remembered and attached to each descriptor
    pub max_breadcrumbs: usize,

    /// Per-subscriber backlog of the event bus
    pub event_buffer_size: usize,

    /// When set, the native worker polls `is_ready()` at this interval while
    /// descriptors are waiting in the buffer
    pub readiness_poll_interval: Option<Duration>,

    pub sequence_scope: SequenceScope,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("pipeline", &"AggregationPipeline { ... }")
            .field("clock", &"Clock { ... }")
            .field("queue_capacity", &self.queue_capacity)
            .field("max_stack_frames", &self.max_stack_frames)
            .field("max_breadcrumbs", &self.max_breadcrumbs)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("readiness_poll_interval", &self.readiness_poll_interval)
            .field("sequence_scope", &self.sequence_scope)
            .finish()
    }
}

impl BridgeConfig {
    /// Creates a new builder for constructing a `BridgeConfig`.
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Queue capacity is within `1..=MAX_QUEUE_CAPACITY`
    /// - Stack frame limit and event buffer size are non-zero
    /// - The readiness poll interval, if any, is not below the minimum
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "Queue capacity must be greater than 0".to_string(),
            ));
        }

        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(Error::Config(format!(
                "Queue capacity exceeds maximum of {}",
                MAX_QUEUE_CAPACITY
            )));
        }

        if self.max_stack_frames == 0 {
            return Err(Error::Config(
                "Stack frame limit must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if let Some(interval) = self.readiness_poll_interval {
            if interval < MIN_READINESS_POLL_INTERVAL {
                return Err(Error::Config(format!(
                    "Readiness poll interval must be at least {}ms",
                    MIN_READINESS_POLL_INTERVAL.as_millis()
                )));
            }
        }

        Ok(())
    }
}

fn pipeline_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "AggregationPipeline".to_string(),
        message: "An AggregationPipeline implementation is required to hand off captured errors. \
                 iOS/Android: wrap the native crash SDK's handled-exception recorder. \
                 Desktop/tests: provide an in-process collector."
            .to_string(),
    }
}

/// Builder for constructing [`BridgeConfig`] instances.
#[derive(Default)]
pub struct BridgeConfigBuilder {
    pipeline: Option<Arc<dyn AggregationPipeline>>,
    clock: Option<Arc<dyn Clock>>,
    queue_capacity: Option<usize>,
    max_stack_frames: Option<usize>,
    max_breadcrumbs: Option<usize>,
    event_buffer_size: Option<usize>,
    readiness_poll_interval: Option<Duration>,
    sequence_scope: SequenceScope,
}

impl BridgeConfigBuilder {
    /// Sets the aggregation pipeline (required).
    pub fn pipeline(mut self, pipeline: Arc<dyn AggregationPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sets the capture clock.
    ///
    /// Default: [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets how many descriptors are buffered before the oldest is evicted.
    ///
    /// Default: 256
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Default: 128
    pub fn max_stack_frames(mut self, frames: usize) -> Self {
        self.max_stack_frames = Some(frames);
        self
    }

    /// Sets the breadcrumb trail length. `0` disables breadcrumbs.
    ///
    /// Default: 32
    pub fn max_breadcrumbs(mut self, breadcrumbs: usize) -> Self {
        self.max_breadcrumbs = Some(breadcrumbs);
        self
    }

    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Enables polling `is_ready()` while descriptors are buffered, for
    /// pipelines without a readiness feed.
    ///
    /// Default: disabled
    pub fn readiness_poll_interval(mut self, interval: Duration) -> Self {
        self.readiness_poll_interval = Some(interval);
        self
    }

    /// Default: [`SequenceScope::Process`]
    pub fn sequence_scope(mut self, scope: SequenceScope) -> Self {
        self.sequence_scope = scope;
        self
    }

    /// Builds the final `BridgeConfig` instance.
    ///
    /// Returns an error if the pipeline is missing or a limit is out of range.
    pub fn build(self) -> Result<BridgeConfig> {
        let pipeline = self.pipeline.ok_or_else(pipeline_missing_error)?;

        let config = BridgeConfig {
            pipeline,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            queue_capacity: self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY),
            max_stack_frames: self.max_stack_frames.unwrap_or(DEFAULT_MAX_STACK_FRAMES),
            max_breadcrumbs: self.max_breadcrumbs.unwrap_or(DEFAULT_MAX_BREADCRUMBS),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            readiness_poll_interval: self.readiness_poll_interval,
            sequence_scope: self.sequence_scope,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{Ack, BridgeError, ErrorDescriptor, ReadinessStream, RejectKind};

    struct MockPipeline;

    #[async_trait]
    impl AggregationPipeline for MockPipeline {
        async fn is_ready(&self) -> bool {
            true
        }

        async fn record(
            &self,
            _descriptor: &ErrorDescriptor,
        ) -> std::result::Result<Ack, RejectKind> {
            Ok(Ack::default())
        }

        async fn subscribe_readiness(
            &self,
        ) -> std::result::Result<Box<dyn ReadinessStream>, BridgeError> {
            Err(BridgeError::NotAvailable("readiness feed".to_string()))
        }
    }

    fn builder() -> BridgeConfigBuilder {
        BridgeConfig::builder().pipeline(Arc::new(MockPipeline))
    }

    #[test]
    fn test_defaults() {
        let config = builder().build().unwrap();

        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.max_stack_frames, DEFAULT_MAX_STACK_FRAMES);
        assert_eq!(config.max_breadcrumbs, DEFAULT_MAX_BREADCRUMBS);
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
        assert_eq!(config.readiness_poll_interval, None);
        assert_eq!(config.sequence_scope, SequenceScope::Process);
    }

    #[test]
    fn test_missing_pipeline_is_capability_error() {
        let err = BridgeConfig::builder().build().unwrap_err();

        match err {
            Error::CapabilityMissing { capability, .. } => {
                assert_eq!(capability, "AggregationPipeline");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_builder_overrides() {
        let config = builder()
            .queue_capacity(3)
            .max_stack_frames(10)
            .max_breadcrumbs(0)
            .event_buffer_size(8)
            .readiness_poll_interval(Duration::from_millis(250))
            .sequence_scope(SequenceScope::Isolated)
            .build()
            .unwrap();

        assert_eq!(config.queue_capacity, 3);
        assert_eq!(config.max_stack_frames, 10);
        assert_eq!(config.max_breadcrumbs, 0);
        assert_eq!(config.event_buffer_size, 8);
        assert_eq!(
            config.readiness_poll_interval,
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.sequence_scope, SequenceScope::Isolated);
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        assert!(matches!(
            builder().queue_capacity(0).build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_oversized_queue_rejected() {
        assert!(matches!(
            builder().queue_capacity(MAX_QUEUE_CAPACITY + 1).build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_zero_stack_frames_rejected() {
        assert!(builder().max_stack_frames(0).build().is_err());
    }

    #[test]
    fn test_poll_interval_floor() {
        assert!(builder()
            .readiness_poll_interval(Duration::from_millis(1))
            .build()
            .is_err());
        assert!(builder()
            .readiness_poll_interval(MIN_READINESS_POLL_INTERVAL)
            .build()
            .is_ok());
    }

    #[test]
    fn test_debug_hides_bridges() {
        let rendered = format!("{:?}", builder().build().unwrap());
        assert!(rendered.contains("AggregationPipeline { ... }"));
        assert!(rendered.contains("queue_capacity: 256"));
    }
}
