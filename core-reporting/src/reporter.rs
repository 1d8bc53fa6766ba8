//! # Exception Reporter
//!
//! Application-facing entry points. Every reporting call returns `()`:
//! failures inside the bridge are logged, counted in
//! [`Diagnostics`](crate::diagnostics::Diagnostics) and published on the
//! event bus, but never raised into the application.
//!
//! ## Usage
//!
//! ```ignore
//! use core_reporting::{CaptureOptions, ExceptionReporter};
//! use core_runtime::config::BridgeConfig;
//! use serde_json::json;
//!
//! let reporter = ExceptionReporter::start(
//!     BridgeConfig::builder().pipeline(pipeline).build()?,
//! )?;
//!
//! reporter.set_user_id("user-42");
//! reporter.record_breadcrumb("checkout_opened", Default::default());
//! reporter.report_exception(&json!({ "name": "TypeError", "message": "boom" }));
//!
//! reporter.flush().await?;
//! ```

use crate::capture::{CaptureAdapter, CaptureOptions};
use crate::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::error::{ReportingError, Result};
use crate::guard::DeliveryGuard;
use crate::transport::BridgeTransport;
use crate::worker::NativeWorker;
use bridge_traits::{
    AttributeValue, Attributes, Breadcrumb, ErrorDescriptor, Readiness, ReportLevel,
};
use core_async::runtime::{self, Handle};
use core_async::task::JoinHandle;
use core_runtime::config::BridgeConfig;
use core_runtime::events::{CaptureEvent, CoreEvent, EventBus, EventStream};
use core_runtime::logging::strip_path;
use core_runtime::Error as RuntimeError;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ExceptionReporter {
    adapter: CaptureAdapter,
    transport: BridgeTransport,
    diagnostics: Arc<Diagnostics>,
    events: EventBus,
    /// Serializes id assignment and send so the channel carries ids in order
    send_order: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ExceptionReporter {
    /// Starts the bridge on the Tokio runtime driving the current thread.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::RuntimeUnavailable`] when called outside a runtime,
    /// or [`RuntimeError::Config`] if the config no longer validates.
    pub fn start(config: BridgeConfig) -> Result<Self> {
        let handle = runtime::try_current().ok_or_else(|| {
            RuntimeError::RuntimeUnavailable(
                "ExceptionReporter::start needs a Tokio runtime; use start_on with a handle"
                    .to_string(),
            )
        })?;
        Self::start_on(config, &handle)
    }

    /// Starts the bridge, spawning the native worker on `handle`.
    pub fn start_on(config: BridgeConfig, handle: &Handle) -> Result<Self> {
        config.validate()?;

        let diagnostics = Arc::new(Diagnostics::new());
        let events = EventBus::new(config.event_buffer_size);
        let (transport, receiver) =
            BridgeTransport::channel(Arc::clone(&diagnostics), events.clone());

        let guard = DeliveryGuard::new(
            Arc::clone(&config.pipeline),
            Arc::clone(&config.clock),
            config.queue_capacity,
            Arc::clone(&diagnostics),
            events.clone(),
        );
        let worker = NativeWorker::new(
            guard,
            Arc::clone(&config.pipeline),
            receiver,
            config.readiness_poll_interval,
            Arc::clone(&diagnostics),
            events.clone(),
        );
        let join = handle.spawn(worker.run());

        debug!(
            queue_capacity = config.queue_capacity,
            scope = ?config.sequence_scope,
            "Exception reporter started"
        );

        Ok(Self {
            adapter: CaptureAdapter::from_config(&config),
            transport,
            diagnostics,
            events,
            send_order: Mutex::new(()),
            worker: Mutex::new(Some(join)),
        })
    }

    /// Reports an unhandled or explicitly caught exception.
    pub fn report_exception(&self, raw: &Value) {
        self.report_with(raw, CaptureOptions::default());
    }

    /// Reports with explicit fatality, level or per-report attributes.
    pub fn report_with(&self, raw: &Value, options: CaptureOptions) {
        let _ordered = self.send_order.lock();

        let descriptor = self.adapter.capture_with(raw, options);
        let sequence_id = descriptor.sequence_id().value();
        self.diagnostics.record_captured();
        debug!(
            sequence_id,
            name = descriptor.name(),
            level = %descriptor.level(),
            fatal = descriptor.fatal(),
            frames = descriptor.stack_frames().len(),
            origin = %origin(&descriptor),
            "Error captured"
        );
        let _ = self.events.emit(CoreEvent::Capture(CaptureEvent::Captured {
            sequence_id,
            name: descriptor.name().to_string(),
            fatal: descriptor.fatal(),
        }));

        self.transport.send(&descriptor);
    }

    pub fn log(&self, raw: &Value) {
        self.report_at(raw, ReportLevel::Log);
    }

    pub fn warning(&self, raw: &Value) {
        self.report_at(raw, ReportLevel::Warning);
    }

    pub fn error(&self, raw: &Value) {
        self.report_at(raw, ReportLevel::Error);
    }

    pub fn critical(&self, raw: &Value) {
        self.report_at(raw, ReportLevel::Critical);
    }

    fn report_at(&self, raw: &Value, level: ReportLevel) {
        self.report_with(raw, CaptureOptions::new().level(level));
    }

    /// Sets the user id stamped on later reports. A blank id clears it.
    pub fn set_user_id(&self, user_id: impl Into<String>) {
        self.adapter.context().set_user_id(Some(user_id.into()));
    }

    pub fn clear_user_id(&self) {
        self.adapter.context().set_user_id(None);
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.adapter.context().set_attribute(key, value);
    }

    pub fn set_attributes(&self, attributes: Attributes) {
        self.adapter.context().set_attributes(attributes);
    }

    pub fn remove_attribute(&self, key: &str) {
        if self.adapter.context().remove_attribute(key).is_none() {
            debug!(key, "Attribute was not set");
        }
    }

    pub fn record_breadcrumb(&self, name: impl Into<String>, attributes: Attributes) {
        let recorded_at = self.adapter.clock().unix_timestamp_millis();
        self.adapter
            .context()
            .record_breadcrumb(Breadcrumb::new(name, recorded_at).with_attributes(attributes));
    }

    /// Forwards a readiness change from hosts whose pipeline has no feed.
    pub fn signal_readiness(&self, readiness: Readiness) {
        if let Err(err) = self.transport.signal_readiness(readiness) {
            warn!(error = %err, ?readiness, "Readiness signal not delivered");
        }
    }

    pub fn transport(&self) -> &BridgeTransport {
        &self.transport
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.events.subscribe())
    }

    /// Waits until the native worker has processed everything sent so far.
    ///
    /// Descriptors still buffered for an unready pipeline stay buffered.
    pub async fn flush(&self) -> Result<()> {
        let done = self.transport.request_flush()?;
        done.await.map_err(|_| ReportingError::TransportClosed)
    }

    /// Stops the native worker after it processes everything sent so far.
    ///
    /// The pipeline gets one last readiness check; descriptors it still
    /// cannot take are counted as abandoned. Later reports are counted as
    /// transport failures.
    pub async fn shutdown(&self) -> Result<()> {
        let Some(join) = self.worker.lock().take() else {
            return Ok(());
        };

        if let Err(err) = self.transport.shutdown() {
            debug!(error = %err, "Worker already gone at shutdown");
        }

        join.await
            .map_err(|e| RuntimeError::Internal(format!("native worker failed: {}", e)))?;
        Ok(())
    }
}

/// Innermost frame as `file:line` with the path reduced to its base name.
fn origin(descriptor: &ErrorDescriptor) -> String {
    descriptor
        .stack_frames()
        .first()
        .and_then(|frame| {
            let file = strip_path(frame.file.as_deref()?);
            Some(match frame.line {
                Some(line) => format!("{file}:{line}"),
                None => file.to_string(),
            })
        })
        .unwrap_or_else(|| "-".to_string())
}

impl std::fmt::Debug for ExceptionReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionReporter")
            .field("adapter", &self.adapter)
            .field("transport", &self.transport)
            .field("diagnostics", &self.diagnostics.snapshot())
            .finish()
    }
}
