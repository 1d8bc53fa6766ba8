//! # Bridge Transport
//!
//! Moves descriptors from the capturing thread to the native worker.
//!
//! Each descriptor is serialized to JSON bytes before it crosses, so nothing
//! on the native side refers to scripting-side memory. The channel is a
//! single unbounded FIFO: sending never blocks and never reorders, and
//! control messages (readiness, flush barriers, shutdown) travel in the same
//! queue as descriptors so the worker sees one total order.

use crate::diagnostics::Diagnostics;
use crate::error::{ReportingError, Result};
use bridge_traits::{ErrorDescriptor, Readiness};
use bytes::Bytes;
use core_async::sync::{mpsc, oneshot};
use core_runtime::events::{CaptureEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tracing::{trace, warn};

/// Everything the native worker can receive.
#[derive(Debug)]
pub enum WorkerMessage {
    /// A serialized [`ErrorDescriptor`]
    Descriptor(Bytes),
    /// Host-signalled pipeline availability
    Readiness(Readiness),
    /// Answered once every earlier message has been processed
    Flush(oneshot::Sender<()>),
    /// Stop the worker after everything queued before it
    Shutdown,
}

/// Serializes a descriptor for the hop.
pub fn encode(descriptor: &ErrorDescriptor) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(descriptor)?))
}

/// Rebuilds a descriptor on the native side and checks its invariants.
pub fn decode(payload: &[u8]) -> Result<ErrorDescriptor> {
    let descriptor: ErrorDescriptor =
        serde_json::from_slice(payload).map_err(|e| ReportingError::Decode(e.to_string()))?;
    descriptor
        .validate()
        .map_err(|e| ReportingError::Decode(e.to_string()))?;
    Ok(descriptor)
}

/// Scripting-side handle of the transport. Cheap to clone.
#[derive(Clone)]
pub struct BridgeTransport {
    sender: mpsc::UnboundedSender<WorkerMessage>,
    diagnostics: Arc<Diagnostics>,
    events: EventBus,
}

impl BridgeTransport {
    /// Creates the transport and the receiving end for the native worker.
    pub fn channel(
        diagnostics: Arc<Diagnostics>,
        events: EventBus,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerMessage>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                diagnostics,
                events,
            },
            receiver,
        )
    }

    /// Fire-and-forget send. Failures are counted and logged, never raised.
    pub fn send(&self, descriptor: &ErrorDescriptor) {
        let sequence_id = descriptor.sequence_id();

        match self.try_send(descriptor) {
            Ok(()) => {
                trace!(sequence_id = sequence_id.value(), "Descriptor sent to native side");
            }
            Err(ReportingError::TransportClosed) => {
                self.diagnostics.record_transport_failure();
                warn!(
                    sequence_id = sequence_id.value(),
                    "Native worker is gone; descriptor dropped"
                );
                let _ = self.events.emit(CoreEvent::Capture(CaptureEvent::TransportClosed {
                    sequence_id: sequence_id.value(),
                }));
            }
            Err(err) => {
                self.diagnostics.record_transport_failure();
                warn!(
                    sequence_id = sequence_id.value(),
                    error = %err,
                    "Descriptor could not be serialized; dropped"
                );
            }
        }
    }

    pub fn try_send(&self, descriptor: &ErrorDescriptor) -> Result<()> {
        let payload = encode(descriptor)?;
        self.push(WorkerMessage::Descriptor(payload))
    }

    /// Sends a descriptor serialized elsewhere, e.g. by the scripting runtime.
    ///
    /// The payload is only checked on the native side; a bad one is counted
    /// as malformed there.
    pub fn send_payload(&self, payload: Bytes) -> Result<()> {
        self.push(WorkerMessage::Descriptor(payload))
    }

    pub fn signal_readiness(&self, readiness: Readiness) -> Result<()> {
        self.push(WorkerMessage::Readiness(readiness))
    }

    /// Queues a flush barrier; the receiver resolves once the worker reaches it.
    pub fn request_flush(&self) -> Result<oneshot::Receiver<()>> {
        let (ack, done) = oneshot::channel();
        self.push(WorkerMessage::Flush(ack))?;
        Ok(done)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.push(WorkerMessage::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    fn push(&self, message: WorkerMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| ReportingError::TransportClosed)
    }
}

impl std::fmt::Debug for BridgeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeTransport")
            .field("closed", &self.is_closed())
            .finish()
    }
}
