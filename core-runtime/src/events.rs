//! # Bridge Events
//!
//! Broadcasts what happens to captured errors on their way to the aggregation
//! pipeline, using the `broadcast` channel from `core_async::sync`.
//!
//! ## Overview
//!
//! The bridge never raises failures back into the application. Everything it
//! would otherwise have to say (a descriptor was evicted, the pipeline
//! rejected one, the guard fell back to buffering) is published here and in
//! the logs instead. Hosts subscribe to drive dashboards, debug overlays or
//! tests.
//!
//! ```text
//! ┌─────────────────┐  Capture   ┌───────────┐   subscribe   ┌────────────┐
//! │ Capture Adapter ├───────────>│           ├──────────────>│ Subscriber │
//! └─────────────────┘            │ EventBus  │               └────────────┘
//! ┌─────────────────┐  Delivery  │           │   subscribe   ┌────────────┐
//! │ Delivery Guard  ├───────────>│           ├──────────────>│ Subscriber │
//! └─────────────────┘            └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DeliveryEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Delivery(DeliveryEvent::Delivered { sequence_id: 1 }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Descriptor delivered");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it may keep
//!   receiving.
//! - **`RecvError::Closed`**: every sender is gone; treat as shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scripting-side capture events
    Capture(CaptureEvent),
    /// Native-side delivery events
    Delivery(DeliveryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Capture(e) => e.description(),
            CoreEvent::Delivery(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Delivery(DeliveryEvent::Evicted { .. })
            | CoreEvent::Delivery(DeliveryEvent::Rejected { .. })
            | CoreEvent::Delivery(DeliveryEvent::MalformedPayload { .. })
            | CoreEvent::Delivery(DeliveryEvent::Abandoned { .. })
            | CoreEvent::Capture(CaptureEvent::TransportClosed { .. }) => EventSeverity::Error,
            CoreEvent::Delivery(DeliveryEvent::TransientFailure { .. })
            | CoreEvent::Delivery(DeliveryEvent::DropReported { .. }) => EventSeverity::Warning,
            CoreEvent::Delivery(DeliveryEvent::StateChanged { .. })
            | CoreEvent::Capture(CaptureEvent::Captured { fatal: true, .. }) => {
                EventSeverity::Info
            }
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Capture Events
// ============================================================================

/// Events raised on the scripting side of the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CaptureEvent {
    /// A raw error was normalized into a descriptor
    Captured {
        sequence_id: u64,
        name: String,
        fatal: bool,
    },
    /// The native side is gone; the descriptor could not be sent
    TransportClosed { sequence_id: u64 },
}

impl CaptureEvent {
    pub fn description(&self) -> &str {
        match self {
            CaptureEvent::Captured { .. } => "Error captured",
            CaptureEvent::TransportClosed { .. } => "Transport closed",
        }
    }
}

// ============================================================================
// Delivery Events
// ============================================================================

/// State of the delivery guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Pipeline not confirmed ready; descriptors accumulate in the queue
    Buffering,
    /// Pipeline ready; the queue is being flushed oldest first
    Draining,
    /// Queue empty and pipeline ready; descriptors are forwarded directly
    Live,
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeliveryState::Buffering => "buffering",
            DeliveryState::Draining => "draining",
            DeliveryState::Live => "live",
        };
        f.write_str(name)
    }
}

/// Events raised on the native side while handing descriptors off.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DeliveryEvent {
    StateChanged {
        from: DeliveryState,
        to: DeliveryState,
    },
    /// The pipeline acknowledged a descriptor
    Delivered { sequence_id: u64 },
    /// A descriptor at or below the settled high-water mark, or already queued
    DuplicateDiscarded { sequence_id: u64 },
    /// The pipeline permanently rejected a descriptor; it will not be retried
    Rejected { sequence_id: u64, reason: String },
    /// The pipeline could not take a descriptor now; it stays queued
    TransientFailure { sequence_id: u64, reason: String },
    /// The queue was full; the oldest descriptor was dropped
    Evicted {
        sequence_id: u64,
        pending_drops: u64,
    },
    /// The loss diagnostic for earlier evictions reached the pipeline
    DropReported { dropped: u64 },
    /// A transport payload could not be decoded
    MalformedPayload { reason: String },
    /// The worker stopped with descriptors still queued
    Abandoned { count: u64 },
}

impl DeliveryEvent {
    pub fn description(&self) -> &str {
        match self {
            DeliveryEvent::StateChanged { .. } => "Delivery state changed",
            DeliveryEvent::Delivered { .. } => "Descriptor delivered",
            DeliveryEvent::DuplicateDiscarded { .. } => "Duplicate descriptor discarded",
            DeliveryEvent::Rejected { .. } => "Descriptor rejected",
            DeliveryEvent::TransientFailure { .. } => "Transient delivery failure",
            DeliveryEvent::Evicted { .. } => "Descriptor evicted",
            DeliveryEvent::DropReported { .. } => "Drop report delivered",
            DeliveryEvent::MalformedPayload { .. } => "Malformed transport payload",
            DeliveryEvent::Abandoned { .. } => "Descriptors abandoned at shutdown",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for bridge events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the per-subscriber backlog before it starts receiving
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let problems = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv`/`try_recv`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    /// Drains every matching event currently buffered.
    pub fn drain(&mut self) -> Vec<CoreEvent> {
        let mut events = Vec::new();
        while let Some(result) = self.try_recv() {
            match result {
                Ok(event) => events.push(event),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        events
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
