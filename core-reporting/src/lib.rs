//! # Core Reporting
//!
//! Captures errors from the scripting layer and hands them to the native
//! aggregation pipeline without losing any silently.
//!
//! ## Flow
//!
//! ```text
//! raw error ─▶ CaptureAdapter ─▶ ErrorDescriptor ─▶ BridgeTransport
//!                                                        │ (JSON bytes, FIFO)
//!                                                        ▼
//!                     AggregationPipeline ◀─ DeliveryGuard (native worker)
//! ```
//!
//! - [`capture`]: normalization, sequence ids, session context
//! - [`stack`]: stack string and frame array parsing
//! - [`transport`]: the one-way FIFO to the native side
//! - [`guard`]: buffering, ordering, dedup, eviction, retry
//! - [`diagnostics`]: counters for every non-happy path
//! - [`reporter`]: the [`ExceptionReporter`] facade used by applications

pub mod capture;
pub mod diagnostics;
pub mod error;
pub mod guard;
pub mod reporter;
pub mod stack;
pub mod transport;

mod worker;

pub use capture::{CaptureAdapter, CaptureOptions, ContextSnapshot, ReportContext, SequenceCounter};
pub use diagnostics::{Diagnostics, DiagnosticsSnapshot};
pub use error::{ReportingError, Result};
pub use guard::DeliveryGuard;
pub use reporter::ExceptionReporter;
pub use transport::{BridgeTransport, WorkerMessage};
