//! Aggregation Pipeline Contract
//!
//! The native crash/error aggregation pipeline (symbolication, batching,
//! upload) is owned by the host. The bridge only needs the narrow surface
//! below: a readiness query, an acceptance call that tells transient failures
//! apart from permanent rejections, and a readiness change feed.
//!
//! # Platform Support
//!
//! - **iOS**: wraps the crash SDK's handled-exception recorder once the agent
//!   has started
//! - **Android**: wraps the agent's `recordHandledException` equivalent
//! - **Desktop**: any in-process collector or spool
//!
//! # Example
//!
//! ```ignore
//! use bridge_traits::aggregation::{Ack, AggregationPipeline, RejectKind};
//!
//! async fn hand_off(pipeline: &dyn AggregationPipeline, descriptor: &ErrorDescriptor) {
//!     match pipeline.record(descriptor).await {
//!         Ok(_) => {}
//!         Err(RejectKind::Transient(_)) => { /* keep it and retry later */ }
//!         Err(RejectKind::Permanent(_)) => { /* drop it */ }
//!     }
//! }
//! ```

use async_trait::async_trait;
use core_async::sync::mpsc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::{ErrorDescriptor, SequenceId};
use crate::error::Result;

/// Receipt returned by the pipeline once it owns a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Pipeline-side identifier for the stored report, when it has one
    pub receipt_id: Option<String>,
}

impl Ack {
    pub fn with_receipt(receipt_id: impl Into<String>) -> Self {
        Self {
            receipt_id: Some(receipt_id.into()),
        }
    }
}

/// Why the pipeline refused a descriptor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectKind {
    /// The pipeline cannot take the descriptor right now; retry later
    #[error("pipeline temporarily unavailable: {0}")]
    Transient(String),

    /// The descriptor failed the pipeline's own validation; never retry
    #[error("descriptor rejected: {0}")]
    Permanent(String),
}

impl RejectKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Pipeline availability as signalled by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    Ready,
    Unavailable,
}

/// Summary of descriptors evicted from a full buffer before they could be
/// handed off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropReport {
    /// Number of descriptors lost since the previous report
    pub dropped: u64,
    pub first_dropped: SequenceId,
    pub last_dropped: SequenceId,
    pub reported_at_millis: i64,
}

impl DropReport {
    pub fn message(&self) -> String {
        format!(
            "dropped {} error descriptor(s) ({}..={}) while the aggregation pipeline was unavailable",
            self.dropped, self.first_dropped, self.last_dropped
        )
    }
}

/// Host-owned crash/error aggregation backend.
#[async_trait]
pub trait AggregationPipeline: Send + Sync {
    /// Whether the pipeline can accept descriptors right now.
    async fn is_ready(&self) -> bool;

    /// Hands one descriptor to the pipeline.
    ///
    /// Returning `Ok` transfers ownership: the bridge never offers the same
    /// `sequence_id` again.
    async fn record(&self, descriptor: &ErrorDescriptor) -> std::result::Result<Ack, RejectKind>;

    /// Subscribes to readiness changes.
    ///
    /// Pipelines that cannot push notifications return
    /// [`BridgeError::NotAvailable`](crate::error::BridgeError::NotAvailable);
    /// the bridge then relies on polling [`is_ready`](Self::is_ready).
    async fn subscribe_readiness(&self) -> Result<Box<dyn ReadinessStream>>;

    /// Records the synthetic loss diagnostic produced after buffer evictions.
    async fn record_drop_report(&self, report: &DropReport) -> std::result::Result<Ack, RejectKind> {
        let _ = report;
        Ok(Ack::default())
    }
}

/// Stream of readiness changes.
#[async_trait]
pub trait ReadinessStream: Send {
    /// Returns `None` once the pipeline stops publishing changes.
    async fn next(&mut self) -> Option<Readiness>;
}

#[async_trait]
impl ReadinessStream for mpsc::UnboundedReceiver<Readiness> {
    async fn next(&mut self) -> Option<Readiness> {
        self.recv().await
    }
}
