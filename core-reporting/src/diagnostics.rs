//! Bridge-internal counters.
//!
//! Entry points never return errors to the application, so every outcome
//! that is not a clean handoff is counted here. Counters only grow, except
//! `queued`, which tracks the current buffer length.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Diagnostics {
    captured: AtomicU64,
    delivered: AtomicU64,
    duplicates: AtomicU64,
    rejected: AtomicU64,
    transient_failures: AtomicU64,
    evicted: AtomicU64,
    drop_reports: AtomicU64,
    transport_failures: AtomicU64,
    malformed_payloads: AtomicU64,
    abandoned: AtomicU64,
    queued: AtomicU64,
}

/// Point-in-time copy of [`Diagnostics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub captured: u64,
    pub delivered: u64,
    pub duplicates: u64,
    pub rejected: u64,
    pub transient_failures: u64,
    pub evicted: u64,
    pub drop_reports: u64,
    pub transport_failures: u64,
    pub malformed_payloads: u64,
    /// Still queued when the native worker stopped
    pub abandoned: u64,
    pub queued: u64,
}

impl DiagnosticsSnapshot {
    /// Captures that ended without reaching the pipeline.
    pub fn lost(&self) -> u64 {
        self.rejected
            + self.evicted
            + self.transport_failures
            + self.malformed_payloads
            + self.abandoned
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_captured(&self) {
        self.captured.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transient_failure(&self) {
        self.transient_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evicted(&self) {
        self.evicted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop_report(&self) {
        self.drop_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_payload(&self) {
        self.malformed_payloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abandoned(&self, count: u64) {
        self.abandoned.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn set_queued(&self, len: usize) {
        self.queued.store(len as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            captured: self.captured.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transient_failures: self.transient_failures.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            drop_reports: self.drop_reports.load(Ordering::Relaxed),
            transport_failures: self.transport_failures.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
        }
    }
}
