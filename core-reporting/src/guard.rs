//! # Delivery Guard
//!
//! Buffers descriptors until the aggregation pipeline can take them, then
//! hands them off oldest first, at least once and at most once logically per
//! sequence id.
//!
//! ## States
//!
//! ```text
//!            ready                queue empty
//! Buffering ───────▶ Draining ────────────────▶ Live
//!     ▲                  │                        │
//!     └──── unavailable / transient failure ──────┘
//! ```
//!
//! `Draining` is only the flush that follows a readiness signal. A `Live` guard
//! forwards each new descriptor without changing state.
//!
//! The guard is owned by exactly one task (the native worker); nothing here
//! is shared or locked.
//!
//! ## Loss accounting
//!
//! A full queue evicts its oldest entry, which may be the arriving descriptor
//! itself. Evictions accumulate into a pending [`DropReport`] that is handed
//! to the pipeline after the next flush that empties the queue. Evicted ids
//! count as settled, so a re-sent copy is discarded rather than delivered
//! after being reported lost. Whatever is still queued when the worker stops
//! is counted by [`DeliveryGuard::abandon`].

use crate::diagnostics::Diagnostics;
use bridge_traits::{AggregationPipeline, Clock, DropReport, ErrorDescriptor, RejectKind, SequenceId};
use core_runtime::events::{CoreEvent, DeliveryEvent, DeliveryState, EventBus};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingDrops {
    count: u64,
    first: SequenceId,
    last: SequenceId,
}

impl PendingDrops {
    fn starting_at(sequence_id: SequenceId) -> Self {
        Self {
            count: 1,
            first: sequence_id,
            last: sequence_id,
        }
    }

    fn add(&mut self, sequence_id: SequenceId) {
        self.count += 1;
        self.first = self.first.min(sequence_id);
        self.last = self.last.max(sequence_id);
    }
}

pub struct DeliveryGuard {
    pipeline: Arc<dyn AggregationPipeline>,
    clock: Arc<dyn Clock>,
    state: DeliveryState,
    /// Sorted by sequence id, oldest at the front
    queue: VecDeque<ErrorDescriptor>,
    capacity: usize,
    /// Highest sequence id with a final outcome: acknowledged, permanently
    /// rejected or evicted
    settled_through: u64,
    pending_drops: Option<PendingDrops>,
    diagnostics: Arc<Diagnostics>,
    events: EventBus,
}

impl DeliveryGuard {
    pub fn new(
        pipeline: Arc<dyn AggregationPipeline>,
        clock: Arc<dyn Clock>,
        capacity: usize,
        diagnostics: Arc<Diagnostics>,
        events: EventBus,
    ) -> Self {
        Self {
            pipeline,
            clock,
            state: DeliveryState::Buffering,
            queue: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            settled_through: 0,
            pending_drops: None,
            diagnostics,
            events,
        }
    }

    pub fn state(&self) -> DeliveryState {
        self.state
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Sequence ids currently waiting, oldest first.
    pub fn queued_ids(&self) -> Vec<SequenceId> {
        self.queue.iter().map(ErrorDescriptor::sequence_id).collect()
    }

    pub fn settled_through(&self) -> u64 {
        self.settled_through
    }

    /// Evictions not yet reported to the pipeline.
    pub fn pending_drops(&self) -> u64 {
        self.pending_drops.map_or(0, |pending| pending.count)
    }

    /// Whether a readiness probe could move anything forward.
    pub fn has_pending_work(&self) -> bool {
        !self.queue.is_empty() || self.pending_drops.is_some()
    }

    /// Takes ownership of a descriptor arriving from the transport.
    ///
    /// Outside `Buffering` the queue is flushed right away.
    #[instrument(skip_all, fields(sequence_id = descriptor.sequence_id().value()))]
    pub async fn accept(&mut self, descriptor: ErrorDescriptor) {
        let sequence_id = descriptor.sequence_id();

        if sequence_id.value() <= self.settled_through {
            self.discard_duplicate(sequence_id, "already settled");
            return;
        }

        let position = match self
            .queue
            .binary_search_by_key(&sequence_id, ErrorDescriptor::sequence_id)
        {
            Ok(_) => {
                self.discard_duplicate(sequence_id, "already queued");
                return;
            }
            Err(position) => position,
        };

        if self.queue.len() >= self.capacity {
            if position == 0 {
                // Older than everything queued: the arrival is the oldest
                self.record_eviction(sequence_id);
                return;
            }
            self.evict_oldest();
            // Eviction shifted every position down by one
            self.queue.insert(position - 1, descriptor);
        } else {
            self.queue.insert(position, descriptor);
        }
        self.diagnostics.set_queued(self.queue.len());

        if self.state != DeliveryState::Buffering {
            self.drain().await;
        }
    }

    /// The pipeline reported itself ready.
    pub async fn on_ready(&mut self) {
        if self.state == DeliveryState::Buffering {
            self.transition(DeliveryState::Draining);
        }
        self.drain().await;
    }

    /// The pipeline reported itself unavailable.
    pub fn on_unavailable(&mut self) {
        if self.state != DeliveryState::Buffering {
            self.transition(DeliveryState::Buffering);
        }
    }

    /// Asks the pipeline whether it is ready while work is waiting.
    pub async fn poll_readiness(&mut self) {
        if self.state != DeliveryState::Buffering || !self.has_pending_work() {
            return;
        }

        if self.pipeline.is_ready().await {
            debug!("Readiness poll succeeded");
            self.on_ready().await;
        }
    }

    /// Hands queued descriptors to the pipeline, oldest first.
    ///
    /// Stops at the first transient failure, leaving that descriptor at the
    /// head and the guard in `Buffering`. A `Live` guard stays `Live`.
    #[instrument(skip_all, fields(queued = self.queue.len()))]
    pub async fn drain(&mut self) {
        if self.state == DeliveryState::Buffering {
            return;
        }

        loop {
            let Some(head) = self.queue.front() else {
                break;
            };
            let sequence_id = head.sequence_id();
            let outcome = self.pipeline.record(head).await;

            match outcome {
                Ok(ack) => {
                    self.settle(sequence_id);
                    self.diagnostics.record_delivered();
                    debug!(
                        sequence_id = sequence_id.value(),
                        receipt = ack.receipt_id.as_deref().unwrap_or("-"),
                        "Descriptor delivered"
                    );
                    self.emit(DeliveryEvent::Delivered {
                        sequence_id: sequence_id.value(),
                    });
                }
                Err(RejectKind::Permanent(reason)) => {
                    self.settle(sequence_id);
                    self.diagnostics.record_rejected();
                    warn!(
                        sequence_id = sequence_id.value(),
                        reason = %reason,
                        "Pipeline rejected descriptor; dropping it"
                    );
                    self.emit(DeliveryEvent::Rejected {
                        sequence_id: sequence_id.value(),
                        reason,
                    });
                }
                Err(RejectKind::Transient(reason)) => {
                    self.diagnostics.record_transient_failure();
                    warn!(
                        sequence_id = sequence_id.value(),
                        reason = %reason,
                        "Pipeline temporarily unavailable; will retry"
                    );
                    self.emit(DeliveryEvent::TransientFailure {
                        sequence_id: sequence_id.value(),
                        reason,
                    });
                    self.transition(DeliveryState::Buffering);
                    return;
                }
            }
        }

        if !self.report_drops().await {
            self.transition(DeliveryState::Buffering);
            return;
        }

        if self.state != DeliveryState::Live {
            self.transition(DeliveryState::Live);
        }
    }

    /// Removes the head after a final outcome and raises the settled mark.
    fn settle(&mut self, sequence_id: SequenceId) {
        self.queue.pop_front();
        self.settled_through = self.settled_through.max(sequence_id.value());
        self.diagnostics.set_queued(self.queue.len());
    }

    /// Drops everything still queued and counts it as lost.
    ///
    /// Called once by the worker on its way out. Returns how many
    /// descriptors were abandoned.
    pub fn abandon(&mut self) -> u64 {
        let (Some(first), Some(last)) = (self.queue.front(), self.queue.back()) else {
            return 0;
        };
        let (first, last) = (first.sequence_id().value(), last.sequence_id().value());
        let abandoned = self.queue.len() as u64;

        self.queue.clear();
        self.diagnostics.set_queued(0);
        self.diagnostics.record_abandoned(abandoned);
        warn!(
            abandoned,
            first_sequence_id = first,
            last_sequence_id = last,
            state = %self.state,
            unreported_drops = self.pending_drops(),
            "Worker stopping with descriptors still queued; abandoning them"
        );
        self.emit(DeliveryEvent::Abandoned { count: abandoned });
        abandoned
    }

    fn evict_oldest(&mut self) {
        if let Some(evicted) = self.queue.pop_front() {
            self.record_eviction(evicted.sequence_id());
        }
    }

    /// Counts `sequence_id` as evicted and settles it.
    fn record_eviction(&mut self, sequence_id: SequenceId) {
        self.settled_through = self.settled_through.max(sequence_id.value());

        match self.pending_drops.as_mut() {
            Some(pending) => pending.add(sequence_id),
            None => self.pending_drops = Some(PendingDrops::starting_at(sequence_id)),
        }
        let pending_drops = self.pending_drops();

        self.diagnostics.record_evicted();
        warn!(
            sequence_id = sequence_id.value(),
            pending_drops,
            capacity = self.capacity,
            "Delivery queue full; evicted oldest descriptor"
        );
        self.emit(DeliveryEvent::Evicted {
            sequence_id: sequence_id.value(),
            pending_drops,
        });
    }

    /// Reports pending evictions. Returns `false` on a transient failure.
    async fn report_drops(&mut self) -> bool {
        let Some(pending) = self.pending_drops else {
            return true;
        };

        let report = DropReport {
            dropped: pending.count,
            first_dropped: pending.first,
            last_dropped: pending.last,
            reported_at_millis: self.clock.unix_timestamp_millis(),
        };

        match self.pipeline.record_drop_report(&report).await {
            Ok(_) => {
                self.pending_drops = None;
                self.diagnostics.record_drop_report();
                warn!(dropped = report.dropped, "{}", report.message());
                self.emit(DeliveryEvent::DropReported {
                    dropped: report.dropped,
                });
                true
            }
            Err(RejectKind::Permanent(reason)) => {
                self.pending_drops = None;
                warn!(
                    dropped = report.dropped,
                    reason = %reason,
                    "Pipeline rejected drop report"
                );
                true
            }
            Err(RejectKind::Transient(reason)) => {
                debug!(reason = %reason, "Drop report deferred");
                false
            }
        }
    }

    fn discard_duplicate(&self, sequence_id: SequenceId, why: &str) {
        self.diagnostics.record_duplicate();
        debug!(sequence_id = sequence_id.value(), why, "Duplicate descriptor discarded");
        self.emit(DeliveryEvent::DuplicateDiscarded {
            sequence_id: sequence_id.value(),
        });
    }

    fn transition(&mut self, to: DeliveryState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        info!(%from, %to, queued = self.queue.len(), "Delivery state changed");
        self.emit(DeliveryEvent::StateChanged { from, to });
    }

    fn emit(&self, event: DeliveryEvent) {
        // No subscribers is fine
        let _ = self.events.emit(CoreEvent::Delivery(event));
    }
}

impl std::fmt::Debug for DeliveryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryGuard")
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .field("capacity", &self.capacity)
            .field("settled_through", &self.settled_through)
            .field("pending_drops", &self.pending_drops())
            .finish()
    }
}
