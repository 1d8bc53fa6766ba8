//! Native worker: the single task that owns the [`DeliveryGuard`].
//!
//! Inputs are merged in one loop: transport messages, the pipeline's
//! readiness feed (when it has one) and an optional poll ticker.
//! `ReadinessStream::next` must be cancel safe; it is raced against the other
//! inputs on every iteration.
//!
//! On shutdown, or once every sender is gone, the channel is closed and
//! whatever was already sent is still processed. The pipeline gets one last
//! chance to take the queue; anything left is counted as abandoned.

use crate::diagnostics::Diagnostics;
use crate::guard::DeliveryGuard;
use crate::transport::{decode, WorkerMessage};
use bridge_traits::{AggregationPipeline, Readiness, ReadinessStream};
use core_async::sync::mpsc;
use core_async::time::{interval, Duration, Interval, MissedTickBehavior};
use core_runtime::events::{CoreEvent, DeliveryEvent, EventBus};
use std::future;
use std::sync::Arc;
use tracing::{debug, info, warn};

enum Input {
    Message(Option<WorkerMessage>),
    Readiness(Option<Readiness>),
    Tick,
}

pub(crate) struct NativeWorker {
    guard: DeliveryGuard,
    pipeline: Arc<dyn AggregationPipeline>,
    receiver: mpsc::UnboundedReceiver<WorkerMessage>,
    poll_interval: Option<Duration>,
    diagnostics: Arc<Diagnostics>,
    events: EventBus,
}

impl NativeWorker {
    pub(crate) fn new(
        guard: DeliveryGuard,
        pipeline: Arc<dyn AggregationPipeline>,
        receiver: mpsc::UnboundedReceiver<WorkerMessage>,
        poll_interval: Option<Duration>,
        diagnostics: Arc<Diagnostics>,
        events: EventBus,
    ) -> Self {
        Self {
            guard,
            pipeline,
            receiver,
            poll_interval,
            diagnostics,
            events,
        }
    }

    pub(crate) async fn run(mut self) {
        let mut feed = match self.pipeline.subscribe_readiness().await {
            Ok(stream) => Some(stream),
            Err(err) => {
                debug!(error = %err, "Pipeline has no readiness feed");
                None
            }
        };

        if self.pipeline.is_ready().await {
            self.guard.on_ready().await;
        }

        let mut ticker = self.poll_interval.map(|period| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker
        });

        info!(
            state = %self.guard.state(),
            readiness_feed = feed.is_some(),
            polling = ticker.is_some(),
            "Native worker started"
        );

        loop {
            let input = tokio::select! {
                biased;
                message = self.receiver.recv() => Input::Message(message),
                readiness = next_readiness(&mut feed) => Input::Readiness(readiness),
                _ = next_tick(&mut ticker) => Input::Tick,
            };

            match input {
                Input::Message(None) | Input::Message(Some(WorkerMessage::Shutdown)) => break,
                Input::Message(Some(message)) => self.handle(message).await,
                Input::Readiness(Some(readiness)) => self.on_readiness(readiness).await,
                Input::Readiness(None) => {
                    debug!("Readiness feed ended");
                    feed = None;
                }
                Input::Tick => self.guard.poll_readiness().await,
            }
        }

        self.wind_down().await;
    }

    async fn wind_down(&mut self) {
        self.receiver.close();
        let mut late = 0usize;
        while let Ok(message) = self.receiver.try_recv() {
            late += 1;
            self.handle(message).await;
        }

        self.guard.poll_readiness().await;
        self.guard.drain().await;
        let abandoned = self.guard.abandon();

        info!(
            state = %self.guard.state(),
            late_messages = late,
            abandoned,
            "Native worker stopped"
        );
    }

    async fn handle(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Descriptor(payload) => match decode(&payload) {
                Ok(descriptor) => self.guard.accept(descriptor).await,
                Err(err) => {
                    self.diagnostics.record_malformed_payload();
                    warn!(error = %err, bytes = payload.len(), "Dropping malformed payload");
                    let _ = self.events.emit(CoreEvent::Delivery(DeliveryEvent::MalformedPayload {
                        reason: err.to_string(),
                    }));
                }
            },
            WorkerMessage::Readiness(readiness) => self.on_readiness(readiness).await,
            WorkerMessage::Flush(ack) => {
                let _ = ack.send(());
            }
            WorkerMessage::Shutdown => {}
        }
    }

    async fn on_readiness(&mut self, readiness: Readiness) {
        match readiness {
            Readiness::Ready => self.guard.on_ready().await,
            Readiness::Unavailable => self.guard.on_unavailable(),
        }
    }
}

async fn next_readiness(feed: &mut Option<Box<dyn ReadinessStream>>) -> Option<Readiness> {
    match feed {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}
