use std::sync::Arc;

use opentelemetry::trace::{SpanBuilder, SpanKind};
use opentelemetry::KeyValue;
use tokio_util::sync::CancellationToken;

use sentra_api::{DeadLetter, DeadLetterReason, DeadLetterSink, Delivery, LogSubscription, UpdateRecord, UpsertOutcome};

use crate::fanout::FanoutSink;
use crate::telemetry::{end_ok, end_with_error, Telemetry};

/// What happened to one delivered record. Every variant lets the
/// partition move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Both writes succeeded (the upsert may have been refused as stale).
    Applied(UpsertOutcome),
    /// The value could not be decoded.
    Skipped { dead_lettered: bool },
    /// At least one fan-out write failed.
    Failed { dead_lettered: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub processed: u64,
    pub applied: u64,
    pub stale: u64,
    pub skipped: u64,
    pub failed: u64,
    pub dead_lettered: u64,
}

impl ConsumerStats {
    fn record(&mut self, outcome: RecordOutcome) {
        self.processed += 1;
        match outcome {
            RecordOutcome::Applied(upsert) => {
                self.applied += 1;
                if upsert == UpsertOutcome::Stale {
                    self.stale += 1;
                }
            }
            RecordOutcome::Skipped { dead_lettered } => {
                self.skipped += 1;
                self.dead_lettered += u64::from(dead_lettered);
            }
            RecordOutcome::Failed { dead_lettered } => {
                self.failed += 1;
                self.dead_lettered += u64::from(dead_lettered);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  PartitionConsumer
// ═══════════════════════════════════════════════════════════════

/// Drives records from a subscription through the fan-out sink, one at a
/// time, in delivery order.
pub struct PartitionConsumer {
    sink: FanoutSink,
    telemetry: Telemetry,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl PartitionConsumer {
    pub fn new(sink: FanoutSink, telemetry: Telemetry) -> Self {
        Self { sink, telemetry, dead_letters: None }
    }

    pub fn with_dead_letters(mut self, sink: Option<Arc<dyn DeadLetterSink>>) -> Self {
        self.dead_letters = sink;
        self
    }

    /// Process one record. Never fails: decode and write errors are logged,
    /// recorded on the span and routed to the dead-letter sink.
    pub async fn process(&self, delivery: &Delivery) -> RecordOutcome {
        let update = match UpdateRecord::decode(delivery.payload.as_deref()) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    key = %delivery.key_str(),
                    payload = %delivery.payload_lossy(),
                    error = %e,
                    "undecodable record, skipping"
                );
                let dead_lettered = self.dead_letter(delivery, DeadLetterReason::Decode, e.to_string()).await;
                return RecordOutcome::Skipped { dead_lettered };
            }
        };

        let parent = self.telemetry.extract(&delivery.carrier());
        let builder = SpanBuilder::from_name(format!("{} process", delivery.topic))
            .with_kind(SpanKind::Consumer)
            .with_attributes(vec![
                KeyValue::new("messaging.system", "kafka"),
                KeyValue::new("messaging.destination.name", delivery.topic.clone()),
                KeyValue::new("messaging.kafka.destination.partition", i64::from(delivery.partition)),
                KeyValue::new("messaging.kafka.message.key", delivery.key_str().to_string()),
                KeyValue::new("messaging.kafka.message.offset", delivery.offset),
            ]);
        let cx = self.telemetry.start(builder, &parent);

        match self.sink.write(&cx, &update).await {
            Ok(upsert) => {
                if upsert == UpsertOutcome::Stale {
                    tracing::debug!(sku = %update.sku, ts_ms = update.timestamp_ms, "older than stored latest value");
                }
                end_ok(&cx);
                RecordOutcome::Applied(upsert)
            }
            Err(e) => {
                end_with_error(&cx, &e);
                tracing::error!(
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    key = %delivery.key_str(),
                    payload = %delivery.payload_lossy(),
                    error = %e,
                    "fan-out failed"
                );
                let dead_lettered = self.dead_letter(delivery, DeadLetterReason::Sink, e.to_string()).await;
                RecordOutcome::Failed { dead_lettered }
            }
        }
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: DeadLetterReason, error: String) -> bool {
        let Some(sink) = &self.dead_letters else {
            return false;
        };
        let letter = DeadLetter { delivery: delivery.clone(), reason, error };
        match sink.send(letter).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    %reason,
                    error = %e,
                    "dead letter failed"
                );
                false
            }
        }
    }

    /// Consume until `token` is cancelled or the subscription ends.
    ///
    /// Cancellation only interrupts waiting for the next record; a record
    /// already being processed is finished and acked first.
    pub async fn run(&self, subscription: &mut dyn LogSubscription, token: CancellationToken) -> ConsumerStats {
        let mut stats = ConsumerStats::default();

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("stop requested, no more records will be pulled");
                    break;
                }
                next = subscription.recv() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "poll error");
                    continue;
                }
                None => {
                    tracing::info!("subscription closed");
                    break;
                }
            };

            let outcome = self.process(&delivery).await;
            stats.record(outcome);

            if let Err(e) = subscription.ack(&delivery) {
                tracing::warn!(
                    topic = %delivery.topic,
                    partition = delivery.partition,
                    offset = delivery.offset,
                    error = %e,
                    "offset store failed"
                );
            }
        }

        tracing::info!(
            processed = stats.processed,
            applied = stats.applied,
            skipped = stats.skipped,
            failed = stats.failed,
            "consumer stopped"
        );
        stats
    }
}
