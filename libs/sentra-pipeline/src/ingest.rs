use std::collections::HashMap;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use opentelemetry::trace::{SpanBuilder, SpanKind};
use opentelemetry::{Context, KeyValue};

use sentra_api::{
    Admission, FeedError, IncomingUpdate, LogAdmin, LogPublisher, LogRecord, RejectReason, TopicSpec, UpdateRecord,
};

use crate::error::{IngestError, PipelineError};
use crate::telemetry::{end_ok, end_with_error, Telemetry};

/// What the ingest front does with an update it cannot admit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RejectPolicy {
    /// Drop the item and keep reading the stream.
    #[default]
    Skip,
    /// Abort the call on the first rejected item.
    Fail,
}

impl std::str::FromStr for RejectPolicy {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(RejectPolicy::Skip),
            "fail" => Ok(RejectPolicy::Fail),
            other => Err(FeedError::config(format!("unknown reject policy '{other}' (expected skip or fail)"))),
        }
    }
}

impl std::fmt::Display for RejectPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectPolicy::Skip => f.write_str("skip"),
            RejectPolicy::Fail => f.write_str("fail"),
        }
    }
}

/// Result of one fully consumed caller stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Updates published to the log.
    pub accepted: usize,
    /// Dropped updates per reason.
    pub rejected: HashMap<RejectReason, usize>,
    /// Accepted updates whose NaN or infinite price was published as 0.
    pub zeroed_prices: usize,
}

impl IngestSummary {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    pub fn rejected_for(&self, reason: RejectReason) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    /// Ack text returned to the caller.
    pub fn message(&self) -> String {
        format!("ingested {}", self.accepted)
    }
}

// ═══════════════════════════════════════════════════════════════
//  IngestFront
// ═══════════════════════════════════════════════════════════════

/// Validates caller updates and publishes them to the log, keyed by SKU,
/// with the trace context attached as headers.
pub struct IngestFront {
    publisher: Arc<dyn LogPublisher>,
    telemetry: Telemetry,
    topic: String,
    policy: RejectPolicy,
}

impl IngestFront {
    pub fn new(publisher: Arc<dyn LogPublisher>, telemetry: Telemetry, topic: impl Into<String>) -> Self {
        Self { publisher, telemetry, topic: topic.into(), policy: RejectPolicy::default() }
    }

    pub fn with_policy(mut self, policy: RejectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Admission plus price normalization. JSON has no NaN or infinity,
    /// so a non-finite price is published as 0 and counted.
    fn admit(&self, update: IncomingUpdate, summary: &mut IngestSummary) -> Admission {
        match update.admit() {
            Admission::Accepted(mut record) if !record.price.is_finite() => {
                tracing::warn!(topic = %self.topic, sku = %record.sku, price = record.price, "non-finite price published as 0");
                record.price = 0.0;
                summary.zeroed_prices += 1;
                Admission::Accepted(record)
            }
            admission => admission,
        }
    }

    /// Publish one admitted update inside a producer span whose parent is `cx`.
    pub async fn publish(&self, cx: &Context, update: &UpdateRecord) -> Result<(), IngestError> {
        let builder = SpanBuilder::from_name(format!("{} publish", self.topic))
            .with_kind(SpanKind::Producer)
            .with_attributes(vec![
                KeyValue::new("messaging.system", "kafka"),
                KeyValue::new("messaging.destination.name", self.topic.clone()),
                KeyValue::new("messaging.kafka.message.key", update.sku.clone()),
            ]);
        let span_cx = self.telemetry.start(builder, cx);

        let result = match update.encode() {
            Ok(value) => {
                let record = LogRecord {
                    key: update.sku.clone(),
                    value,
                    headers: self.telemetry.inject(&span_cx),
                };
                self.publisher.publish(record).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                end_ok(&span_cx);
                Ok(())
            }
            Err(e) => {
                end_with_error(&span_cx, &e);
                Err(IngestError::Publish(e))
            }
        }
    }

    /// Drain one caller stream. Returns the summary once the caller closes
    /// the stream; the first publish or stream error aborts the call.
    pub async fn ingest<S, E>(&self, cx: &Context, updates: S) -> Result<IngestSummary, IngestError>
    where
        S: Stream<Item = Result<IncomingUpdate, E>>,
        E: std::fmt::Display,
    {
        let mut updates = std::pin::pin!(updates);
        let mut summary = IngestSummary::default();

        while let Some(item) = updates.next().await {
            let update = item.map_err(|e| IngestError::Stream(e.to_string()))?;
            match self.admit(update, &mut summary) {
                Admission::Accepted(record) => {
                    if let Err(e) = self.publish(cx, &record).await {
                        tracing::error!(topic = %self.topic, sku = %record.sku, error = %e, "publish failed, aborting call");
                        return Err(e);
                    }
                    summary.accepted += 1;
                }
                Admission::Rejected { reason } => {
                    if self.policy == RejectPolicy::Fail {
                        tracing::warn!(topic = %self.topic, %reason, "rejected update, aborting call");
                        return Err(IngestError::Rejected(reason));
                    }
                    tracing::debug!(topic = %self.topic, %reason, "rejected update, skipping");
                    *summary.rejected.entry(reason).or_default() += 1;
                }
            }
        }

        tracing::info!(
            topic = %self.topic,
            accepted = summary.accepted,
            rejected = summary.rejected_total(),
            zeroed_prices = summary.zeroed_prices,
            "ingest stream finished"
        );
        Ok(summary)
    }
}

/// Create the topic unless it already exists.
pub async fn provision(admin: &dyn LogAdmin, spec: &TopicSpec) -> Result<bool, PipelineError> {
    let created = admin.ensure_topic(spec).await.map_err(PipelineError::Provision)?;
    if created {
        tracing::info!(
            topic = %spec.name,
            partitions = spec.partitions,
            replication = spec.replication,
            "topic created"
        );
    } else {
        tracing::info!(topic = %spec.name, "topic already exists");
    }
    Ok(created)
}
