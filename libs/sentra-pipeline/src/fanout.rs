use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::trace::{SpanBuilder, SpanKind, TraceContextExt};
use opentelemetry::{Context, KeyValue};

use sentra_api::{FeedError, LatestValueStore, TimeSeriesStore, UpdateRecord, UpsertMode, UpsertOutcome};

use crate::error::FanoutError;
use crate::telemetry::{end_ok, end_with_error, Telemetry};

/// Writes one decoded update to both stores at once.
///
/// The two writes run concurrently and both finish before `write`
/// returns. A failure of one never hides or cancels the other, and
/// nothing is retried here.
pub struct FanoutSink {
    latest: Arc<dyn LatestValueStore>,
    series: Arc<dyn TimeSeriesStore>,
    telemetry: Telemetry,
    mode: UpsertMode,
    write_timeout: Option<Duration>,
}

impl FanoutSink {
    pub fn new(latest: Arc<dyn LatestValueStore>, series: Arc<dyn TimeSeriesStore>, telemetry: Telemetry) -> Self {
        Self { latest, series, telemetry, mode: UpsertMode::default(), write_timeout: None }
    }

    pub fn with_mode(mut self, mode: UpsertMode) -> Self {
        self.mode = mode;
        self
    }

    /// Bound each write; an elapsed timeout fails that write only.
    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub async fn write(&self, cx: &Context, update: &UpdateRecord) -> Result<UpsertOutcome, FanoutError> {
        let latest_cx = self.child(cx, self.latest.system(), "upsert", update);
        let series_cx = self.child(cx, self.series.system(), "insert", update);

        let (latest, series) = tokio::join!(
            self.bounded(self.latest.upsert(update, self.mode)),
            self.bounded(self.series.append(update)),
        );

        match &latest {
            Ok(UpsertOutcome::Stale) => {
                latest_cx.span().add_event("stale update refused", vec![]);
                end_ok(&latest_cx);
            }
            Ok(UpsertOutcome::Applied) => end_ok(&latest_cx),
            Err(e) => end_with_error(&latest_cx, e),
        }
        match &series {
            Ok(()) => end_ok(&series_cx),
            Err(e) => end_with_error(&series_cx, e),
        }

        match (latest, series) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (latest, series) => Err(FanoutError { latest: latest.err(), series: series.err() }),
        }
    }

    fn child(&self, cx: &Context, system: &'static str, operation: &'static str, update: &UpdateRecord) -> Context {
        let builder = SpanBuilder::from_name(format!("{system} {operation}"))
            .with_kind(SpanKind::Client)
            .with_attributes(vec![
                KeyValue::new("db.system", system),
                KeyValue::new("db.operation", operation),
                KeyValue::new("sentra.sku", update.sku.clone()),
            ]);
        self.telemetry.start(builder, cx)
    }

    async fn bounded<T>(&self, write: impl Future<Output = Result<T, FeedError>>) -> Result<T, FeedError> {
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .unwrap_or_else(|_| Err(FeedError::io(format!("write timed out after {} ms", limit.as_millis())))),
            None => write.await,
        }
    }
}
