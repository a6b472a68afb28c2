use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use sentra_api::{DeadLetterSink, FeedError, LatestValueStore, LogSubscription, TimeSeriesStore, UpsertMode};

use crate::consumer::{ConsumerStats, PartitionConsumer};
use crate::error::PipelineError;
use crate::fanout::FanoutSink;
use crate::telemetry::Telemetry;

/// Bounded retry of a startup dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, at least one.
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 5, backoff: Duration::from_millis(1000) }
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
pub async fn retry<T, F, Fut>(dependency: &'static str, policy: RetryPolicy, mut op: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FeedError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                tracing::warn!(dependency, attempt, attempts, error = %e, "dependency not ready, retrying");
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(dependency, attempts, error = %e, "dependency unavailable");
                return Err(PipelineError::Startup { dependency, source: e });
            }
        }
    }
}

pub struct WorkerDeps {
    pub latest: Arc<dyn LatestValueStore>,
    pub series: Arc<dyn TimeSeriesStore>,
    pub dead_letters: Option<Arc<dyn DeadLetterSink>>,
    pub telemetry: Telemetry,
}

#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    pub upsert_mode: UpsertMode,
    pub write_timeout: Option<Duration>,
    pub startup: RetryPolicy,
}

/// Close outcome of every dependency, in shutdown order.
#[derive(Debug)]
pub struct WorkerReport {
    pub stats: ConsumerStats,
    pub subscription: Result<(), FeedError>,
    pub latest: Result<(), FeedError>,
    pub series: Result<(), FeedError>,
}

impl WorkerReport {
    pub fn is_clean(&self) -> bool {
        self.subscription.is_ok() && self.latest.is_ok() && self.series.is_ok()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Worker
// ═══════════════════════════════════════════════════════════════

pub struct Worker {
    consumer: PartitionConsumer,
    latest: Arc<dyn LatestValueStore>,
    series: Arc<dyn TimeSeriesStore>,
}

impl Worker {
    /// Reach both stores before anything is consumed: ping the latest-value
    /// store, then make sure the time-series table exists.
    pub async fn bootstrap(deps: WorkerDeps, options: WorkerOptions) -> Result<Self, PipelineError> {
        let WorkerDeps { latest, series, dead_letters, telemetry } = deps;

        retry("latest-value store", options.startup, || latest.ping()).await?;
        tracing::info!(system = latest.system(), "latest-value store ready");

        retry("time-series store", options.startup, || series.ensure_schema()).await?;
        tracing::info!(system = series.system(), "time-series schema ready");

        let sink = FanoutSink::new(latest.clone(), series.clone(), telemetry.clone())
            .with_mode(options.upsert_mode)
            .with_write_timeout(options.write_timeout);
        let consumer = PartitionConsumer::new(sink, telemetry).with_dead_letters(dead_letters);

        Ok(Self { consumer, latest, series })
    }

    pub fn consumer(&self) -> &PartitionConsumer {
        &self.consumer
    }

    /// Consume until cancelled, then leave the group and close both stores.
    /// Each close step runs even if an earlier one failed.
    pub async fn run(self, mut subscription: Box<dyn LogSubscription>, token: CancellationToken) -> WorkerReport {
        let stats = self.consumer.run(subscription.as_mut(), token).await;

        let subscription = subscription.close().await;
        log_close("subscription", &subscription);
        let latest = self.latest.close().await;
        log_close("latest-value store", &latest);
        let series = self.series.close().await;
        log_close("time-series store", &series);

        WorkerReport { stats, subscription, latest, series }
    }
}

fn log_close(what: &'static str, result: &Result<(), FeedError>) {
    match result {
        Ok(()) => tracing::info!(dependency = what, "closed"),
        Err(e) => tracing::warn!(dependency = what, error = %e, "close failed"),
    }
}
