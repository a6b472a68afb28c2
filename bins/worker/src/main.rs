mod config;
mod error;

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use config::{Effective, WorkerArgs};
use error::WorkerError;
use log_kafka::{KafkaAdmin, KafkaDeadLetters, KafkaSubscription};
use sentra_api::DeadLetterSink;
use sentra_pipeline::{cancel_on_signal, provision, retry, Telemetry, Worker, WorkerDeps};
use storage_clickhouse::ClickHouseSeries;
use storage_redis::RedisLatestStore;

#[tokio::main]
async fn main() {
    let args = WorkerArgs::parse();

    let eff = match Effective::new(&args) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = run(eff).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(eff: Effective) -> Result<(), WorkerError> {
    let guard = sentra_observability::init(eff.service_name.clone())?;
    let result = consume(eff).await;
    guard.shutdown();
    result
}

async fn consume(eff: Effective) -> Result<(), WorkerError> {
    tracing::info!(
        brokers = %eff.kafka.brokers,
        topic = %eff.topic.name,
        group = %eff.group_id,
        upsert_mode = %eff.options.upsert_mode,
        "worker starting"
    );

    if eff.provision_topic {
        // The gateway owns provisioning; a failure here is not fatal.
        let provisioned = match KafkaAdmin::new(&eff.kafka) {
            Ok(admin) => provision(&admin, &eff.topic).await.map(|_| ()).map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        if let Err(e) = provisioned {
            tracing::warn!(topic = %eff.topic.name, error = %e, "topic provisioning failed");
        }
    }

    // --- Stores ---
    let latest = retry("latest-value store", eff.options.startup, || {
        RedisLatestStore::connect(&eff.redis_url, eff.redis_prefix.clone())
    })
    .await?;
    let series = ClickHouseSeries::new(eff.clickhouse.clone())?;
    let dead_letters = match &eff.dead_letter_topic {
        Some(topic) => Some(Arc::new(KafkaDeadLetters::new(&eff.kafka, topic.clone())?) as Arc<dyn DeadLetterSink>),
        None => None,
    };

    let deps = WorkerDeps {
        latest: Arc::new(latest),
        series: Arc::new(series),
        dead_letters,
        telemetry: Telemetry::global("sentra-worker"),
    };
    let worker = Worker::bootstrap(deps, eff.options.clone()).await?;

    // --- Consume until signalled ---
    let subscription = KafkaSubscription::subscribe(&eff.kafka, &eff.group_id, eff.topic.name.clone())?;
    let token = CancellationToken::new();
    cancel_on_signal(token.clone());

    let report = worker.run(Box::new(subscription), token).await;
    tracing::info!(
        processed = report.stats.processed,
        applied = report.stats.applied,
        failed = report.stats.failed,
        skipped = report.stats.skipped,
        clean = report.is_clean(),
        "worker stopped"
    );
    Ok(())
}
