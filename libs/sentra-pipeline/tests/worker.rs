mod common;

use std::time::Duration;

use opentelemetry::Context;
use tokio_util::sync::CancellationToken;

use common::{stream, update, Harness, GROUP, TOPIC};
use sentra_api::{FeedError, LatestValueStore};
use sentra_pipeline::{PipelineError, RetryPolicy, Worker, WorkerOptions};

fn fast_retry(attempts: u32) -> WorkerOptions {
    WorkerOptions {
        startup: RetryPolicy { attempts, backoff: Duration::from_millis(1) },
        ..Default::default()
    }
}

#[tokio::test]
async fn bootstrap_retries_until_stores_answer() {
    let h = Harness::new().await;
    h.latest.fail_probes(2).await;
    h.series.fail_probes(1).await;

    Worker::bootstrap(h.deps(), fast_retry(5)).await.unwrap();
    assert_eq!(h.latest.ping_count(), 3);
    assert_eq!(h.series.schema_calls(), 2);
    assert!(h.series.schema_ready());
}

#[tokio::test]
async fn bootstrap_gives_up_after_bounded_attempts() {
    let h = Harness::new().await;
    h.latest.fail_probes(10).await;

    let err = Worker::bootstrap(h.deps(), fast_retry(3)).await.err().unwrap();
    assert!(matches!(err, PipelineError::Startup { dependency: "latest-value store", .. }));
    assert_eq!(h.latest.ping_count(), 3);
    assert_eq!(h.series.schema_calls(), 0);
}

#[tokio::test]
async fn schema_bootstrap_is_idempotent() {
    let h = Harness::new().await;
    h.worker(WorkerOptions::default()).await;
    h.worker(WorkerOptions::default()).await;
    assert_eq!(h.series.schema_calls(), 2);

    h.front().ingest(&Context::new(), stream(vec![update("SKU-1", 1.0, 1, Some(1))])).await.unwrap();
    h.drain(WorkerOptions::default()).await;
    assert_eq!(h.series.rows().await.len(), 1);
}

#[tokio::test]
async fn unacked_progress_is_redelivered_after_a_crash() {
    let h = Harness::new().await;
    h.front()
        .ingest(&Context::new(), stream(vec![update("SKU-1", 1.0, 1, Some(1)), update("SKU-1", 2.0, 2, Some(2))]))
        .await
        .unwrap();
    h.log.close().await;

    let worker = h.worker(WorkerOptions::default()).await;
    let mut crashed = h.log.subscribe(TOPIC, GROUP);
    let stats = worker.consumer().run(&mut crashed, CancellationToken::new()).await;
    assert_eq!(stats.applied, 2);
    drop(crashed);

    let report = h.drain(WorkerOptions::default()).await;
    assert_eq!(report.stats.applied, 2);
    assert_eq!(h.series.rows().await.len(), 4);
    assert_eq!(h.latest.get("SKU-1").await.unwrap().map(|r| r.timestamp_ms), Some(2));
}

#[tokio::test]
async fn cancellation_stops_an_idle_consumer() {
    let h = Harness::new().await;
    let worker = h.worker(WorkerOptions::default()).await;
    let token = CancellationToken::new();

    let run = tokio::spawn({
        let subscription = Box::new(h.log.subscribe(TOPIC, GROUP));
        let token = token.clone();
        async move { worker.run(subscription, token).await }
    });
    h.front().ingest(&Context::new(), stream(vec![update("SKU-1", 1.0, 1, Some(1))])).await.unwrap();
    while h.series.rows().await.is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    token.cancel();

    let report = run.await.unwrap();
    assert_eq!(report.stats.applied, 1);
    assert!(report.is_clean());
    assert!(h.latest.is_closed());
    assert!(h.series.is_closed());
    let partition = storage_memory::partition_for("SKU-1", 3);
    assert_eq!(h.log.committed(GROUP, TOPIC, partition).await, Some(1));
}

#[tokio::test]
async fn shutdown_closes_everything_even_if_one_close_fails() {
    let h = Harness::new().await;
    h.latest.fail_close(Some(FeedError::io("redis gone"))).await;

    let report = h.drain(WorkerOptions::default()).await;
    assert!(!report.is_clean());
    assert!(report.subscription.is_ok());
    assert!(report.latest.is_err());
    assert!(report.series.is_ok());
    assert!(h.latest.is_closed());
    assert!(h.series.is_closed());
}

#[tokio::test]
async fn poll_error_does_not_stop_the_loop() {
    let h = Harness::new().await;
    h.log.inject_recv_error(FeedError::io("broker blip")).await;
    h.front().ingest(&Context::new(), stream(vec![update("SKU-1", 1.0, 1, Some(1))])).await.unwrap();

    let report = h.drain(WorkerOptions::default()).await;
    assert_eq!(report.stats.processed, 1);
    assert_eq!(report.stats.applied, 1);
    assert_eq!(h.latest.get("SKU-1").await.unwrap().map(|r| r.price), Some(1.0));
}

#[tokio::test(start_paused = true)]
async fn cancellation_lets_the_in_flight_write_finish() {
    let h = Harness::new().await;
    h.latest.delay_writes(Some(Duration::from_secs(5))).await;
    let worker = h.worker(WorkerOptions::default()).await;
    let token = CancellationToken::new();

    let run = tokio::spawn({
        let subscription = Box::new(h.log.subscribe(TOPIC, GROUP));
        let token = token.clone();
        async move { worker.run(subscription, token).await }
    });
    h.front().ingest(&Context::new(), stream(vec![update("SKU-1", 1.0, 1, Some(1))])).await.unwrap();
    while h.series.rows().await.is_empty() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(h.latest.get("SKU-1").await.unwrap(), None);
    token.cancel();

    let report = run.await.unwrap();
    assert_eq!(report.stats.applied, 1);
    assert_eq!(h.latest.get("SKU-1").await.unwrap().map(|r| r.timestamp_ms), Some(1));
    let partition = storage_memory::partition_for("SKU-1", 3);
    assert_eq!(h.log.committed(GROUP, TOPIC, partition).await, Some(1));
}
