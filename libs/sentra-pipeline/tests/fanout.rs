mod common;

use std::time::Duration;

use opentelemetry::Context;

use common::{stream, update, Harness, TOPIC};
use sentra_api::{DeadLetterReason, FeedError, LatestValueStore, UpdateRecord, UpsertMode};
use sentra_pipeline::{RecordOutcome, WorkerOptions};

#[tokio::test]
async fn series_failure_does_not_block_latest_value() {
    let h = Harness::new().await;
    h.front()
        .ingest(&Context::new(), stream(vec![update("SKU-1", 10.0, 1, Some(1)), update("SKU-1", 11.0, 2, Some(2))]))
        .await
        .unwrap();

    let worker = h.worker(WorkerOptions::default()).await;
    h.series.fail_writes(Some(FeedError::io("clickhouse down"))).await;

    let records = h.log.records(TOPIC).await;
    for delivery in &records {
        let outcome = worker.consumer().process(delivery).await;
        assert_eq!(outcome, RecordOutcome::Failed { dead_lettered: true });
    }

    assert_eq!(h.latest.get("SKU-1").await.unwrap(), Some(UpdateRecord::new("SKU-1", 11.0, 2, 2)));
    assert!(h.series.rows().await.is_empty());
}

#[tokio::test]
async fn latest_value_failure_does_not_block_series() {
    let h = Harness::new().await;
    h.latest.fail_writes(Some(FeedError::io("redis down"))).await;
    h.front()
        .ingest(&Context::new(), stream(vec![update("SKU-1", 10.0, 1, Some(1)), update("SKU-2", 11.0, 2, Some(2))]))
        .await
        .unwrap();

    let report = h.drain(WorkerOptions::default()).await;
    assert_eq!(report.stats.failed, 2);
    assert_eq!(report.stats.processed, 2);

    assert_eq!(h.series.rows().await.len(), 2);
    assert!(h.latest.is_empty().await);

    let letters = h.dead_letters.letters().await;
    assert_eq!(letters.len(), 2);
    assert!(letters.iter().all(|l| l.reason == DeadLetterReason::Sink));
    assert!(letters[0].error.contains("redis down"));
}

#[tokio::test]
async fn failed_records_still_advance_the_partition() {
    let h = Harness::new().await;
    h.latest.fail_writes(Some(FeedError::io("redis down"))).await;
    h.front()
        .ingest(&Context::new(), stream(vec![update("SKU-1", 1.0, 1, Some(1)), update("SKU-1", 2.0, 2, Some(2))]))
        .await
        .unwrap();

    let report = h.drain(WorkerOptions::default()).await;
    assert!(report.is_clean());

    let partition = storage_memory::partition_for("SKU-1", 3);
    assert_eq!(h.log.committed(common::GROUP, TOPIC, partition).await, Some(2));
}

#[tokio::test]
async fn undecodable_record_is_skipped_and_dead_lettered() {
    let h = Harness::new().await;
    h.log.append_raw(TOPIC, Some("SKU-1"), Some(b"{not json".to_vec()), Vec::new()).await.unwrap();
    h.log.append_raw(TOPIC, Some("SKU-1"), None, Vec::new()).await.unwrap();
    h.front().ingest(&Context::new(), stream(vec![update("SKU-1", 3.0, 3, Some(3))])).await.unwrap();

    let report = h.drain(WorkerOptions::default()).await;
    assert_eq!(report.stats.skipped, 2);
    assert_eq!(report.stats.applied, 1);
    assert_eq!(report.stats.dead_lettered, 2);

    let letters = h.dead_letters.letters().await;
    assert!(letters.iter().all(|l| l.reason == DeadLetterReason::Decode));
    assert_eq!(letters[0].delivery.payload.as_deref(), Some(&b"{not json"[..]));
    assert_eq!(letters.iter().map(|l| l.delivery.offset).collect::<Vec<_>>(), [0, 1]);

    assert_eq!(h.series.rows().await, vec![UpdateRecord::new("SKU-1", 3.0, 3, 3)]);
}

#[tokio::test]
async fn dead_letter_failure_never_blocks() {
    let h = Harness::new().await;
    h.dead_letters.fail_sends(Some(FeedError::io("dlq down"))).await;
    h.log.append_raw(TOPIC, Some("SKU-1"), Some(b"garbage".to_vec()), Vec::new()).await.unwrap();
    h.front().ingest(&Context::new(), stream(vec![update("SKU-1", 1.0, 1, Some(1))])).await.unwrap();

    let report = h.drain(WorkerOptions::default()).await;
    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.stats.dead_lettered, 0);
    assert_eq!(report.stats.applied, 1);
}

#[tokio::test]
async fn newer_wins_keeps_the_latest_timestamp() {
    let h = Harness::new().await;
    let updates = vec![update("SKU-1", 102.0, 48, Some(1001)), update("SKU-1", 101.0, 49, Some(1000))];
    h.front().ingest(&Context::new(), stream(updates)).await.unwrap();

    let report = h.drain(WorkerOptions::default()).await;
    assert_eq!(report.stats.applied, 2);
    assert_eq!(report.stats.stale, 1);

    assert_eq!(h.latest.get("SKU-1").await.unwrap(), Some(UpdateRecord::new("SKU-1", 102.0, 48, 1001)));
    assert_eq!(h.series.rows().await.len(), 2);
}

#[tokio::test]
async fn last_write_wins_follows_arrival_order() {
    let h = Harness::new().await;
    let updates = vec![update("SKU-1", 102.0, 48, Some(1001)), update("SKU-1", 101.0, 49, Some(1000))];
    h.front().ingest(&Context::new(), stream(updates)).await.unwrap();

    let options = WorkerOptions { upsert_mode: UpsertMode::LastWriteWins, ..Default::default() };
    let report = h.drain(options).await;
    assert_eq!(report.stats.stale, 0);
    assert_eq!(h.latest.get("SKU-1").await.unwrap(), Some(UpdateRecord::new("SKU-1", 101.0, 49, 1000)));
}

#[tokio::test(start_paused = true)]
async fn hung_write_times_out_alone() {
    let h = Harness::new().await;
    h.latest.delay_writes(Some(Duration::from_secs(60))).await;
    h.front().ingest(&Context::new(), stream(vec![update("SKU-1", 1.0, 1, Some(1))])).await.unwrap();

    let options = WorkerOptions { write_timeout: Some(Duration::from_millis(500)), ..Default::default() };
    let report = h.drain(options).await;
    assert_eq!(report.stats.failed, 1);
    assert_eq!(h.series.rows().await.len(), 1);

    let letters = h.dead_letters.letters().await;
    assert!(letters[0].error.contains("timed out"));
}
