mod common;

use std::collections::HashMap;

use opentelemetry::Context;

use common::{stream, update, Harness, TOPIC};
use sentra_api::{FeedError, LatestValueStore, RejectReason, UpdateRecord};
use sentra_pipeline::{IngestError, RejectPolicy, WorkerOptions};
use storage_memory::partition_for;

#[tokio::test]
async fn two_updates_for_one_sku_land_in_both_stores() {
    let h = Harness::new().await;
    let updates = vec![
        update("SKU-1", 101.0, 49, Some(1000)),
        update("SKU-1", 102.0, 48, Some(1001)),
    ];

    let summary = h.front().ingest(&Context::new(), stream(updates)).await.unwrap();
    assert_eq!(summary.message(), "ingested 2");

    let report = h.drain(WorkerOptions::default()).await;
    assert_eq!(report.stats.applied, 2);

    let latest = h.latest.get("SKU-1").await.unwrap().unwrap();
    assert_eq!(latest, UpdateRecord::new("SKU-1", 102.0, 48, 1001));

    let ts: Vec<i64> = h.series.rows().await.iter().map(|r| r.timestamp_ms).collect();
    assert_eq!(ts, [1000, 1001]);
}

#[tokio::test]
async fn empty_sku_is_dropped_without_side_effects() {
    let h = Harness::new().await;

    let summary = h
        .front()
        .ingest(&Context::new(), stream(vec![update("", 5.0, 5, Some(1))]))
        .await
        .unwrap();
    assert_eq!(summary.message(), "ingested 0");
    assert_eq!(summary.rejected_total(), 1);
    assert_eq!(summary.rejected_for(RejectReason::MissingSku), 1);
    assert!(h.log.records(TOPIC).await.is_empty());

    let report = h.drain(WorkerOptions::default()).await;
    assert_eq!(report.stats.processed, 0);
    assert!(h.latest.is_empty().await);
    assert!(h.series.rows().await.is_empty());
}

#[tokio::test]
async fn only_admitted_updates_are_published() {
    let h = Harness::new().await;
    let updates = vec![
        update("SKU-1", 1.0, 1, Some(1)),
        update("SKU-2", 1.0, 1, None),
        update("", 1.0, 1, None),
        update("SKU-3", 1.0, -4, Some(3)),
    ];

    let summary = h.front().ingest(&Context::new(), stream(updates)).await.unwrap();
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.rejected_for(RejectReason::MissingTimestamp), 1);
    assert_eq!(summary.rejected_for(RejectReason::MissingSku), 1);

    let mut keys: Vec<String> = h.log.records(TOPIC).await.into_iter().filter_map(|d| d.key).collect();
    keys.sort();
    assert_eq!(keys, ["SKU-1", "SKU-3"]);
}

#[tokio::test]
async fn fail_policy_aborts_on_first_rejection() {
    let h = Harness::new().await;
    let front = h.front().with_policy(RejectPolicy::Fail);
    let updates = vec![update("SKU-1", 1.0, 1, Some(1)), update("SKU-1", 1.0, 1, None), update("SKU-1", 1.0, 1, Some(2))];

    let err = front.ingest(&Context::new(), stream(updates)).await.unwrap_err();
    assert!(matches!(err, IngestError::Rejected(RejectReason::MissingTimestamp)));
    assert_eq!(h.log.records(TOPIC).await.len(), 1);
}

#[tokio::test]
async fn publish_failure_aborts_the_call() {
    let h = Harness::new().await;
    h.log.fail_publishes_after(1, FeedError::io("broker unreachable")).await;
    let updates = (0..4).map(|i| update("SKU-1", 1.0, 1, Some(i))).collect();

    let err = h.front().ingest(&Context::new(), stream(updates)).await.unwrap_err();
    match err {
        IngestError::Publish(e) => assert_eq!(e.message(), "broker unreachable"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.log.records(TOPIC).await.len(), 1);
}

#[tokio::test]
async fn caller_stream_error_aborts_the_call() {
    let h = Harness::new().await;
    let items: Vec<Result<_, String>> = vec![Ok(update("SKU-1", 1.0, 1, Some(1))), Err("connection reset".to_string())];

    let err = h.front().ingest(&Context::new(), futures::stream::iter(items)).await.unwrap_err();
    assert!(matches!(err, IngestError::Stream(ref msg) if msg == "connection reset"));
}

#[tokio::test]
async fn per_sku_order_is_kept_across_partitions() {
    let h = Harness::new().await;
    let skus = ["SKU-1", "SKU-2", "SKU-3", "SKU-4", "SKU-5"];
    let updates = (0..50).map(|i| update(skus[i % skus.len()], i as f64, i as i32, Some(i as i64))).collect();

    h.front().ingest(&Context::new(), stream(updates)).await.unwrap();

    for delivery in h.log.records(TOPIC).await {
        assert_eq!(delivery.partition, partition_for(delivery.key_str(), 3));
    }

    h.drain(WorkerOptions::default()).await;

    let mut per_sku: HashMap<String, Vec<i64>> = HashMap::new();
    for row in h.series.rows().await {
        per_sku.entry(row.sku).or_default().push(row.timestamp_ms);
    }
    assert_eq!(per_sku.len(), skus.len());
    for (sku, ts) in per_sku {
        let mut sorted = ts.clone();
        sorted.sort();
        assert_eq!(ts, sorted, "rows of {sku} arrived out of order");
        assert_eq!(ts.len(), 10);
    }
}

#[tokio::test]
async fn non_finite_price_is_published_as_zero_and_counted() {
    let h = Harness::new().await;
    let updates = vec![update("SKU-N", f64::NAN, 3, Some(5)), update("SKU-I", f64::INFINITY, 4, Some(6))];

    let summary = h.front().ingest(&Context::new(), stream(updates)).await.unwrap();
    assert_eq!(summary.accepted, 2);
    assert_eq!(summary.zeroed_prices, 2);

    h.drain(WorkerOptions::default()).await;
    let stored = h.latest.get("SKU-N").await.unwrap().unwrap();
    assert_eq!((stored.price, stored.stock), (0.0, 3));
    assert_eq!(h.latest.get("SKU-I").await.unwrap().map(|r| r.price), Some(0.0));
}
