#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::Arc;

use futures::Stream;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use tokio_util::sync::CancellationToken;

use sentra_api::{IncomingUpdate, LogAdmin, TopicSpec};
use sentra_pipeline::{IngestFront, Telemetry, Worker, WorkerDeps, WorkerOptions, WorkerReport};
use storage_memory::{MemoryDeadLetters, MemoryLatestStore, MemoryLog, MemoryTimeSeries};

pub const TOPIC: &str = "price_updates";
pub const GROUP: &str = "worker-node-g1";

/// Full pipeline wired to in-memory collaborators and an in-memory span
/// exporter.
pub struct Harness {
    pub log: MemoryLog,
    pub latest: Arc<MemoryLatestStore>,
    pub series: Arc<MemoryTimeSeries>,
    pub dead_letters: Arc<MemoryDeadLetters>,
    pub exporter: InMemorySpanExporter,
    pub provider: SdkTracerProvider,
    pub telemetry: Telemetry,
}

impl Harness {
    pub async fn new() -> Self {
        let log = MemoryLog::new();
        log.ensure_topic(&TopicSpec::new(TOPIC, 3, 1)).await.unwrap();

        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder().with_simple_exporter(exporter.clone()).build();
        let telemetry = Telemetry::from_tracer(provider.tracer("sentra-test"));

        Self {
            log,
            latest: Arc::new(MemoryLatestStore::new()),
            series: Arc::new(MemoryTimeSeries::new()),
            dead_letters: Arc::new(MemoryDeadLetters::new()),
            exporter,
            provider,
            telemetry,
        }
    }

    pub fn front(&self) -> IngestFront {
        IngestFront::new(Arc::new(self.log.publisher(TOPIC)), self.telemetry.clone(), TOPIC)
    }

    pub fn deps(&self) -> WorkerDeps {
        WorkerDeps {
            latest: self.latest.clone(),
            series: self.series.clone(),
            dead_letters: Some(self.dead_letters.clone()),
            telemetry: self.telemetry.clone(),
        }
    }

    pub async fn worker(&self, options: WorkerOptions) -> Worker {
        Worker::bootstrap(self.deps(), options).await.unwrap()
    }

    /// Close the log and let a fresh worker consume everything in it.
    pub async fn drain(&self, options: WorkerOptions) -> WorkerReport {
        let worker = self.worker(options).await;
        self.log.close().await;
        let subscription = Box::new(self.log.subscribe(TOPIC, GROUP));
        worker.run(subscription, CancellationToken::new()).await
    }

    pub fn spans(&self) -> Vec<SpanData> {
        self.exporter.get_finished_spans().unwrap()
    }

    pub fn span(&self, name: &str) -> SpanData {
        self.spans()
            .into_iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("no span named {name}"))
    }

    pub fn spans_named(&self, name: &str) -> Vec<SpanData> {
        self.spans().into_iter().filter(|s| s.name == name).collect()
    }
}

pub fn update(sku: &str, price: f64, stock: i32, ts: Option<i64>) -> IncomingUpdate {
    IncomingUpdate { sku: sku.to_string(), price, stock, timestamp_ms: ts }
}

pub fn stream(items: Vec<IncomingUpdate>) -> impl Stream<Item = Result<IncomingUpdate, Infallible>> {
    futures::stream::iter(items.into_iter().map(Ok))
}

pub fn attr<'a>(span: &'a SpanData, key: &str) -> Option<&'a opentelemetry::Value> {
    span.attributes.iter().find(|kv: &&KeyValue| kv.key.as_str() == key).map(|kv| &kv.value)
}
