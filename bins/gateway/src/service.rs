use std::sync::Arc;

use futures::StreamExt;
use opentelemetry::propagation::Extractor;
use tonic::metadata::{KeyRef, MetadataMap};
use tonic::{Request, Response, Status, Streaming};

use sentra_api::{ErrorKind, FeedError, IncomingUpdate, LatestValueStore, TimeSeriesStore};
use sentra_pipeline::{IngestError, IngestFront, Telemetry};
use sentra_proto::{Ack, Empty, HistoryQuery, HistoryReply, Ingest, PriceQuery, PriceReply, PriceUpdate, Query};

pub const HEALTHY: &str = "gateway healthy";

// ═══════════════════════════════════════════════════════════════
//  Status mapping
// ═══════════════════════════════════════════════════════════════

pub fn ingest_status(e: IngestError) -> Status {
    match e {
        IngestError::Rejected(_) => Status::invalid_argument(e.to_string()),
        IngestError::Publish(_) | IngestError::Stream(_) => Status::internal(e.to_string()),
    }
}

pub fn store_status(e: FeedError) -> Status {
    match e.kind() {
        ErrorKind::Io => Status::unavailable(e.to_string()),
        _ => Status::internal(e.to_string()),
    }
}

/// Request metadata as a trace-context extractor. Binary (`-bin`) entries
/// are not trace headers and are skipped.
struct MetadataCarrier<'a>(&'a MetadataMap);

impl Extractor for MetadataCarrier<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0
            .keys()
            .filter_map(|k| match k {
                KeyRef::Ascii(k) => Some(k.as_str()),
                KeyRef::Binary(_) => None,
            })
            .collect()
    }
}

// ═══════════════════════════════════════════════════════════════
//  sentra.Ingest
// ═══════════════════════════════════════════════════════════════

pub struct IngestService {
    front: IngestFront,
    telemetry: Telemetry,
}

impl IngestService {
    pub fn new(front: IngestFront, telemetry: Telemetry) -> Self {
        Self { front, telemetry }
    }
}

#[tonic::async_trait]
impl Ingest for IngestService {
    async fn health(&self, _request: Request<Empty>) -> Result<Response<Ack>, Status> {
        Ok(Response::new(Ack::ok(HEALTHY)))
    }

    async fn stream_updates(&self, request: Request<Streaming<PriceUpdate>>) -> Result<Response<Ack>, Status> {
        let cx = self.telemetry.extract_from(&MetadataCarrier(request.metadata()));
        let updates = request.into_inner().map(|item| item.map(IncomingUpdate::from));

        let summary = self.front.ingest(&cx, updates).await.map_err(ingest_status)?;
        Ok(Response::new(Ack::ok(summary.message())))
    }
}

// ═══════════════════════════════════════════════════════════════
//  sentra.Query
// ═══════════════════════════════════════════════════════════════

pub struct QueryService {
    latest: Arc<dyn LatestValueStore>,
    series: Arc<dyn TimeSeriesStore>,
}

impl QueryService {
    pub fn new(latest: Arc<dyn LatestValueStore>, series: Arc<dyn TimeSeriesStore>) -> Self {
        Self { latest, series }
    }
}

#[tonic::async_trait]
impl Query for QueryService {
    async fn get_price(&self, request: Request<PriceQuery>) -> Result<Response<PriceReply>, Status> {
        let sku = request.into_inner().sku;
        if sku.is_empty() {
            return Err(Status::invalid_argument("sku is required"));
        }
        match self.latest.get(&sku).await.map_err(store_status)? {
            Some(record) => Ok(Response::new(PriceReply { ok: true, data: Some(record.into()) })),
            None => Err(Status::not_found(format!("no price for sku '{sku}'"))),
        }
    }

    async fn get_history(&self, request: Request<HistoryQuery>) -> Result<Response<HistoryReply>, Status> {
        let query = sentra_api::HistoryQuery::from(request.into_inner());
        if query.sku.is_empty() {
            return Err(Status::invalid_argument("sku is required"));
        }
        let rows = self.series.history(&query).await.map_err(store_status)?;
        tracing::debug!(sku = %query.sku, rows = rows.len(), "history served");
        Ok(Response::new(HistoryReply { rows: rows.into_iter().map(Into::into).collect() }))
    }
}
