mod config;
mod error;
mod service;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use config::{Effective, GatewayArgs};
use error::GatewayError;
use log_kafka::{KafkaAdmin, KafkaPublisher};
use sentra_api::{LatestValueStore, TimeSeriesStore};
use sentra_pipeline::{cancel_on_signal, provision, retry, IngestFront, Telemetry};
use sentra_proto::{IngestServer, QueryServer};
use service::{IngestService, QueryService};
use storage_clickhouse::ClickHouseSeries;
use storage_redis::RedisLatestStore;

#[tokio::main]
async fn main() {
    let args = GatewayArgs::parse();

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

async fn run(eff: Effective) -> Result<(), GatewayError> {
    let guard = sentra_observability::init(eff.service_name.clone())?;
    let result = serve(eff).await;
    guard.shutdown();
    result
}

async fn serve(eff: Effective) -> Result<(), GatewayError> {
    tracing::info!(brokers = %eff.kafka.brokers, topic = %eff.topic.name, "gateway starting");
    let telemetry = Telemetry::global("sentra-gateway");

    // --- Kafka ---
    let admin = KafkaAdmin::new(&eff.kafka)?;
    provision(&admin, &eff.topic).await?;
    let publisher = Arc::new(KafkaPublisher::new(&eff.kafka, eff.topic.name.clone())?);
    let front = IngestFront::new(publisher, telemetry.clone(), eff.topic.name.clone()).with_policy(eff.reject_policy);

    // --- Read path ---
    let latest: Arc<dyn LatestValueStore> = Arc::new(
        retry("latest-value store", eff.startup, || {
            RedisLatestStore::connect(&eff.redis_url, eff.redis_prefix.clone())
        })
        .await?,
    );
    let series: Arc<dyn TimeSeriesStore> = Arc::new(ClickHouseSeries::new(eff.clickhouse.clone())?);

    // --- gRPC ---
    let token = CancellationToken::new();
    cancel_on_signal(token.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], eff.grpc_port));
    tracing::info!(%addr, reject_policy = %eff.reject_policy, "gateway listening");

    let served = Server::builder()
        .add_service(IngestServer::new(IngestService::new(front, telemetry)))
        .add_service(QueryServer::new(QueryService::new(latest.clone(), series.clone())))
        .serve_with_shutdown(addr, token.cancelled())
        .await;
    tracing::info!("gateway stopped accepting calls");

    if let Err(e) = latest.close().await {
        tracing::warn!(error = %e, "latest-value store close failed");
    }
    if let Err(e) = series.close().await {
        tracing::warn!(error = %e, "time-series store close failed");
    }

    served?;
    Ok(())
}
