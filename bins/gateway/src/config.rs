use std::time::Duration;

use clap::Parser;

use log_kafka::KafkaConfig;
use sentra_api::TopicSpec;
use sentra_pipeline::config::{
    FileConfig, DEFAULT_BROKERS, DEFAULT_CONFIG_PATH, DEFAULT_GRPC_PORT, DEFAULT_PARTITIONS,
    DEFAULT_PUBLISH_TIMEOUT_MS, DEFAULT_REDIS_URL, DEFAULT_REPLICATION, DEFAULT_TOPIC,
};
use sentra_pipeline::{RejectPolicy, RetryPolicy};
use storage_clickhouse::ClickHouseConfig;

use crate::error::GatewayError;

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Parser, Clone, Debug, Default)]
#[command(name = "sentra-gateway", about = "gRPC ingest front for price/stock updates")]
pub struct GatewayArgs {
    /// Path to the TOML config file (ignored when absent)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "SENTRA_CONFIG")]
    pub config: String,

    /// Kafka bootstrap servers, comma separated
    #[arg(long, env = "KAFKA_BROKERS")]
    pub brokers: Option<String>,

    #[arg(long, env = "KAFKA_TOPIC")]
    pub topic: Option<String>,

    /// Partitions used when the topic has to be created
    #[arg(long, env = "KAFKA_PARTITIONS")]
    pub partitions: Option<i32>,

    #[arg(long, env = "KAFKA_REPLICATION")]
    pub replication: Option<i32>,

    #[arg(long, env = "KAFKA_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "KAFKA_PUBLISH_TIMEOUT_MS")]
    pub publish_timeout_ms: Option<u64>,

    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "REDIS_PREFIX")]
    pub redis_prefix: Option<String>,

    #[arg(long, env = "CLICKHOUSE_URL")]
    pub clickhouse_url: Option<String>,

    #[arg(long, env = "CLICKHOUSE_USER")]
    pub clickhouse_user: Option<String>,

    #[arg(long, env = "CLICKHOUSE_PASSWORD", hide_env_values = true)]
    pub clickhouse_password: Option<String>,

    #[arg(long, env = "CLICKHOUSE_DATABASE")]
    pub clickhouse_database: Option<String>,

    #[arg(long, env = "CLICKHOUSE_TABLE")]
    pub clickhouse_table: Option<String>,

    #[arg(long, env = "CLICKHOUSE_TIMEOUT_SECS")]
    pub clickhouse_timeout_secs: Option<u64>,

    #[arg(long, env = "GRPC_PORT")]
    pub grpc_port: Option<u16>,

    /// What to do with an update lacking sku or timestamp: skip | fail
    #[arg(long, env = "REJECT_POLICY")]
    pub reject_policy: Option<String>,

    /// Connection attempts per store at startup
    #[arg(long, env = "STARTUP_RETRIES")]
    pub startup_retries: Option<u32>,

    #[arg(long, env = "STARTUP_BACKOFF_MS")]
    pub startup_backoff_ms: Option<u64>,

    #[arg(long, env = "OTEL_SERVICE_NAME_GATEWAY")]
    pub service_name: Option<String>,
}

// ═══════════════════════════════════════════════════════════════
//  Effective (file < env < CLI)
// ═══════════════════════════════════════════════════════════════

/// Final configuration: sentra.toml < env/CLI
#[derive(Debug)]
pub struct Effective {
    pub kafka: KafkaConfig,
    pub topic: TopicSpec,
    pub redis_url: String,
    pub redis_prefix: String,
    pub clickhouse: ClickHouseConfig,
    pub grpc_port: u16,
    pub reject_policy: RejectPolicy,
    pub startup: RetryPolicy,
    pub service_name: String,
}

impl Effective {
    pub fn new(args: &GatewayArgs) -> Result<Self, GatewayError> {
        let cfg = FileConfig::load(&args.config)?;
        Self::merge(args, cfg)
    }

    fn merge(args: &GatewayArgs, cfg: FileConfig) -> Result<Self, GatewayError> {
        let mut kafka = KafkaConfig::new(
            args.brokers.clone().or(cfg.kafka.brokers).unwrap_or_else(|| DEFAULT_BROKERS.into()),
            args.client_id.clone().or(cfg.kafka.client_id).unwrap_or_else(|| "gateway-node".into()),
        );
        kafka.publish_timeout = Duration::from_millis(
            args.publish_timeout_ms
                .or(cfg.kafka.publish_timeout_ms)
                .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_MS),
        );

        let topic = TopicSpec::new(
            args.topic.clone().or(cfg.kafka.topic).unwrap_or_else(|| DEFAULT_TOPIC.into()),
            args.partitions.or(cfg.kafka.partitions).unwrap_or(DEFAULT_PARTITIONS),
            args.replication.or(cfg.kafka.replication).unwrap_or(DEFAULT_REPLICATION),
        );

        let defaults = ClickHouseConfig::default();
        let clickhouse = ClickHouseConfig {
            url: args.clickhouse_url.clone().or(cfg.clickhouse.url).unwrap_or(defaults.url),
            user: args.clickhouse_user.clone().or(cfg.clickhouse.user).unwrap_or(defaults.user),
            password: args.clickhouse_password.clone().or(cfg.clickhouse.password).unwrap_or(defaults.password),
            database: args.clickhouse_database.clone().or(cfg.clickhouse.database).unwrap_or(defaults.database),
            table: args.clickhouse_table.clone().or(cfg.clickhouse.table).unwrap_or(defaults.table),
            timeout: args
                .clickhouse_timeout_secs
                .or(cfg.clickhouse.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        };

        let reject_policy = match args.reject_policy.clone().or(cfg.gateway.reject_policy) {
            Some(raw) => raw.parse().map_err(|e| GatewayError::Config { context: "reject_policy", detail: format!("{e}") })?,
            None => RejectPolicy::default(),
        };

        let retry_defaults = RetryPolicy::default();
        let startup = RetryPolicy {
            attempts: args.startup_retries.or(cfg.gateway.startup_retries).unwrap_or(retry_defaults.attempts),
            backoff: args
                .startup_backoff_ms
                .or(cfg.gateway.startup_backoff_ms)
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.backoff),
        };
        if startup.attempts == 0 {
            return Err(GatewayError::Config { context: "startup_retries", detail: "must be at least 1".into() });
        }

        Ok(Self {
            kafka,
            topic,
            redis_url: args.redis_url.clone().or(cfg.redis.url).unwrap_or_else(|| DEFAULT_REDIS_URL.into()),
            redis_prefix: args
                .redis_prefix
                .clone()
                .or(cfg.redis.prefix)
                .unwrap_or_else(|| storage_redis::DEFAULT_PREFIX.into()),
            clickhouse,
            grpc_port: args.grpc_port.or(cfg.gateway.grpc_port).unwrap_or(DEFAULT_GRPC_PORT),
            reject_policy,
            startup,
            service_name: args
                .service_name
                .clone()
                .or(cfg.gateway.service_name)
                .unwrap_or_else(|| "sentra-gateway".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn flags_override_file_values() {
        let file = FileConfig::parse(
            r#"
            [kafka]
            brokers = "file:9092"
            topic = "file_topic"

            [gateway]
            grpc_port = 6000
            reject_policy = "fail"
            "#,
        )
        .unwrap();
        let args = GatewayArgs { brokers: Some("cli:9092".into()), grpc_port: Some(7000), ..Default::default() };
        let eff = Effective::merge(&args, file).unwrap();

        assert_eq!(eff.kafka.brokers, "cli:9092");
        assert_eq!(eff.topic.name, "file_topic");
        assert_eq!(eff.grpc_port, 7000);
        assert_eq!(eff.reject_policy, RejectPolicy::Fail);
    }

    #[test]
    fn bad_reject_policy_is_a_config_error() {
        let args = GatewayArgs { reject_policy: Some("drop".into()), ..Default::default() };
        let err = Effective::merge(&args, FileConfig::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Config { context: "reject_policy", .. }));
    }

    #[test]
    fn startup_retry_knobs_reach_the_gateway() {
        let file = FileConfig::parse(
            r#"
            [gateway]
            startup_retries = 2
            startup_backoff_ms = 50
            "#,
        )
        .unwrap();
        let args = GatewayArgs { startup_retries: Some(8), ..Default::default() };
        let eff = Effective::merge(&args, file).unwrap();
        assert_eq!(eff.startup, RetryPolicy { attempts: 8, backoff: Duration::from_millis(50) });

        let defaults = Effective::merge(&GatewayArgs::default(), FileConfig::default()).unwrap();
        assert_eq!(defaults.startup, RetryPolicy::default());

        let zero = GatewayArgs { startup_retries: Some(0), ..Default::default() };
        let err = Effective::merge(&zero, FileConfig::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Config { context: "startup_retries", .. }));
    }
}
