use std::time::Duration;

use clap::Parser;

use log_kafka::KafkaConfig;
use sentra_api::{TopicSpec, UpsertMode};
use sentra_pipeline::config::{
    FileConfig, DEFAULT_BROKERS, DEFAULT_CONFIG_PATH, DEFAULT_GROUP_ID, DEFAULT_PARTITIONS,
    DEFAULT_PUBLISH_TIMEOUT_MS, DEFAULT_REDIS_URL, DEFAULT_REPLICATION, DEFAULT_TOPIC,
};
use sentra_pipeline::{RetryPolicy, WorkerOptions};
use storage_clickhouse::ClickHouseConfig;

use crate::error::WorkerError;

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Parser, Clone, Debug, Default)]
#[command(name = "sentra-worker", about = "Consumes price updates and writes Redis + ClickHouse")]
pub struct WorkerArgs {
    /// Path to the TOML config file (ignored when absent)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH, env = "SENTRA_CONFIG")]
    pub config: String,

    /// Kafka bootstrap servers, comma separated
    #[arg(long, env = "KAFKA_BROKERS")]
    pub brokers: Option<String>,

    #[arg(long, env = "KAFKA_TOPIC")]
    pub topic: Option<String>,

    #[arg(long, env = "KAFKA_GROUP_ID")]
    pub group_id: Option<String>,

    #[arg(long, env = "KAFKA_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Create the topic at startup if it is missing
    #[arg(long, env = "KAFKA_PROVISION_TOPIC")]
    pub provision_topic: Option<bool>,

    #[arg(long, env = "KAFKA_PARTITIONS")]
    pub partitions: Option<i32>,

    #[arg(long, env = "KAFKA_REPLICATION")]
    pub replication: Option<i32>,

    /// Side topic for skipped records (unset = disabled)
    #[arg(long, env = "DEAD_LETTER_TOPIC")]
    pub dead_letter_topic: Option<String>,

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

    /// Latest-value rule: newer-wins | last-write-wins
    #[arg(long, env = "UPSERT_MODE")]
    pub upsert_mode: Option<String>,

    /// Per-write timeout of the fan-out (unset = none)
    #[arg(long, env = "SINK_WRITE_TIMEOUT_MS")]
    pub write_timeout_ms: Option<u64>,

    #[arg(long, env = "STARTUP_RETRIES")]
    pub startup_retries: Option<u32>,

    #[arg(long, env = "STARTUP_BACKOFF_MS")]
    pub startup_backoff_ms: Option<u64>,

    #[arg(long, env = "OTEL_SERVICE_NAME_WORKER")]
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
    pub group_id: String,
    pub provision_topic: bool,
    pub dead_letter_topic: Option<String>,
    pub redis_url: String,
    pub redis_prefix: String,
    pub clickhouse: ClickHouseConfig,
    pub options: WorkerOptions,
    pub service_name: String,
}

impl Effective {
    pub fn new(args: &WorkerArgs) -> Result<Self, WorkerError> {
        let cfg = FileConfig::load(&args.config)?;
        Self::merge(args, cfg)
    }

    fn merge(args: &WorkerArgs, cfg: FileConfig) -> Result<Self, WorkerError> {
        let mut kafka = KafkaConfig::new(
            args.brokers.clone().or(cfg.kafka.brokers).unwrap_or_else(|| DEFAULT_BROKERS.into()),
            args.client_id.clone().or(cfg.kafka.client_id).unwrap_or_else(|| "worker-node".into()),
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

        let upsert_mode = match args.upsert_mode.clone().or(cfg.worker.upsert_mode) {
            Some(raw) => raw.parse().map_err(|e| WorkerError::Config { context: "upsert_mode", detail: format!("{e}") })?,
            None => UpsertMode::default(),
        };

        let retry_defaults = RetryPolicy::default();
        let startup = RetryPolicy {
            attempts: args.startup_retries.or(cfg.worker.startup_retries).unwrap_or(retry_defaults.attempts),
            backoff: args
                .startup_backoff_ms
                .or(cfg.worker.startup_backoff_ms)
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.backoff),
        };
        if startup.attempts == 0 {
            return Err(WorkerError::Config { context: "startup_retries", detail: "must be at least 1".into() });
        }

        let write_timeout = args
            .write_timeout_ms
            .or(cfg.worker.write_timeout_ms)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Self {
            kafka,
            topic,
            group_id: args.group_id.clone().or(cfg.kafka.group_id).unwrap_or_else(|| DEFAULT_GROUP_ID.into()),
            provision_topic: args.provision_topic.or(cfg.worker.provision_topic).unwrap_or(false),
            dead_letter_topic: args
                .dead_letter_topic
                .clone()
                .or(cfg.kafka.dead_letter_topic)
                .filter(|t| !t.is_empty()),
            redis_url: args.redis_url.clone().or(cfg.redis.url).unwrap_or_else(|| DEFAULT_REDIS_URL.into()),
            redis_prefix: args
                .redis_prefix
                .clone()
                .or(cfg.redis.prefix)
                .unwrap_or_else(|| storage_redis::DEFAULT_PREFIX.into()),
            clickhouse,
            options: WorkerOptions { upsert_mode, write_timeout, startup },
            service_name: args
                .service_name
                .clone()
                .or(cfg.worker.service_name)
                .unwrap_or_else(|| "sentra-worker".into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;


    #[test]
    fn worker_knobs_merge_file_under_flags() {
        let file = FileConfig::parse(
            r#"
            [kafka]
            group_id = "file-group"
            dead_letter_topic = "price_updates.dlq"

            [worker]
            upsert_mode = "last-write-wins"
            write_timeout_ms = 250
            startup_retries = 2
            "#,
        )
        .unwrap();
        let eff = Effective::merge(&WorkerArgs { startup_retries: Some(9), ..Default::default() }, file).unwrap();

        assert_eq!(eff.group_id, "file-group");
        assert_eq!(eff.dead_letter_topic.as_deref(), Some("price_updates.dlq"));
        assert_eq!(eff.options.upsert_mode, UpsertMode::LastWriteWins);
        assert_eq!(eff.options.write_timeout, Some(Duration::from_millis(250)));
        assert_eq!(eff.options.startup.attempts, 9);
    }

    #[test]
    fn zero_retries_is_rejected() {
        let err = Effective::merge(&WorkerArgs { startup_retries: Some(0), ..Default::default() }, FileConfig::default()).unwrap_err();
        assert!(matches!(err, WorkerError::Config { context: "startup_retries", .. }));
    }

    #[test]
    fn unknown_upsert_mode_is_rejected() {
        let err = Effective::merge(&WorkerArgs { upsert_mode: Some("merge".into()), ..Default::default() }, FileConfig::default()).unwrap_err();
        assert!(matches!(err, WorkerError::Config { context: "upsert_mode", .. }));
    }
}
