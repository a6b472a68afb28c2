use serde::Deserialize;

use sentra_api::FeedError;

// ═══════════════════════════════════════════════════════════════
//  Defaults
// ═══════════════════════════════════════════════════════════════

pub const DEFAULT_CONFIG_PATH: &str = "sentra.toml";
pub const DEFAULT_BROKERS: &str = "localhost:19092";
pub const DEFAULT_TOPIC: &str = "price_updates";
pub const DEFAULT_GROUP_ID: &str = "worker-node-g1";
pub const DEFAULT_PARTITIONS: i32 = 3;
pub const DEFAULT_REPLICATION: i32 = 1;
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_GRPC_PORT: u16 = 50051;

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

/// Shared config file of the gateway and the worker. Every field is
/// optional; command-line flags and environment variables take
/// precedence over it.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub kafka: KafkaFile,
    pub redis: RedisFile,
    pub clickhouse: ClickHouseFile,
    pub gateway: GatewayFile,
    pub worker: WorkerFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KafkaFile {
    pub brokers: Option<String>,
    pub topic: Option<String>,
    pub group_id: Option<String>,
    pub partitions: Option<i32>,
    pub replication: Option<i32>,
    pub client_id: Option<String>,
    pub publish_timeout_ms: Option<u64>,
    pub dead_letter_topic: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RedisFile {
    pub url: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClickHouseFile {
    pub url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayFile {
    pub grpc_port: Option<u16>,
    pub reject_policy: Option<String>,
    pub startup_retries: Option<u32>,
    pub startup_backoff_ms: Option<u64>,
    pub service_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerFile {
    pub upsert_mode: Option<String>,
    pub write_timeout_ms: Option<u64>,
    pub startup_retries: Option<u32>,
    pub startup_backoff_ms: Option<u64>,
    pub provision_topic: Option<bool>,
    pub service_name: Option<String>,
}

impl FileConfig {
    pub fn parse(content: &str) -> Result<Self, FeedError> {
        toml::from_str(content).map_err(|e| FeedError::config(format!("bad config: {e}")))
    }

    /// Read `path`. A file that does not exist yields the empty config; an
    /// unreadable or malformed one is an error.
    pub fn load(path: &str) -> Result<Self, FeedError> {
        if !std::path::Path::new(path).exists() {
            tracing::debug!(%path, "no config file, using flags and environment only");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| FeedError::config(format!("cannot read config {path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }
}
