use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};

use sentra_api::{FeedError, LatestValueStore, UpdateRecord, UpsertMode, UpsertOutcome};

// ═══════════════════════════════════════════════════════════════
//  Layout
// ═══════════════════════════════════════════════════════════════

/// Apply the update only when no newer `timestamp_ms` is stored.
/// KEYS[1] = hash key, ARGV = sku, price, stock, timestamp_ms.
/// Returns 1 when written, 0 when refused.
const NEWER_WINS_SCRIPT: &str = r#"
local current = tonumber(redis.call('HGET', KEYS[1], 'timestamp_ms'))
if current and current > tonumber(ARGV[4]) then
  return 0
end
redis.call('HSET', KEYS[1], 'sku', ARGV[1], 'price', ARGV[2], 'stock', ARGV[3], 'timestamp_ms', ARGV[4])
return 1
"#;

pub const DEFAULT_PREFIX: &str = "sentra";

/// `<prefix>:price:<sku>`
pub fn price_key(prefix: &str, sku: &str) -> String {
    format!("{prefix}:price:{sku}")
}

/// Hash fields of an update, numbers as text.
fn encode_fields(update: &UpdateRecord) -> [(&'static str, String); 4] {
    [
        ("sku", update.sku.clone()),
        ("price", update.price.to_string()),
        ("stock", update.stock.to_string()),
        ("timestamp_ms", update.timestamp_ms.to_string()),
    ]
}

/// Rebuild an update from its hash. Unparsable numbers coerce to 0.
fn decode_fields(sku: &str, mut fields: HashMap<String, String>) -> Option<UpdateRecord> {
    if fields.is_empty() {
        return None;
    }
    let sku = fields.remove("sku").filter(|s| !s.is_empty()).unwrap_or_else(|| sku.to_string());
    let price = number(&sku, "price", fields.get("price"));
    let stock = number(&sku, "stock", fields.get("stock"));
    let timestamp_ms = number(&sku, "timestamp_ms", fields.get("timestamp_ms"));
    Some(UpdateRecord { sku, price, stock, timestamp_ms })
}

fn number<T: std::str::FromStr + Default>(sku: &str, field: &'static str, raw: Option<&String>) -> T {
    let Some(raw) = raw else {
        return T::default();
    };
    raw.trim().parse().unwrap_or_else(|_| {
        tracing::warn!(%sku, field, value = %raw, "stored value is not a number, using 0");
        T::default()
    })
}

fn redis_error(context: &'static str) -> impl Fn(RedisError) -> FeedError {
    move |e| {
        let err = if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            FeedError::io(e.to_string())
        } else {
            FeedError::new(e.to_string())
        };
        err.with_context(context)
    }
}

// ═══════════════════════════════════════════════════════════════
//  RedisLatestStore
// ═══════════════════════════════════════════════════════════════

/// Latest value per SKU as one Redis hash per SKU.
///
/// The connection manager reconnects on its own and is shared by all
/// writes without locking.
pub struct RedisLatestStore {
    conn: ConnectionManager,
    prefix: String,
    newer_wins: Script,
}

impl RedisLatestStore {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, FeedError> {
        let client = redis::Client::open(url).map_err(|e| FeedError::config(format!("redis url '{url}': {e}")))?;
        let conn = ConnectionManager::new(client).await.map_err(redis_error("redis connect"))?;
        let prefix = prefix.into();
        tracing::info!(%url, %prefix, "redis connected");
        Ok(Self { conn, prefix, newer_wins: Script::new(NEWER_WINS_SCRIPT) })
    }

    pub fn key(&self, sku: &str) -> String {
        price_key(&self.prefix, sku)
    }
}

impl LatestValueStore for RedisLatestStore {
    fn system(&self) -> &'static str {
        "redis"
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let _: String = redis::cmd("PING").query_async(&mut conn).await.map_err(redis_error("redis ping"))?;
            Ok(())
        })
    }

    fn upsert<'a>(
        &'a self,
        update: &'a UpdateRecord,
        mode: UpsertMode,
    ) -> Pin<Box<dyn Future<Output = Result<UpsertOutcome, FeedError>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let key = self.key(&update.sku);
            let fields = encode_fields(update);

            match mode {
                UpsertMode::LastWriteWins => {
                    let _: () = conn.hset_multiple(&key, &fields[..]).await.map_err(redis_error("redis hset"))?;
                    Ok(UpsertOutcome::Applied)
                }
                UpsertMode::NewerWins => {
                    let mut invocation = self.newer_wins.prepare_invoke();
                    invocation.key(&key);
                    for (_, value) in &fields {
                        invocation.arg(value);
                    }
                    let written: i64 = invocation
                        .invoke_async(&mut conn)
                        .await
                        .map_err(redis_error("redis newer-wins upsert"))?;
                    Ok(if written == 1 { UpsertOutcome::Applied } else { UpsertOutcome::Stale })
                }
            }
        })
    }

    fn get<'a>(&'a self, sku: &'a str) -> Pin<Box<dyn Future<Output = Result<Option<UpdateRecord>, FeedError>> + Send + 'a>> {
        Box::pin(async move {
            let mut conn = self.conn.clone();
            let fields: HashMap<String, String> =
                conn.hgetall(self.key(sku)).await.map_err(redis_error("redis hgetall"))?;
            Ok(decode_fields(sku, fields))
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        // ConnectionManager closes when the last clone is dropped.
        Box::pin(async move {
            tracing::debug!(prefix = %self.prefix, "redis store released");
            Ok(())
        })
    }
}
