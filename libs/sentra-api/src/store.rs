use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::record::UpdateRecord;

/// How the latest-value upsert treats an update older than the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertMode {
    /// Overwrite unconditionally; arrival order wins.
    LastWriteWins,
    /// Apply only if the incoming `timestamp_ms` ≥ the stored one.
    #[default]
    NewerWins,
}

impl std::str::FromStr for UpsertMode {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-write-wins" | "lww" => Ok(UpsertMode::LastWriteWins),
            "newer-wins" | "cas" => Ok(UpsertMode::NewerWins),
            other => Err(FeedError::config(format!(
                "unknown upsert mode '{other}' (expected last-write-wins or newer-wins)"
            ))),
        }
    }
}

impl std::fmt::Display for UpsertMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertMode::LastWriteWins => f.write_str("last-write-wins"),
            UpsertMode::NewerWins => f.write_str("newer-wins"),
        }
    }
}

/// Result of a latest-value upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    /// Refused by `UpsertMode::NewerWins`: a newer value is already stored.
    Stale,
}

/// Time-range read of one SKU's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub sku: String,
    /// Inclusive lower bound (Unix ms).
    pub from_ms: Option<i64>,
    /// Exclusive upper bound (Unix ms).
    pub to_ms: Option<i64>,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn sku(sku: impl Into<String>) -> Self {
        Self { sku: sku.into(), ..Default::default() }
    }

    pub fn contains(&self, ts_ms: i64) -> bool {
        self.from_ms.is_none_or(|from| ts_ms >= from) && self.to_ms.is_none_or(|to| ts_ms < to)
    }
}

/// Current-state index keyed by SKU.
pub trait LatestValueStore: Send + Sync {
    /// Store name, used as `db.system` on spans.
    fn system(&self) -> &'static str;

    /// Readiness probe.
    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>>;

    /// Write all four fields of the update under its SKU.
    fn upsert<'a>(
        &'a self,
        update: &'a UpdateRecord,
        mode: UpsertMode,
    ) -> Pin<Box<dyn Future<Output = Result<UpsertOutcome, FeedError>> + Send + 'a>>;

    /// Current value for a SKU, `None` if nothing was ever stored.
    fn get<'a>(&'a self, sku: &'a str) -> Pin<Box<dyn Future<Output = Result<Option<UpdateRecord>, FeedError>> + Send + 'a>>;

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// Append-only history ordered by (sku, timestamp_ms).
pub trait TimeSeriesStore: Send + Sync {
    fn system(&self) -> &'static str;

    /// Create database and table if absent. Idempotent.
    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>>;

    /// Insert one row.
    fn append<'a>(&'a self, update: &'a UpdateRecord) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + 'a>>;

    /// Rows of one SKU ordered by `timestamp_ms`.
    fn history<'a>(
        &'a self,
        query: &'a HistoryQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UpdateRecord>, FeedError>> + Send + 'a>>;

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}
