use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::RwLock;

use sentra_api::{
    DeadLetter, DeadLetterSink, FeedError, HistoryQuery, LatestValueStore, TimeSeriesStore, UpdateRecord,
    UpsertMode, UpsertOutcome,
};

// ═══════════════════════════════════════════════════════════════
//  Fault injection
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
struct Faults {
    write_error: Option<FeedError>,
    read_error: Option<FeedError>,
    close_error: Option<FeedError>,
    write_delay: Option<Duration>,
    /// Remaining readiness probes (ping / ensure_schema) that fail.
    probe_failures: usize,
}

impl Faults {
    async fn before_write(lock: &RwLock<Faults>) -> Result<(), FeedError> {
        let (delay, error) = {
            let faults = lock.read().await;
            (faults.write_delay, faults.write_error.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn before_read(lock: &RwLock<Faults>) -> Result<(), FeedError> {
        match lock.read().await.read_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn probe(lock: &RwLock<Faults>, what: &str) -> Result<(), FeedError> {
        let mut faults = lock.write().await;
        if faults.probe_failures > 0 {
            faults.probe_failures -= 1;
            return Err(FeedError::io(format!("{what}: connection refused")));
        }
        Ok(())
    }
}

macro_rules! fault_setters {
    () => {
        /// Make every following write fail with `error` (`None` heals).
        pub async fn fail_writes(&self, error: Option<FeedError>) {
            self.faults.write().await.write_error = error;
        }

        /// Make every following read fail with `error` (`None` heals).
        pub async fn fail_reads(&self, error: Option<FeedError>) {
            self.faults.write().await.read_error = error;
        }

        /// Delay every following write.
        pub async fn delay_writes(&self, delay: Option<Duration>) {
            self.faults.write().await.write_delay = delay;
        }

        /// Fail the next `n` readiness probes.
        pub async fn fail_probes(&self, n: usize) {
            self.faults.write().await.probe_failures = n;
        }

        pub async fn fail_close(&self, error: Option<FeedError>) {
            self.faults.write().await.close_error = error;
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn close_now(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
            Box::pin(async move {
                self.closed.store(true, Ordering::SeqCst);
                match self.faults.read().await.close_error.clone() {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            })
        }
    };
}

// ═══════════════════════════════════════════════════════════════
//  MemoryLatestStore
// ═══════════════════════════════════════════════════════════════

/// Latest value per SKU, with the same newer-wins rule as the Redis script.
#[derive(Default)]
pub struct MemoryLatestStore {
    values: RwLock<HashMap<String, UpdateRecord>>,
    faults: RwLock<Faults>,
    pings: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryLatestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fault_setters!();

    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.values.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.values.read().await.is_empty()
    }
}

impl LatestValueStore for MemoryLatestStore {
    fn system(&self) -> &'static str {
        "memory"
    }

    fn ping(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async move {
            self.pings.fetch_add(1, Ordering::SeqCst);
            Faults::probe(&self.faults, "ping").await
        })
    }

    fn upsert<'a>(
        &'a self,
        update: &'a UpdateRecord,
        mode: UpsertMode,
    ) -> Pin<Box<dyn Future<Output = Result<UpsertOutcome, FeedError>> + Send + 'a>> {
        Box::pin(async move {
            Faults::before_write(&self.faults).await?;
            let mut values = self.values.write().await;
            if mode == UpsertMode::NewerWins
                && values
                    .get(&update.sku)
                    .is_some_and(|current| current.timestamp_ms > update.timestamp_ms)
            {
                return Ok(UpsertOutcome::Stale);
            }
            values.insert(update.sku.clone(), update.clone());
            Ok(UpsertOutcome::Applied)
        })
    }

    fn get<'a>(&'a self, sku: &'a str) -> Pin<Box<dyn Future<Output = Result<Option<UpdateRecord>, FeedError>> + Send + 'a>> {
        Box::pin(async move {
            Faults::before_read(&self.faults).await?;
            Ok(self.values.read().await.get(sku).cloned())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        self.close_now()
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryTimeSeries
// ═══════════════════════════════════════════════════════════════

/// Append-only rows in arrival order. Appends fail until the schema
/// exists, like inserting into a missing ClickHouse table.
#[derive(Default)]
pub struct MemoryTimeSeries {
    rows: RwLock<Vec<UpdateRecord>>,
    faults: RwLock<Faults>,
    schema_calls: AtomicUsize,
    schema_ready: AtomicBool,
    closed: AtomicBool,
}

impl MemoryTimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    fault_setters!();

    /// All rows in the order they were appended.
    pub async fn rows(&self) -> Vec<UpdateRecord> {
        self.rows.read().await.clone()
    }

    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }

    pub fn schema_ready(&self) -> bool {
        self.schema_ready.load(Ordering::SeqCst)
    }
}

impl TimeSeriesStore for MemoryTimeSeries {
    fn system(&self) -> &'static str {
        "memory"
    }

    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async move {
            self.schema_calls.fetch_add(1, Ordering::SeqCst);
            Faults::probe(&self.faults, "ensure schema").await?;
            self.schema_ready.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn append<'a>(&'a self, update: &'a UpdateRecord) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + 'a>> {
        Box::pin(async move {
            if !self.schema_ready() {
                return Err(FeedError::new("table price_history does not exist"));
            }
            Faults::before_write(&self.faults).await?;
            self.rows.write().await.push(update.clone());
            Ok(())
        })
    }

    fn history<'a>(
        &'a self,
        query: &'a HistoryQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UpdateRecord>, FeedError>> + Send + 'a>> {
        Box::pin(async move {
            Faults::before_read(&self.faults).await?;
            let rows = self.rows.read().await;
            let mut result: Vec<UpdateRecord> = rows
                .iter()
                .filter(|r| r.sku == query.sku && query.contains(r.timestamp_ms))
                .cloned()
                .collect();
            result.sort_by_key(|r| r.timestamp_ms);
            if let Some(limit) = query.limit {
                result.truncate(limit);
            }
            Ok(result)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        self.close_now()
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryDeadLetters
// ═══════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryDeadLetters {
    letters: RwLock<Vec<DeadLetter>>,
    error: RwLock<Option<FeedError>>,
}

impl MemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn letters(&self) -> Vec<DeadLetter> {
        self.letters.read().await.clone()
    }

    pub async fn fail_sends(&self, error: Option<FeedError>) {
        *self.error.write().await = error;
    }
}

impl DeadLetterSink for MemoryDeadLetters {
    fn send(&self, letter: DeadLetter) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async move {
            if let Some(err) = self.error.read().await.clone() {
                return Err(err);
            }
            self.letters.write().await.push(letter);
            Ok(())
        })
    }
}
