use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use sentra_api::{FeedError, HistoryQuery, TimeSeriesStore, UpdateRecord};

const SQL_CREATE_DATABASE: &str = include_str!("../sql/create_database.sql");
const SQL_CREATE_TABLE: &str = include_str!("../sql/create_price_history.sql");

/// Escape a string value for safe use inside a ClickHouse single-quoted literal.
/// Prevents SQL injection by escaping `\` and `'`.
fn escape_ch_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Database and table names are spliced into SQL unquoted.
fn check_identifier(what: &str, name: &str) -> Result<(), FeedError> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(FeedError::config(format!("invalid ClickHouse {what} name '{name}'")))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Config
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickHouseConfig {
    /// HTTP endpoint, e.g. `http://localhost:8123`.
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
    pub table: String,
    pub timeout: Duration,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8123".into(),
            user: "default".into(),
            password: String::new(),
            database: "sentra".into(),
            table: "price_history".into(),
            timeout: Duration::from_secs(10),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Rows
// ═══════════════════════════════════════════════════════════════

/// One `price_history` row as JSONEachRow.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChRow {
    /// UInt64 comes back quoted unless the server is told otherwise.
    #[serde(deserialize_with = "quoted_i64")]
    ts_ms: i64,
    sku: String,
    price: f64,
    stock: i32,
}

fn quoted_i64<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }
    match Raw::deserialize(d)? {
        Raw::Int(n) => Ok(n),
        Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

impl From<&UpdateRecord> for ChRow {
    fn from(r: &UpdateRecord) -> Self {
        ChRow { ts_ms: r.timestamp_ms, sku: r.sku.clone(), price: r.price, stock: r.stock }
    }
}

impl From<ChRow> for UpdateRecord {
    fn from(r: ChRow) -> Self {
        UpdateRecord::new(r.sku, r.price, r.stock, r.ts_ms)
    }
}

fn parse_rows(body: &str) -> Result<Vec<UpdateRecord>, FeedError> {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<ChRow>(line)
                .map(UpdateRecord::from)
                .map_err(|e| FeedError::format_err(format!("parse CH row: {e}")))
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════
//  ClickHouseSeries
// ═══════════════════════════════════════════════════════════════

/// Time-series store on a ClickHouse MergeTree table, over the HTTP
/// interface. Each append is one JSONEachRow insert.
pub struct ClickHouseSeries {
    http: reqwest::Client,
    config: ClickHouseConfig,
}

impl ClickHouseSeries {
    pub fn new(config: ClickHouseConfig) -> Result<Self, FeedError> {
        check_identifier("database", &config.database)?;
        check_identifier("table", &config.table)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| FeedError::config(format!("HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    fn table(&self) -> String {
        format!("{}.{}", self.config.database, self.config.table)
    }

    async fn exec(&self, sql: String) -> Result<String, FeedError> {
        let resp = self
            .http
            .post(&self.config.url)
            .query(&[("user", self.config.user.as_str()), ("password", self.config.password.as_str())])
            .body(sql)
            .send()
            .await
            .map_err(|e| FeedError::io(format!("CH request: {e}")))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| FeedError::io(format!("CH read: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(FeedError::io(format!("CH {status}: {}", body.trim())))
        }
    }

    fn insert_sql(&self, update: &UpdateRecord) -> Result<String, FeedError> {
        let row = serde_json::to_string(&ChRow::from(update))?;
        Ok(format!("INSERT INTO {} FORMAT JSONEachRow\n{row}", self.table()))
    }

    fn history_sql(&self, query: &HistoryQuery) -> String {
        let mut conditions = vec![format!("sku = '{}'", escape_ch_string(&query.sku))];
        if let Some(from) = query.from_ms {
            conditions.push(format!("ts_ms >= {}", from.max(0)));
        }
        if let Some(to) = query.to_ms {
            conditions.push(format!("ts_ms < {}", to.max(0)));
        }
        let limit_clause = match query.limit {
            Some(n) => format!(" LIMIT {n}"),
            None => String::new(),
        };
        format!(
            "SELECT ts_ms, sku, price, stock FROM {} WHERE {} ORDER BY ts_ms{} FORMAT JSONEachRow",
            self.table(),
            conditions.join(" AND "),
            limit_clause,
        )
    }
}

impl TimeSeriesStore for ClickHouseSeries {
    fn system(&self) -> &'static str {
        "clickhouse"
    }

    fn ensure_schema(&self) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async move {
            let database = SQL_CREATE_DATABASE.replace("{database}", &self.config.database);
            self.exec(database).await.map_err(|e| e.with_context("create database"))?;

            let table = SQL_CREATE_TABLE
                .replace("{database}", &self.config.database)
                .replace("{table}", &self.config.table);
            self.exec(table).await.map_err(|e| e.with_context("create table"))?;

            tracing::info!(table = %self.table(), "clickhouse schema ready");
            Ok(())
        })
    }

    fn append<'a>(&'a self, update: &'a UpdateRecord) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + 'a>> {
        Box::pin(async move {
            if update.timestamp_ms < 0 {
                return Err(FeedError::format_err(format!(
                    "timestamp_ms {} does not fit UInt64",
                    update.timestamp_ms
                )));
            }
            let sql = self.insert_sql(update)?;
            self.exec(sql).await?;
            Ok(())
        })
    }

    fn history<'a>(
        &'a self,
        query: &'a HistoryQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UpdateRecord>, FeedError>> + Send + 'a>> {
        Box::pin(async move {
            let body = self.exec(self.history_sql(query)).await?;
            parse_rows(&body)
        })
    }
}
