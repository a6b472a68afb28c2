use std::future::Future;
use std::pin::Pin;

use crate::carrier::TraceCarrier;
use crate::error::FeedError;

// ════════════════════════════════════════════════════════════════
//  Log types
// ════════════════════════════════════════════════════════════════

/// Record handed to the partitioned log by the ingest front.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Partition key (the SKU).
    pub key: String,
    /// Serialized `UpdateRecord`.
    pub value: Vec<u8>,
    /// Trace context, written as record headers.
    pub headers: TraceCarrier,
}

/// Record as delivered to a consumer, with its log coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
    /// Raw headers; values may be binary or absent.
    pub headers: Vec<(String, Option<Vec<u8>>)>,
}

impl Delivery {
    /// Decode the headers into a trace carrier.
    pub fn carrier(&self) -> TraceCarrier {
        TraceCarrier::from_headers(
            self.headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_deref())),
        )
    }

    pub fn key_str(&self) -> &str {
        self.key.as_deref().unwrap_or("")
    }

    /// Payload as text, for log lines.
    pub fn payload_lossy(&self) -> String {
        self.payload
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .unwrap_or_default()
    }
}

/// Topic provisioning parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication: i32,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, partitions: i32, replication: i32) -> Self {
        Self { name: name.into(), partitions, replication }
    }
}

// ════════════════════════════════════════════════════════════════
//  Log traits
// ════════════════════════════════════════════════════════════════

/// Producer side of the partitioned log. Shared by all concurrent
/// ingest calls.
pub trait LogPublisher: Send + Sync {
    /// Publish one record and wait for the log to accept it.
    fn publish(&self, record: LogRecord) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>>;
}

/// Topic administration.
pub trait LogAdmin: Send + Sync {
    /// Create the topic unless it already exists.
    /// Returns `true` when this call created it.
    fn ensure_topic(&self, spec: &TopicSpec) -> Pin<Box<dyn Future<Output = Result<bool, FeedError>> + Send + '_>>;
}

/// Consumer-group membership on one topic.
///
/// Records arrive in log order per partition. Progress on a partition only
/// moves past a record once `ack` was called for it, so unacknowledged
/// records are delivered again after a restart.
pub trait LogSubscription: Send {
    /// Next record. `None` = subscription closed.
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Delivery, FeedError>>> + Send + '_>>;

    /// Mark the record as processed.
    fn ack(&mut self, delivery: &Delivery) -> Result<(), FeedError>;

    /// Commit progress and leave the consumer group.
    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send>>;
}
