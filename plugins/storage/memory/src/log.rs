use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

use sentra_api::{Delivery, FeedError, LogAdmin, LogPublisher, LogRecord, LogSubscription, TopicSpec};

// ═══════════════════════════════════════════════════════════════
//  Shared state
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct StoredRecord {
    key: Option<String>,
    payload: Option<Vec<u8>>,
    headers: Vec<(String, Option<Vec<u8>>)>,
}

struct PublishFault {
    remaining_ok: usize,
    error: FeedError,
}

#[derive(Default)]
struct LogState {
    topics: HashMap<String, Vec<Vec<StoredRecord>>>,
    /// (group, topic) → partition → next offset to read.
    committed: HashMap<(String, String), HashMap<i32, i64>>,
    publish_fault: Option<PublishFault>,
    recv_errors: VecDeque<FeedError>,
    closed: bool,
}

struct Shared {
    state: Mutex<LogState>,
    appended: Notify,
}

/// Stable partition choice for a key: FNV-1a over the key bytes.
pub fn partition_for(key: &str, partitions: usize) -> i32 {
    if partitions == 0 {
        return 0;
    }
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in key.as_bytes() {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    (hash % partitions as u64) as i32
}

// ═══════════════════════════════════════════════════════════════
//  MemoryLog
// ═══════════════════════════════════════════════════════════════

/// In-process partitioned log with consumer-group offsets.
///
/// Records with the same key always land on the same partition and are
/// read back in append order. A subscription only moves the group's
/// committed position when it is closed; dropping it without `close`
/// behaves like a crashed consumer.
#[derive(Clone)]
pub struct MemoryLog {
    shared: Arc<Shared>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLog {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(LogState::default()),
                appended: Notify::new(),
            }),
        }
    }

    /// Publisher bound to one topic.
    pub fn publisher(&self, topic: impl Into<String>) -> MemoryPublisher {
        MemoryPublisher { shared: self.shared.clone(), topic: topic.into() }
    }

    /// Join `group` on `topic`, resuming from the group's committed offsets.
    pub fn subscribe(&self, topic: impl Into<String>, group: impl Into<String>) -> MemorySubscription {
        MemorySubscription {
            shared: self.shared.clone(),
            topic: topic.into(),
            group: group.into(),
            positions: HashMap::new(),
            stored: HashMap::new(),
            next_partition: 0,
        }
    }

    /// Append a record bypassing the publisher (e.g. a foreign producer
    /// writing a malformed value). Returns `(partition, offset)`.
    pub async fn append_raw(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: Option<Vec<u8>>,
        headers: Vec<(String, Option<Vec<u8>>)>,
    ) -> Result<(i32, i64), FeedError> {
        let record = StoredRecord {
            key: key.map(str::to_string),
            payload,
            headers,
        };
        let mut state = self.shared.state.lock().await;
        let at = append(&mut state, topic, record)?;
        drop(state);
        self.shared.appended.notify_waiters();
        Ok(at)
    }

    /// Let `ok` more publishes succeed, then fail every publish with `error`.
    pub async fn fail_publishes_after(&self, ok: usize, error: FeedError) {
        self.shared.state.lock().await.publish_fault = Some(PublishFault { remaining_ok: ok, error });
    }

    /// Queue an error to be returned by the next `recv` of any subscription.
    pub async fn inject_recv_error(&self, error: FeedError) {
        self.shared.state.lock().await.recv_errors.push_back(error);
        self.shared.appended.notify_waiters();
    }

    /// After close, subscriptions drain what is left and then end.
    pub async fn close(&self) {
        self.shared.state.lock().await.closed = true;
        self.shared.appended.notify_waiters();
    }

    /// Every record of a topic, partition by partition.
    pub async fn records(&self, topic: &str) -> Vec<Delivery> {
        let state = self.shared.state.lock().await;
        let Some(partitions) = state.topics.get(topic) else {
            return Vec::new();
        };
        partitions
            .iter()
            .enumerate()
            .flat_map(|(p, records)| {
                records
                    .iter()
                    .enumerate()
                    .map(move |(offset, r)| to_delivery(topic, p as i32, offset as i64, r))
            })
            .collect()
    }

    pub async fn partition_count(&self, topic: &str) -> Option<usize> {
        self.shared.state.lock().await.topics.get(topic).map(Vec::len)
    }

    /// Committed next-offset of a group on one partition.
    pub async fn committed(&self, group: &str, topic: &str, partition: i32) -> Option<i64> {
        let state = self.shared.state.lock().await;
        state
            .committed
            .get(&(group.to_string(), topic.to_string()))
            .and_then(|offsets| offsets.get(&partition).copied())
    }
}

fn append(state: &mut LogState, topic: &str, record: StoredRecord) -> Result<(i32, i64), FeedError> {
    let partitions = state
        .topics
        .get_mut(topic)
        .ok_or_else(|| FeedError::new(format!("unknown topic '{topic}'")))?;
    let partition = partition_for(record.key.as_deref().unwrap_or(""), partitions.len());
    let log = &mut partitions[partition as usize];
    log.push(record);
    Ok((partition, log.len() as i64 - 1))
}

fn to_delivery(topic: &str, partition: i32, offset: i64, record: &StoredRecord) -> Delivery {
    Delivery {
        topic: topic.to_string(),
        partition,
        offset,
        key: record.key.clone(),
        payload: record.payload.clone(),
        headers: record.headers.clone(),
    }
}

impl LogAdmin for MemoryLog {
    fn ensure_topic(&self, spec: &TopicSpec) -> Pin<Box<dyn Future<Output = Result<bool, FeedError>> + Send + '_>> {
        let spec = spec.clone();
        Box::pin(async move {
            if spec.partitions < 1 {
                return Err(FeedError::config(format!(
                    "topic '{}' needs at least one partition",
                    spec.name
                )));
            }
            let mut state = self.shared.state.lock().await;
            if state.topics.contains_key(&spec.name) {
                return Ok(false);
            }
            state
                .topics
                .insert(spec.name, vec![Vec::new(); spec.partitions as usize]);
            Ok(true)
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryPublisher
// ═══════════════════════════════════════════════════════════════

pub struct MemoryPublisher {
    shared: Arc<Shared>,
    topic: String,
}

impl LogPublisher for MemoryPublisher {
    fn publish(&self, record: LogRecord) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.shared.state.lock().await;
            if let Some(fault) = state.publish_fault.as_mut() {
                if fault.remaining_ok == 0 {
                    return Err(fault.error.clone());
                }
                fault.remaining_ok -= 1;
            }
            let stored = StoredRecord {
                key: Some(record.key),
                payload: Some(record.value),
                headers: record
                    .headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), Some(v.as_bytes().to_vec())))
                    .collect(),
            };
            append(&mut state, &self.topic, stored)?;
            drop(state);
            self.shared.appended.notify_waiters();
            Ok(())
        })
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemorySubscription
// ═══════════════════════════════════════════════════════════════

pub struct MemorySubscription {
    shared: Arc<Shared>,
    topic: String,
    group: String,
    /// Next offset to deliver per partition.
    positions: HashMap<i32, i64>,
    /// Acked next-offsets, committed on close.
    stored: HashMap<i32, i64>,
    next_partition: usize,
}

impl MemorySubscription {
    fn next_from(&mut self, state: &LogState) -> Option<Delivery> {
        let partitions = state.topics.get(&self.topic)?;
        let count = partitions.len();
        let committed = state.committed.get(&(self.group.clone(), self.topic.clone()));
        for i in 0..count {
            let p = (self.next_partition + i) % count;
            let partition = p as i32;
            let pos = *self
                .positions
                .entry(partition)
                .or_insert_with(|| committed.and_then(|c| c.get(&partition).copied()).unwrap_or(0));
            if let Some(record) = partitions[p].get(pos as usize) {
                self.positions.insert(partition, pos + 1);
                self.next_partition = (p + 1) % count;
                return Some(to_delivery(&self.topic, partition, pos, record));
            }
        }
        None
    }
}

impl LogSubscription for MemorySubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Delivery, FeedError>>> + Send + '_>> {
        Box::pin(async move {
            let shared = self.shared.clone();
            loop {
                let mut appended = std::pin::pin!(shared.appended.notified());
                appended.as_mut().enable();
                {
                    let mut state = shared.state.lock().await;
                    if let Some(err) = state.recv_errors.pop_front() {
                        return Some(Err(err));
                    }
                    if let Some(delivery) = self.next_from(&state) {
                        return Some(Ok(delivery));
                    }
                    if state.closed {
                        return None;
                    }
                }
                appended.await;
            }
        })
    }

    fn ack(&mut self, delivery: &Delivery) -> Result<(), FeedError> {
        if delivery.topic != self.topic {
            return Err(FeedError::new(format!(
                "ack for '{}' on a subscription to '{}'",
                delivery.topic, self.topic
            )));
        }
        self.stored.insert(delivery.partition, delivery.offset + 1);
        Ok(())
    }

    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send>> {
        let MemorySubscription { shared, topic, group, stored, .. } = *self;
        Box::pin(async move {
            let mut state = shared.state.lock().await;
            let offsets = state.committed.entry((group, topic)).or_default();
            for (partition, offset) in stored {
                offsets.insert(partition, offset);
            }
            Ok(())
        })
    }
}
