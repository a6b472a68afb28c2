//! Kafka-backed partitioned log.
//!
//! Records are keyed by SKU so the broker's default partitioner keeps every
//! update of one SKU on one partition. Consumers store offsets explicitly
//! after each processed record and commit them on close or on the
//! auto-commit interval.

mod admin;
mod consumer;
mod dead_letter;
mod producer;

use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::error::KafkaError;

use sentra_api::FeedError;

pub use admin::KafkaAdmin;
pub use consumer::KafkaSubscription;
pub use dead_letter::KafkaDeadLetters;
pub use producer::KafkaPublisher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaConfig {
    /// Comma-separated `host:port` list.
    pub brokers: String,
    pub client_id: String,
    /// Upper bound on one publish, queueing included.
    pub publish_timeout: Duration,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            client_id: client_id.into(),
            publish_timeout: Duration::from_secs(5),
        }
    }

    pub(crate) fn client(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("client.id", &self.client_id);
        config
    }

    pub(crate) fn producer(&self) -> ClientConfig {
        let mut config = self.client();
        config
            .set("message.timeout.ms", self.publish_timeout.as_millis().to_string())
            .set("enable.idempotence", "true");
        config
    }

    pub(crate) fn consumer(&self, group_id: &str) -> ClientConfig {
        let mut config = self.client();
        config
            .set("group.id", group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "earliest");
        config
    }
}

pub(crate) fn kafka_error(context: &'static str) -> impl Fn(KafkaError) -> FeedError {
    move |e| {
        let err = match &e {
            KafkaError::ClientConfig(..) => FeedError::config(e.to_string()),
            _ => FeedError::io(e.to_string()),
        };
        err.with_context(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumer_stores_offsets_explicitly() {
        let config = KafkaConfig::new("localhost:19092", "worker-node").consumer("worker-node-g1");
        assert_eq!(config.get("group.id"), Some("worker-node-g1"));
        assert_eq!(config.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("bootstrap.servers"), Some("localhost:19092"));
    }

    #[test]
    fn producer_timeout_follows_config() {
        let mut kafka = KafkaConfig::new("b:9092", "gateway-node");
        kafka.publish_timeout = Duration::from_millis(1500);
        let config = kafka.producer();
        assert_eq!(config.get("message.timeout.ms"), Some("1500"));
        assert_eq!(config.get("client.id"), Some("gateway-node"));
    }
}
