use std::future::Future;
use std::pin::Pin;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::types::RDKafkaErrorCode;

use sentra_api::{Delivery, FeedError, LogSubscription};

use crate::{kafka_error, KafkaConfig};

/// Consumer-group member on one topic.
///
/// The group rebalances partitions across workers; within a partition
/// `recv` yields records in offset order.
pub struct KafkaSubscription {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaSubscription {
    pub fn subscribe(config: &KafkaConfig, group_id: &str, topic: impl Into<String>) -> Result<Self, FeedError> {
        let consumer: StreamConsumer = config.consumer(group_id).create().map_err(kafka_error("kafka consumer"))?;
        let topic = topic.into();
        consumer.subscribe(&[topic.as_str()]).map_err(kafka_error("kafka subscribe"))?;
        tracing::info!(brokers = %config.brokers, %topic, group = %group_id, "subscribed");
        Ok(Self { consumer, topic })
    }
}

fn to_delivery(message: &BorrowedMessage<'_>) -> Delivery {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec)))
                .collect()
        })
        .unwrap_or_default();

    Delivery {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(|k| String::from_utf8_lossy(k).into_owned()),
        payload: message.payload().map(<[u8]>::to_vec),
        headers,
    }
}

impl LogSubscription for KafkaSubscription {
    fn recv(&mut self) -> Pin<Box<dyn Future<Output = Option<Result<Delivery, FeedError>>> + Send + '_>> {
        Box::pin(async move {
            let result = self
                .consumer
                .recv()
                .await
                .map(|message| to_delivery(&message))
                .map_err(kafka_error("kafka receive"));
            Some(result)
        })
    }

    fn ack(&mut self, delivery: &Delivery) -> Result<(), FeedError> {
        // The committed offset is the next one to read.
        self.consumer
            .store_offset(&delivery.topic, delivery.partition, delivery.offset + 1)
            .map_err(kafka_error("kafka store offset"))
    }

    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send>> {
        Box::pin(async move {
            let topic = self.topic.clone();
            let committed = tokio::task::spawn_blocking(move || {
                let result = match self.consumer.commit_consumer_state(CommitMode::Sync) {
                    Ok(()) | Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => Ok(()),
                    Err(e) => Err(kafka_error("kafka commit")(e)),
                };
                self.consumer.unsubscribe();
                result
            })
            .await
            .map_err(|e| FeedError::new(format!("kafka close task: {e}")))?;

            tracing::info!(%topic, ok = committed.is_ok(), "consumer left group");
            committed
        })
    }
}
