use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use sentra_api::{DeadLetter, DeadLetterSink, FeedError};

use crate::{kafka_error, KafkaConfig};

/// Appends skipped records to a side topic, keeping the original key,
/// payload and headers plus `x-dlq-*` headers describing the failure.
pub struct KafkaDeadLetters {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaDeadLetters {
    pub fn new(config: &KafkaConfig, topic: impl Into<String>) -> Result<Self, FeedError> {
        let producer: FutureProducer = config.producer().create().map_err(kafka_error("kafka dead-letter producer"))?;
        let topic = topic.into();
        tracing::info!(%topic, "dead-letter topic enabled");
        Ok(Self { producer, topic, timeout: config.publish_timeout })
    }
}

fn failure_headers(letter: &DeadLetter) -> [(&'static str, String); 5] {
    [
        ("x-dlq-reason", letter.reason.to_string()),
        ("x-dlq-error", letter.error.clone()),
        ("x-dlq-topic", letter.delivery.topic.clone()),
        ("x-dlq-partition", letter.delivery.partition.to_string()),
        ("x-dlq-offset", letter.delivery.offset.to_string()),
    ]
}

fn letter_headers(letter: &DeadLetter) -> OwnedHeaders {
    let mut headers = OwnedHeaders::new_with_capacity(letter.delivery.headers.len() + 5);
    for (key, value) in &letter.delivery.headers {
        headers = headers.insert(Header { key: key.as_str(), value: value.as_deref() });
    }
    for (key, value) in failure_headers(letter) {
        headers = headers.insert(Header { key, value: Some(value.as_str()) });
    }
    headers
}

impl DeadLetterSink for KafkaDeadLetters {
    fn send(&self, letter: DeadLetter) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async move {
            let headers = letter_headers(&letter);
            let mut message: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&self.topic).headers(headers);
            if let Some(key) = letter.delivery.key.as_deref() {
                message = message.key(key.as_bytes());
            }
            if let Some(payload) = letter.delivery.payload.as_deref() {
                message = message.payload(payload);
            }

            match self.producer.send(message, Timeout::After(self.timeout)).await {
                Ok(_) => Ok(()),
                Err((e, _)) => Err(kafka_error("kafka dead-letter publish")(e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use rdkafka::message::Headers;
    use sentra_api::{DeadLetterReason, Delivery};

    use super::*;

    fn letter() -> DeadLetter {
        DeadLetter {
            delivery: Delivery {
                topic: "price_updates".into(),
                partition: 2,
                offset: 41,
                key: Some("SKU-1".into()),
                payload: Some(b"{not json".to_vec()),
                headers: vec![("traceparent".into(), Some(b"00-abc-def-01".to_vec())), ("empty".into(), None)],
            },
            reason: DeadLetterReason::Decode,
            error: "expected value".into(),
        }
    }

    #[test]
    fn failure_is_described_in_headers() {
        let fields = failure_headers(&letter());
        assert_eq!(fields[0], ("x-dlq-reason", "decode".to_string()));
        assert_eq!(fields[3], ("x-dlq-partition", "2".to_string()));
        assert_eq!(fields[4], ("x-dlq-offset", "41".to_string()));
    }

    #[test]
    fn original_headers_come_first() {
        let headers = letter_headers(&letter());
        assert_eq!(headers.count(), 7);
        assert_eq!(headers.get(0).key, "traceparent");
        assert_eq!(headers.get(1).value, None);
        assert_eq!(headers.get(2).key, "x-dlq-reason");
        assert_eq!(headers.get(2).value, Some(&b"decode"[..]));
    }
}
