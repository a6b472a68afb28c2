use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;

use sentra_api::{FeedError, LogPublisher, LogRecord, TraceCarrier};

use crate::{kafka_error, KafkaConfig};

/// Publisher bound to one topic. The producer is thread safe and shared by
/// every concurrent ingest call.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig, topic: impl Into<String>) -> Result<Self, FeedError> {
        let producer: FutureProducer = config.producer().create().map_err(kafka_error("kafka producer"))?;
        let topic = topic.into();
        tracing::info!(brokers = %config.brokers, %topic, "kafka producer ready");
        Ok(Self { producer, topic, timeout: config.publish_timeout })
    }
}

pub(crate) fn carrier_headers(carrier: &TraceCarrier) -> OwnedHeaders {
    carrier.iter().fold(OwnedHeaders::new_with_capacity(carrier.len()), |headers, (key, value)| {
        headers.insert(Header { key, value: Some(value) })
    })
}

impl LogPublisher for KafkaPublisher {
    fn publish(&self, record: LogRecord) -> Pin<Box<dyn Future<Output = Result<(), FeedError>> + Send + '_>> {
        Box::pin(async move {
            let headers = carrier_headers(&record.headers);
            let message = FutureRecord::to(&self.topic)
                .key(record.key.as_str())
                .payload(record.value.as_slice())
                .headers(headers);

            match self.producer.send(message, Timeout::After(self.timeout)).await {
                Ok(_) => Ok(()),
                Err((e, _)) => Err(kafka_error("kafka publish")(e)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use rdkafka::message::Headers;

    use super::*;

    #[test]
    fn carrier_becomes_record_headers() {
        let mut carrier = TraceCarrier::new();
        carrier.insert("traceparent", "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01");
        carrier.insert("tracestate", "vendor=1");

        let headers = carrier_headers(&carrier);
        assert_eq!(headers.count(), 2);
        let first = headers.get(0);
        assert_eq!(first.key, "traceparent");
        assert_eq!(first.value, Some(&b"00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"[..]));
    }
}
