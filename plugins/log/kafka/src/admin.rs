use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::types::{RDKafkaErrorCode, RDKafkaRespErr};

use sentra_api::{FeedError, LogAdmin, TopicSpec};

use crate::{kafka_error, KafkaConfig};

const ADMIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct KafkaAdmin {
    client: Arc<AdminClient<DefaultClientContext>>,
}

impl KafkaAdmin {
    pub fn new(config: &KafkaConfig) -> Result<Self, FeedError> {
        let client = config.client().create().map_err(kafka_error("kafka admin"))?;
        Ok(Self { client: Arc::new(client) })
    }

    /// Metadata lookup for one topic. Needs only DESCRIBE on the topic.
    async fn exists(&self, name: &str) -> Result<bool, FeedError> {
        let client = self.client.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || -> Result<bool, FeedError> {
            let metadata = client
                .inner()
                .fetch_metadata(Some(&name), ADMIN_TIMEOUT)
                .map_err(kafka_error("kafka metadata"))?;
            Ok(metadata
                .topics()
                .iter()
                .any(|t| is_listed(t.name(), t.error(), t.partitions().len(), &name)))
        })
        .await
        .map_err(|e| FeedError::io(format!("kafka metadata task: {e}")))?
    }
}

/// A metadata entry counts as an existing topic only if the broker
/// returned it without an error and with at least one partition.
fn is_listed(name: &str, error: Option<RDKafkaRespErr>, partitions: usize, wanted: &str) -> bool {
    name == wanted && error.is_none() && partitions > 0
}

impl LogAdmin for KafkaAdmin {
    fn ensure_topic(&self, spec: &TopicSpec) -> Pin<Box<dyn Future<Output = Result<bool, FeedError>> + Send + '_>> {
        let spec = spec.clone();
        Box::pin(async move {
            if spec.partitions < 1 || spec.replication < 1 {
                return Err(FeedError::config(format!(
                    "topic '{}' needs at least one partition and one replica",
                    spec.name
                )));
            }
            if self.exists(&spec.name).await? {
                tracing::debug!(topic = %spec.name, "topic already listed");
                return Ok(false);
            }

            let topic = NewTopic::new(&spec.name, spec.partitions, TopicReplication::Fixed(spec.replication));
            let options = AdminOptions::new().operation_timeout(Some(ADMIN_TIMEOUT));

            let results = self
                .client
                .create_topics([&topic], &options)
                .await
                .map_err(kafka_error("kafka create topic"))?;

            match results.into_iter().next() {
                Some(Ok(name)) => {
                    tracing::info!(topic = %name, partitions = spec.partitions, "topic created");
                    Ok(true)
                }
                Some(Err((name, RDKafkaErrorCode::TopicAlreadyExists))) => {
                    tracing::debug!(topic = %name, "topic already exists");
                    Ok(false)
                }
                Some(Err((name, code))) => Err(FeedError::io(format!("create topic '{name}': {code}"))),
                None => Err(FeedError::io(format!("create topic '{}': no result from broker", spec.name))),
            }
        })
    }
}
