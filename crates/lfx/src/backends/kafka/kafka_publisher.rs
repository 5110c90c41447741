use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use tracing::{debug, info, trace};

use crate::backends::Publisher;
use crate::backends::kafka::KafkaPublisherConfig;
use crate::common::Batch;
use crate::errors::{ConnectError, PublishError};

/// 📨 One rendered message: key (the event id, when there is one) and JSON payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OutgoingRecord {
    pub(crate) key: Option<String>,
    pub(crate) payload: Vec<u8>,
}

/// 📨 Puts whole batches on one topic, all messages in flight at once.
///
/// Keyed by event id so the same event always lands on the same partition,
/// which makes downstream dedupe somebody else's easy problem.
pub struct KafkaPublisher {
    producer: FutureProducer,
    config: KafkaPublisherConfig,
}

impl std::fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 FutureProducer keeps its feelings to itself, so Debug is hand-rolled
        f.debug_struct("KafkaPublisher")
            .field("bootstrap_servers", &self.config.bootstrap_servers)
            .field("topic", &self.config.topic)
            .finish()
    }
}

impl KafkaPublisher {
    /// 🔌 Build the producer and prove the broker is there by asking for topic metadata.
    ///
    /// librdkafka connects lazily, so without the probe a dead broker would only show up
    /// as a pile of delivery timeouts a minute later. Fail here, fail once, fail loudly.
    pub async fn connect(config: KafkaPublisherConfig) -> Result<Self, ConnectError> {
        let connect_failed = |reason: String| ConnectError {
            bootstrap_servers: config.bootstrap_servers.clone(),
            topic: config.topic.clone(),
            reason,
            at: Utc::now(),
        };

        let producer: FutureProducer = config
            .client_config()
            .create()
            .map_err(|e| connect_failed(format!("producer creation failed: {}", e)))?;

        // -- 🧵 fetch_metadata blocks, so it gets its own thread
        let probe = producer.clone();
        let topic = config.topic.clone();
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let topic_error = tokio::task::spawn_blocking(move || {
            probe
                .client()
                .fetch_metadata(Some(topic.as_str()), Timeout::After(timeout))
                .map(|metadata| {
                    metadata
                        .topics()
                        .iter()
                        .find(|t| t.name() == topic)
                        .and_then(|t| t.error())
                        .map(|e| format!("{:?}", e))
                })
        })
        .await
        .map_err(|e| connect_failed(format!("metadata probe task died: {}", e)))?
        .map_err(|e| connect_failed(format!("metadata probe failed: {}", e)))?;

        if let Some(topic_error) = topic_error {
            return Err(connect_failed(format!(
                "broker is up but the topic is not usable: {}",
                topic_error
            )));
        }

        info!(
            bootstrap_servers = %config.bootstrap_servers,
            topic = %config.topic,
            "✅ broker said hello"
        );
        Ok(Self { producer, config })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn publish(&mut self, batch: &Batch) -> Result<(), PublishError> {
        if batch.is_empty() {
            return Ok(());
        }
        let topic = self.config.topic.as_str();
        let records = render_records(topic, batch)?;
        let queue_timeout = Duration::from_millis(self.config.message_timeout_ms);

        trace!(topic, messages = records.len(), "📨 sending batch");
        let deliveries = records.iter().map(|record| {
            let mut outgoing = FutureRecord::<str, [u8]>::to(topic).payload(record.payload.as_slice());
            if let Some(ref key) = record.key {
                outgoing = outgoing.key(key.as_str());
            }
            self.producer.send(outgoing, Timeout::After(queue_timeout))
        });
        let outcomes = join_all(deliveries).await;

        let total = outcomes.len();
        let failures: Vec<String> = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.err().map(|(err, _)| err.to_string()))
            .collect();
        if let Some(first_failure) = failures.first() {
            return Err(PublishError::Delivery {
                topic: topic.to_string(),
                failed: failures.len(),
                total,
                first_failure: first_failure.clone(),
                at: Utc::now(),
            });
        }

        debug!(topic, messages = total, "✅ batch delivered");
        Ok(())
    }
}

/// 📝 Serialize every event up front. One bad event fails the batch before anything is sent.
pub(crate) fn render_records(topic: &str, batch: &Batch) -> Result<Vec<OutgoingRecord>, PublishError> {
    batch
        .iter()
        .map(|event| {
            let payload = event.to_payload().map_err(|source| PublishError::Serialize {
                topic: topic.to_string(),
                id: event.id.clone(),
                at: Utc::now(),
                source,
            })?;
            Ok(OutgoingRecord {
                key: event.id.clone(),
                payload,
            })
        })
        .collect()
}
