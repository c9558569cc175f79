use async_trait::async_trait;
use platter_core::{CoreError, CoreResult, Notifier};
use platter_shared::models::NotificationEvent;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use tracing::{error, info};

/// Publishes notifications for the delivery service, keyed by recipient
#[derive(Clone)]
pub struct KafkaNotifier {
    producer: FutureProducer,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn notify(&self, event: &NotificationEvent) -> CoreResult<()> {
        let payload = serde_json::to_string(event)
            .map_err(|e| CoreError::InternalError(format!("encode notification: {}", e)))?;
        let key = event.recipient_id.to_string();
        let record = FutureRecord::to(&self.topic).key(&key).payload(&payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!(
                    "Sent {} to {}: partition {} offset {}",
                    event.kind.as_str(),
                    self.topic,
                    delivery.partition,
                    delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send {} to {}: {}", event.kind.as_str(), self.topic, e);
                Err(CoreError::UpstreamError(e.to_string()))
            }
        }
    }
}
