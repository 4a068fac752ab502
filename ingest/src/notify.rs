use std::time::Duration;

use async_trait::async_trait;
use health::HealthHandle;
use metrics::counter;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::api::IngestError;
use crate::config::KafkaConfig;

/// Published once per tenant-catalog mutation. `trigger` carries the
/// wire name of the event kind that caused the change.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChangeNotification {
    pub store_id: String,
    pub timestamp: String,
    pub trigger: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &ChangeNotification) -> Result<(), IngestError>;
}

struct NotifierContext {
    liveness: HealthHandle,
}

impl rdkafka::ClientContext for NotifierContext {
    // Signal liveness, as the main rdkafka loop is running and calling us
    fn stats(&self, _stats: rdkafka::Statistics) {
        self.liveness.report_healthy();
    }
}

pub struct KafkaNotifier {
    producer: FutureProducer<NotifierContext>,
    topic: String,
}

impl KafkaNotifier {
    pub fn new(config: &KafkaConfig, liveness: HealthHandle) -> anyhow::Result<KafkaNotifier> {
        info!("connecting to Kafka brokers at {}...", config.kafka_hosts);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("statistics.interval.ms", "10000")
            .set("linger.ms", config.kafka_producer_linger_ms.to_string())
            .set(
                "message.timeout.ms",
                config.kafka_message_timeout_ms.to_string(),
            );

        if !config.kafka_client_id.is_empty() {
            client_config.set("client.id", &config.kafka_client_id);
        }

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<NotifierContext> =
            client_config.create_with_context(NotifierContext { liveness })?;

        // Ping the cluster to make sure we can reach brokers, fail after 10 seconds
        drop(producer.client().fetch_metadata(
            Some(&config.kafka_topic),
            Timeout::After(Duration::new(10, 0)),
        )?);
        info!("connected to Kafka brokers");

        Ok(KafkaNotifier {
            producer,
            topic: config.kafka_topic.clone(),
        })
    }
}

#[async_trait]
impl Notifier for KafkaNotifier {
    async fn publish(&self, notification: &ChangeNotification) -> Result<(), IngestError> {
        let payload = serde_json::to_string(notification)?;
        let record = FutureRecord::to(&self.topic)
            .key(&notification.store_id)
            .payload(&payload);

        match self.producer.send(record, Timeout::Never).await {
            Ok(_) => {
                counter!("webhook_notifications_published_total").increment(1);
                Ok(())
            }
            Err((err, _)) => {
                error!(
                    "failed to publish catalog change for store {}: {}",
                    notification.store_id, err
                );
                counter!("webhook_notification_errors_total").increment(1);
                Err(IngestError::NotificationFailed)
            }
        }
    }
}

/// Logs instead of publishing, for the in-memory dev mode.
pub struct PrintNotifier {}

#[async_trait]
impl Notifier for PrintNotifier {
    async fn publish(&self, notification: &ChangeNotification) -> Result<(), IngestError> {
        info!("catalog change: {:?}", notification);
        counter!("webhook_notifications_published_total").increment(1);
        Ok(())
    }
}

/// Collects published notifications so tests can assert on them.
#[derive(Default)]
pub struct MemoryNotifier {
    published: Mutex<Vec<ChangeNotification>>,
}

impl MemoryNotifier {
    pub fn new() -> MemoryNotifier {
        MemoryNotifier::default()
    }

    pub async fn published(&self) -> Vec<ChangeNotification> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn publish(&self, notification: &ChangeNotification) -> Result<(), IngestError> {
        self.published.lock().await.push(notification.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::notify::{ChangeNotification, MemoryNotifier, Notifier};

    #[test]
    fn notification_wire_format() {
        let notification = ChangeNotification {
            store_id: "store-1".to_string(),
            timestamp: "2026-08-24T12:00:00Z".to_string(),
            trigger: "product_update".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&notification).unwrap(),
            json!({
                "store_id": "store-1",
                "timestamp": "2026-08-24T12:00:00Z",
                "trigger": "product_update"
            })
        );
    }

    #[tokio::test]
    async fn memory_notifier_records_messages() {
        let notifier = MemoryNotifier::new();
        let notification = ChangeNotification {
            store_id: "store-1".to_string(),
            timestamp: "2026-08-24T12:00:00Z".to_string(),
            trigger: "product_delete".to_string(),
        };
        notifier.publish(&notification).await.unwrap();
        assert_eq!(notifier.published().await, vec![notification]);
    }
}
