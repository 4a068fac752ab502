use std::net::SocketAddr;

use envconfig::Envconfig;

#[derive(Envconfig, Clone)]
pub struct Config {
    /// Swap every external collaborator for its in-memory double. Only
    /// useful for local debugging; the liveness probe stays red so a
    /// container built this way cannot pass for prod.
    #[envconfig(default = "false")]
    pub memory_backends: bool,

    #[envconfig(default = "127.0.0.1:3000")]
    pub address: SocketAddr,

    #[envconfig(default = "redis://127.0.0.1:6379/")]
    pub redis_url: String,
    pub redis_key_prefix: Option<String>,

    #[envconfig(default = "webhook-audit")]
    pub audit_bucket: String,

    #[envconfig(default = "product-catalog")]
    pub catalog_bucket: String,

    /// Custom S3 endpoint for localstack/minio setups.
    pub s3_endpoint: Option<String>,

    /// How long registry entries are kept for duplicate suppression.
    #[envconfig(default = "2555")]
    pub registry_retention_days: u64,

    /// Stamped into tenant catalog entries under `_metadata`.
    #[envconfig(default = "1.0")]
    pub event_version: String,

    #[envconfig(nested = true)]
    pub kafka: KafkaConfig,

    // Used for integration tests
    #[envconfig(default = "true")]
    pub export_prometheus: bool,
}

#[derive(Envconfig, Clone)]
pub struct KafkaConfig {
    pub kafka_hosts: String,
    #[envconfig(default = "catalog_changes")]
    pub kafka_topic: String,
    #[envconfig(default = "false")]
    pub kafka_tls: bool,
    #[envconfig(default = "")]
    pub kafka_client_id: String,
    #[envconfig(default = "20")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic
    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds
}
