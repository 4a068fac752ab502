use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::Client as S3Client;
use health::HealthHandle;
use metrics::counter;
use tokio::sync::RwLock;
use tokio::task;
use tokio::time::sleep;
use tracing::{error, info};

const HEALTH_INTERVAL: Duration = Duration::from_secs(10);

/// Keyed blob storage for audit records and catalog entries. One instance
/// is bound to one bucket. Every object we store is JSON.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn any_with_prefix(&self, prefix: &str) -> Result<bool>;
}

#[derive(Clone)]
pub struct S3ObjectStore {
    client: S3Client,
    bucket: String,
    liveness: HealthHandle,
}

impl S3ObjectStore {
    pub async fn new(
        bucket: String,
        s3_endpoint: Option<String>,
        liveness: HealthHandle,
    ) -> Result<S3ObjectStore> {
        info!("initializing S3 object store with bucket: {}", bucket);

        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(s3_endpoint) = s3_endpoint.clone() {
            config_loader = config_loader.endpoint_url(s3_endpoint);
        }

        let mut config = Builder::from(&config_loader.load().await);
        if s3_endpoint.is_some() {
            // custom s3 endpoints need force_path_style set
            config = config.force_path_style(true);
        }

        let store = S3ObjectStore {
            client: S3Client::from_conf(config.build()),
            bucket,
            liveness,
        };
        store.healthcheck().await;

        let monitor = store.clone();
        task::spawn(async move {
            loop {
                sleep(HEALTH_INTERVAL).await;
                monitor.healthcheck().await;
            }
        });

        Ok(store)
    }

    async fn healthcheck(&self) {
        if self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .is_ok()
        {
            self.liveness.report_healthy();
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into())
            .content_type("application/json")
            .send()
            .await
            .map_err(|err| {
                error!("failed to write {} to S3: {}", key, err);
                counter!("webhook_object_store_errors_total", &[("op", "put")]).increment(1);
                err
            })?;
        self.liveness.report_healthy();
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => {
                let body = output
                    .body
                    .collect()
                    .await
                    .context("failed to read object body")?;
                Ok(Some(body.into_bytes().to_vec()))
            }
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_no_such_key()) {
                    return Ok(None);
                }
                counter!("webhook_object_store_errors_total", &[("op", "get")]).increment(1);
                Err(err.into())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| {
                error!("failed to delete {} from S3: {}", key, err);
                counter!("webhook_object_store_errors_total", &[("op", "delete")]).increment(1);
                err
            })?;
        Ok(())
    }

    async fn any_with_prefix(&self, prefix: &str) -> Result<bool> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(1)
            .send()
            .await?;
        Ok(output.key_count().unwrap_or(0) > 0)
    }
}

/// Process-local store, used by tests and the in-memory dev mode.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> MemoryObjectStore {
        MemoryObjectStore::default()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.objects.write().await.insert(key.to_owned(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn any_with_prefix(&self, prefix: &str) -> Result<bool> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_owned()..)
            .next()
            .is_some_and(|(key, _)| key.starts_with(prefix)))
    }
}
