use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::classify::EventKind;
use crate::redis::Client;

const REGISTRY_KEY_PREFIX: &str = "event_registry:";

pub const STATUS_PROCESSED: &str = "processed";

/// Ledger row recording that a payload fingerprint has been processed.
/// Written exactly once per accepted event, read to suppress duplicates,
/// never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub payload_hash: String,
    pub processing_timestamp: String,
    pub event_id: String,
    pub event_type: EventKind,
    pub store_id: String,
    pub s3_key: String,
    pub status: String,
    pub routing_target: String,
    /// Unix timestamp after which the row may be dropped.
    pub ttl: i64,
}

#[async_trait]
pub trait Registry: Send + Sync {
    /// The most recent registration for this fingerprint, if any.
    async fn most_recent(&self, fingerprint: &str) -> Result<Option<RegistryEntry>>;

    /// Records a completed processing run. This write is the durable
    /// commit point of the pipeline: until it lands, a redelivery of the
    /// same payload will be processed again.
    async fn register(&self, entry: &RegistryEntry) -> Result<()>;
}

/// Registrations are kept in one sorted set per fingerprint, scored by
/// processing time, so concurrent double-writes of the same fingerprint
/// coexist and the newest one wins lookups.
pub struct RedisRegistry {
    redis: Arc<dyn Client>,
    key_prefix: String,
    retention: Duration,
}

impl RedisRegistry {
    pub fn new(
        redis: Arc<dyn Client>,
        retention: Duration,
        key_prefix: Option<String>,
    ) -> RedisRegistry {
        RedisRegistry {
            redis,
            key_prefix: format!("{}{}", key_prefix.unwrap_or_default(), REGISTRY_KEY_PREFIX),
            retention,
        }
    }

    fn entry_key(&self, fingerprint: &str) -> String {
        format!("{}{}", self.key_prefix, fingerprint)
    }
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn most_recent(&self, fingerprint: &str) -> Result<Option<RegistryEntry>> {
        let members = self
            .redis
            .zrevrange(self.entry_key(fingerprint), 0, 0)
            .await?;
        match members.first() {
            Some(member) => Ok(Some(serde_json::from_str(member)?)),
            None => Ok(None),
        }
    }

    async fn register(&self, entry: &RegistryEntry) -> Result<()> {
        let key = self.entry_key(&entry.payload_hash);
        let member = serde_json::to_string(entry)?;
        let registered_at = OffsetDateTime::parse(&entry.processing_timestamp, &Rfc3339)?;

        self.redis
            .zadd(key.clone(), member, registered_at.unix_timestamp() as f64)
            .await?;
        self.redis
            .expire(key, self.retention.as_secs() as usize)
            .await?;
        Ok(())
    }
}

/// Process-local ledger, used by tests and the in-memory dev mode.
#[derive(Default)]
pub struct MemoryRegistry {
    entries: RwLock<HashMap<String, Vec<RegistryEntry>>>,
}

impl MemoryRegistry {
    pub fn new() -> MemoryRegistry {
        MemoryRegistry::default()
    }

    pub async fn entries_for(&self, fingerprint: &str) -> Vec<RegistryEntry> {
        self.entries
            .read()
            .await
            .get(fingerprint)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn most_recent(&self, fingerprint: &str) -> Result<Option<RegistryEntry>> {
        Ok(self
            .entries
            .read()
            .await
            .get(fingerprint)
            .and_then(|entries| entries.last().cloned()))
    }

    async fn register(&self, entry: &RegistryEntry) -> Result<()> {
        self.entries
            .write()
            .await
            .entry(entry.payload_hash.clone())
            .or_default()
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use crate::classify::EventKind;
    use crate::redis::MockRedisClient;
    use crate::registry::{
        MemoryRegistry, RedisRegistry, Registry, RegistryEntry, STATUS_PROCESSED,
    };

    fn entry(event_id: &str, timestamp: &str) -> RegistryEntry {
        RegistryEntry {
            payload_hash: "aa".repeat(32),
            processing_timestamp: timestamp.to_string(),
            event_id: event_id.to_string(),
            event_type: EventKind::ProductCreate,
            store_id: "store-1".to_string(),
            s3_key: format!("store-1/product_create/2026/08/24/{event_id}.json"),
            status: STATUS_PROCESSED.to_string(),
            routing_target: "product-service".to_string(),
            ttl: 1_976_000_000,
        }
    }

    #[tokio::test]
    async fn memory_registry_returns_latest() {
        let registry = MemoryRegistry::new();
        let fingerprint = "aa".repeat(32);

        assert_eq!(registry.most_recent(&fingerprint).await.unwrap(), None);

        let first = entry("first-1700000000", "2026-08-24T12:00:00Z");
        let second = entry("second-1700000060", "2026-08-24T12:01:00Z");
        registry.register(&first).await.unwrap();
        registry.register(&second).await.unwrap();

        assert_eq!(
            registry.most_recent(&fingerprint).await.unwrap(),
            Some(second)
        );
        assert_eq!(registry.entries_for(&fingerprint).await.len(), 2);
    }

    #[tokio::test]
    async fn redis_registry_lookup() {
        let fingerprint = "aa".repeat(32);
        let stored = entry("first-1700000000", "2026-08-24T12:00:00Z");

        let client = MockRedisClient::new().zrevrange_ret(
            &format!("event_registry:{fingerprint}"),
            vec![serde_json::to_string(&stored).unwrap()],
        );
        let registry = RedisRegistry::new(
            Arc::new(client),
            Duration::from_secs(7 * 365 * 24 * 60 * 60),
            None,
        );

        assert_eq!(
            registry.most_recent(&fingerprint).await.unwrap(),
            Some(stored)
        );
        assert_eq!(registry.most_recent("bb").await.unwrap(), None);
    }

    #[tokio::test]
    async fn redis_registry_register_sets_expiry() {
        let client = MockRedisClient::new();
        let retention = Duration::from_secs(7 * 365 * 24 * 60 * 60);
        let registry = RedisRegistry::new(
            Arc::new(client.clone()),
            retention,
            Some("ingest:".to_string()),
        );

        let stored = entry("first-1700000000", "2026-08-24T12:00:00Z");
        registry.register(&stored).await.unwrap();

        let zadds = client.zadd_calls();
        assert_eq!(zadds.len(), 1);
        let (key, member, score) = &zadds[0];
        assert_eq!(key, &format!("ingest:event_registry:{}", stored.payload_hash));
        assert_eq!(
            serde_json::from_str::<RegistryEntry>(member).unwrap(),
            stored
        );
        assert_eq!(*score, 1_787_572_800.0);

        let expires = client.expire_calls();
        assert_eq!(expires.len(), 1);
        assert_eq!(expires[0].1, retention.as_secs() as usize);
    }

    #[tokio::test]
    async fn redis_registry_propagates_failures() {
        let client = MockRedisClient::new().broken();
        let registry = RedisRegistry::new(Arc::new(client), Duration::from_secs(60), None);

        assert!(registry.most_recent("aa").await.is_err());
        assert!(registry.register(&entry("x-1", "2026-08-24T12:00:00Z")).await.is_err());
    }
}
