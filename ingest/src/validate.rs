use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use metrics::counter;
use tokio::sync::RwLock;
use tracing::warn;

use crate::audit::AuditWriter;
use crate::catalog::Catalog;
use crate::redis::Client;

const TENANT_SET_KEY: &str = "known:stores";
const PRODUCT_SET_KEY: &str = "known:products";

/// Source of truth for which stores and products have been provisioned
/// by the administrative system. This engine only reads it; entity
/// creation lives elsewhere.
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    async fn tenant_exists(&self, tenant_id: &str) -> Result<bool>;
    async fn product_exists(&self, product_id: &str) -> Result<bool>;
}

/// Membership lookups against the sets the administrative system keeps
/// up to date.
pub struct RedisDirectory {
    redis: Arc<dyn Client>,
    tenant_key: String,
    product_key: String,
}

impl RedisDirectory {
    pub fn new(redis: Arc<dyn Client>, key_prefix: Option<String>) -> RedisDirectory {
        let prefix = key_prefix.unwrap_or_default();
        RedisDirectory {
            redis,
            tenant_key: format!("{prefix}{TENANT_SET_KEY}"),
            product_key: format!("{prefix}{PRODUCT_SET_KEY}"),
        }
    }
}

#[async_trait]
impl EntityDirectory for RedisDirectory {
    async fn tenant_exists(&self, tenant_id: &str) -> Result<bool> {
        self.redis
            .sismember(self.tenant_key.clone(), tenant_id.to_owned())
            .await
    }

    async fn product_exists(&self, product_id: &str) -> Result<bool> {
        self.redis
            .sismember(self.product_key.clone(), product_id.to_owned())
            .await
    }
}

/// Process-local directory, used by tests and the in-memory dev mode.
#[derive(Default)]
pub struct MemoryDirectory {
    tenants: RwLock<HashSet<String>>,
    products: RwLock<HashSet<String>>,
}

impl MemoryDirectory {
    pub fn new() -> MemoryDirectory {
        MemoryDirectory::default()
    }

    pub async fn add_tenant(&self, tenant_id: &str) {
        self.tenants.write().await.insert(tenant_id.to_owned());
    }

    pub async fn add_product(&self, product_id: &str) {
        self.products.write().await.insert(product_id.to_owned());
    }
}

#[async_trait]
impl EntityDirectory for MemoryDirectory {
    async fn tenant_exists(&self, tenant_id: &str) -> Result<bool> {
        Ok(self.tenants.read().await.contains(tenant_id))
    }

    async fn product_exists(&self, product_id: &str) -> Result<bool> {
        Ok(self.products.read().await.contains(product_id))
    }
}

/// Checks that the entities an event references are known. Non-existence
/// is never fatal: provisioning belongs to the administrative workflow,
/// so an unknown entity is a warning and a counter, nothing more. When
/// the directory is unreachable we fall back to what this engine has
/// already seen: audit records for stores, the master catalog entry for
/// products. Entities onboarded through this engine only ever show up
/// there.
pub struct EntityValidator {
    directory: Arc<dyn EntityDirectory>,
    audit: AuditWriter,
    catalog: Catalog,
}

impl EntityValidator {
    pub fn new(
        directory: Arc<dyn EntityDirectory>,
        audit: AuditWriter,
        catalog: Catalog,
    ) -> EntityValidator {
        EntityValidator {
            directory,
            audit,
            catalog,
        }
    }

    pub async fn check_tenant(&self, tenant_id: &str, provisioned: bool) {
        if provisioned {
            // A freshly generated id cannot exist anywhere yet.
            report_unknown("store", tenant_id);
            return;
        }
        let known = match self.directory.tenant_exists(tenant_id).await {
            Ok(known) => known,
            Err(err) => {
                warn!(
                    "entity directory unavailable, checking audit trail for store {}: {}",
                    tenant_id, err
                );
                self.audit.has_records_for(tenant_id).await.unwrap_or(false)
            }
        };
        if !known {
            report_unknown("store", tenant_id);
        }
    }

    pub async fn check_product(&self, product_id: &str, provisioned: bool) {
        if provisioned {
            report_unknown("product", product_id);
            return;
        }
        let known = match self.directory.product_exists(product_id).await {
            Ok(known) => known,
            Err(err) => {
                warn!(
                    "entity directory unavailable, checking master catalog for product {}: {}",
                    product_id, err
                );
                self.catalog.has_master(product_id).await.unwrap_or(false)
            }
        };
        if !known {
            report_unknown("product", product_id);
        }
    }
}

fn report_unknown(entity: &'static str, id: &str) {
    warn!(
        "{} {} is not known to the source of truth, processing anyway",
        entity, id
    );
    counter!("webhook_unknown_entity_total", &[("entity", entity)]).increment(1);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use time::macros::datetime;

    use crate::audit::AuditWriter;
    use crate::catalog::Catalog;
    use crate::classify::EventKind;
    use crate::redis::MockRedisClient;
    use crate::store::MemoryObjectStore;
    use crate::validate::{EntityDirectory, MemoryDirectory, RedisDirectory};

    #[tokio::test]
    async fn memory_directory_membership() {
        let directory = MemoryDirectory::new();
        directory.add_tenant("s1").await;

        assert!(directory.tenant_exists("s1").await.unwrap());
        assert!(!directory.tenant_exists("s2").await.unwrap());
        assert!(!directory.product_exists("p1").await.unwrap());
    }

    #[tokio::test]
    async fn redis_directory_uses_prefixed_sets() {
        let client = MockRedisClient::new()
            .sismember_ret("ingest:known:stores", vec!["s1".to_string()])
            .sismember_ret("ingest:known:products", vec!["p1".to_string()]);
        let directory = RedisDirectory::new(Arc::new(client), Some("ingest:".to_string()));

        assert!(directory.tenant_exists("s1").await.unwrap());
        assert!(!directory.tenant_exists("p1").await.unwrap());
        assert!(directory.product_exists("p1").await.unwrap());
    }

    #[tokio::test]
    async fn broken_directory_falls_back_to_engine_state() {
        let store = Arc::new(MemoryObjectStore::new());
        let audit = AuditWriter::new(store.clone());
        audit
            .write_raw(
                &json!({}),
                "s1",
                EventKind::TenantCreate,
                datetime!(2026-08-24 12:00:00 UTC),
                "evt-1",
            )
            .await
            .unwrap();
        let catalog = Catalog::new(store);
        catalog
            .upsert_master("p1", &json!({"name": "Widget"}))
            .await
            .unwrap();

        let directory = Arc::new(MockRedisClient::new().broken());
        let validator = super::EntityValidator::new(
            Arc::new(RedisDirectory::new(directory, None)),
            audit,
            catalog,
        );

        // Fallback paths resolve without panicking for both known and
        // unknown entities; unknown ones only warn.
        validator.check_tenant("s1", false).await;
        validator.check_tenant("s2", false).await;
        validator.check_product("p1", false).await;
        validator.check_product("p2", false).await;
    }
}
