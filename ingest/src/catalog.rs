use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::api::IngestError;
use crate::classify::EventKind;
use crate::store::ObjectStore;

/// Processing stamp carried by tenant catalog entries under `_metadata`.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectionMetadata {
    pub processing_timestamp: String,
    pub payload_hash: String,
    pub event_version: String,
    pub event_type: EventKind,
}

/// Two-tier product catalog.
///
/// The master tier holds one tenant-agnostic definition per product,
/// replaced wholesale on every create/update (last write wins, no
/// merging). The store tier holds per-tenant projections: a snapshot of
/// the master definition with the tenant's own variant prices applied.
/// Projections are snapshots, not references; they go stale when another
/// event rewrites the master and catch up on the tenant's next event.
#[derive(Clone)]
pub struct Catalog {
    store: Arc<dyn ObjectStore>,
}

impl Catalog {
    pub fn new(store: Arc<dyn ObjectStore>) -> Catalog {
        Catalog { store }
    }

    pub fn master_key(product_id: &str) -> String {
        format!("master/products/{product_id}.json")
    }

    pub fn tenant_key(tenant_id: &str, product_id: &str) -> String {
        format!("stores/{tenant_id}/products/{product_id}.json")
    }

    pub async fn upsert_master(
        &self,
        product_id: &str,
        definition: &Value,
    ) -> Result<String, IngestError> {
        let key = Self::master_key(product_id);
        self.put_json(&key, definition).await?;
        info!("updated master catalog entry: {}", key);
        Ok(key)
    }

    /// Derives the tenant's catalog entry from the current master
    /// definition (or from the inbound definition while no master
    /// exists), replacing variant prices with the tenant-supplied ones
    /// and stamping the tenant id and processing metadata.
    pub async fn project_to_tenant(
        &self,
        tenant_id: &str,
        product_id: &str,
        inbound: &Value,
        stamp: &ProjectionMetadata,
    ) -> Result<String, IngestError> {
        let mut projected = match self.read_master(product_id).await {
            Some(master) => master,
            None => inbound.clone(),
        };

        apply_price_overrides(&mut projected, inbound);
        if let Some(object) = projected.as_object_mut() {
            object.insert("store_id".to_string(), json!(tenant_id));
            object.insert("_metadata".to_string(), serde_json::to_value(stamp)?);
        }

        let key = Self::tenant_key(tenant_id, product_id);
        self.put_json(&key, &projected).await?;
        info!("updated tenant catalog entry: {}", key);
        Ok(key)
    }

    /// Removes the tenant's projection only. The master entry survives
    /// deletions so that history is preserved and other tenants keep
    /// their projections.
    pub async fn remove_from_tenant(
        &self,
        tenant_id: &str,
        product_id: &str,
    ) -> Result<(), IngestError> {
        let key = Self::tenant_key(tenant_id, product_id);
        self.store.delete(&key).await.map_err(|err| {
            error!("failed to delete tenant catalog entry {}: {}", key, err);
            IngestError::CatalogWriteFailed
        })?;
        info!("removed tenant catalog entry: {}", key);
        Ok(())
    }

    pub async fn has_master(&self, product_id: &str) -> anyhow::Result<bool> {
        Ok(self
            .store
            .get(&Self::master_key(product_id))
            .await?
            .is_some())
    }

    async fn read_master(&self, product_id: &str) -> Option<Value> {
        let key = Self::master_key(product_id);
        let body = match self.store.get(&key).await {
            Ok(body) => body?,
            Err(err) => {
                warn!("master catalog read failed for {}, projecting from inbound definition: {}", key, err);
                return None;
            }
        };
        match serde_json::from_slice(&body) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!("unreadable master catalog entry {}: {}", key, err);
                None
            }
        }
    }

    async fn put_json(&self, key: &str, value: &Value) -> Result<(), IngestError> {
        let body = serde_json::to_vec_pretty(value)?;
        self.store.put(key, body).await.map_err(|err| {
            error!("failed to write catalog entry {}: {}", key, err);
            IngestError::CatalogWriteFailed
        })
    }
}

/// Tenant-supplied prices replace the projected variants' prices.
/// Variants are matched by id when the override carries one, by
/// position otherwise (the reduced schema sends bare `{"price": ...}`
/// rows).
fn apply_price_overrides(projected: &mut Value, inbound: &Value) {
    let Some(overrides) = inbound.get("product_variants").and_then(Value::as_array) else {
        return;
    };
    let Some(variants) = projected
        .get_mut("product_variants")
        .and_then(Value::as_array_mut)
    else {
        return;
    };

    for (position, incoming) in overrides.iter().enumerate() {
        let Some(price) = incoming.get("price") else {
            continue;
        };
        let target = match incoming.get("id") {
            Some(id) => variants.iter_mut().find(|v| v.get("id") == Some(id)),
            None => variants.get_mut(position),
        };
        if let Some(object) = target.and_then(Value::as_object_mut) {
            object.insert("price".to_string(), price.clone());
        }
    }
}
