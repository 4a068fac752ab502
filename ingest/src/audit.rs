use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{error, info};

use crate::api::IngestError;
use crate::classify::EventKind;
use crate::store::ObjectStore;

/// Append-only storage of payloads exactly as they were delivered.
/// Records are partitioned by store, kind and processing date, and are
/// never redacted, overwritten or deleted by this service.
#[derive(Clone)]
pub struct AuditWriter {
    store: Arc<dyn ObjectStore>,
}

#[derive(Serialize)]
struct TenantMetadata<'a> {
    store_domain: Option<&'a str>,
    store_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    product_id: Option<&'a str>,
}

impl AuditWriter {
    pub fn new(store: Arc<dyn ObjectStore>) -> AuditWriter {
        AuditWriter { store }
    }

    /// `{store_id}/{event_kind}/{yyyy}/{mm}/{dd}/{event_id}.json`
    pub fn object_key(
        tenant_id: &str,
        kind: EventKind,
        at: OffsetDateTime,
        event_id: &str,
    ) -> String {
        format!(
            "{}/{}/{}/{:02}/{:02}/{}.json",
            tenant_id,
            kind.as_str(),
            at.year(),
            u8::from(at.month()),
            at.day(),
            event_id
        )
    }

    pub async fn write_raw(
        &self,
        payload: &Value,
        tenant_id: &str,
        kind: EventKind,
        at: OffsetDateTime,
        event_id: &str,
    ) -> Result<String, IngestError> {
        let key = Self::object_key(tenant_id, kind, at, event_id);
        let body = serde_json::to_vec_pretty(payload)?;
        self.store.put(&key, body).await.map_err(|err| {
            error!("failed to write audit record {}: {}", key, err);
            IngestError::AuditWriteFailed
        })?;
        info!("stored raw payload: {}", key);
        Ok(key)
    }

    /// Store-creation events get a sibling object describing the
    /// onboarded store, next to the raw record.
    pub async fn write_tenant_metadata(
        &self,
        raw_key: &str,
        tenant_domain: Option<&str>,
        tenant_id: &str,
        product_id: Option<&str>,
    ) -> Result<String, IngestError> {
        let key = match raw_key.strip_suffix(".json") {
            Some(stem) => format!("{stem}.metadata.json"),
            None => format!("{raw_key}.metadata.json"),
        };
        let metadata = TenantMetadata {
            store_domain: tenant_domain,
            store_id: tenant_id,
            product_id,
        };
        let body = serde_json::to_vec_pretty(&metadata)?;
        self.store.put(&key, body).await.map_err(|err| {
            error!("failed to write store metadata {}: {}", key, err);
            IngestError::AuditWriteFailed
        })?;
        Ok(key)
    }

    /// Whether any audit record exists for this store. Serves as the
    /// existence fallback when the entity directory has no answer.
    pub async fn has_records_for(&self, tenant_id: &str) -> anyhow::Result<bool> {
        self.store.any_with_prefix(&format!("{tenant_id}/")).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Value};
    use time::macros::datetime;

    use crate::audit::AuditWriter;
    use crate::classify::EventKind;
    use crate::store::{MemoryObjectStore, ObjectStore};

    #[test]
    fn key_layout() {
        let key = AuditWriter::object_key(
            "store-1",
            EventKind::ProductCreate,
            datetime!(2026-08-04 09:30:00 UTC),
            "abcd1234abcd1234-1700000000",
        );
        assert_eq!(
            key,
            "store-1/product_create/2026/08/04/abcd1234abcd1234-1700000000.json"
        );
    }

    #[tokio::test]
    async fn writes_payload_verbatim() {
        let store = Arc::new(MemoryObjectStore::new());
        let writer = AuditWriter::new(store.clone());
        let payload = json!({
            "products": {"id": "p1", "created_at": "2024-01-01T00:00:00Z"}
        });

        let key = writer
            .write_raw(
                &payload,
                "store-1",
                EventKind::ProductUpdate,
                datetime!(2026-08-24 12:00:00 UTC),
                "evt-1",
            )
            .await
            .unwrap();

        let body = store.get(&key).await.unwrap().unwrap();
        let stored: Value = serde_json::from_slice(&body).unwrap();
        // The audit copy keeps fields the processed copy strips.
        assert_eq!(stored, payload);
    }

    #[tokio::test]
    async fn metadata_sits_next_to_the_raw_record() {
        let store = Arc::new(MemoryObjectStore::new());
        let writer = AuditWriter::new(store.clone());

        let key = writer
            .write_tenant_metadata(
                "store-1/store_create/2026/08/24/evt-1.json",
                Some("shop.example.com"),
                "store-1",
                None,
            )
            .await
            .unwrap();

        assert_eq!(key, "store-1/store_create/2026/08/24/evt-1.metadata.json");
        let body = store.get(&key).await.unwrap().unwrap();
        let stored: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            stored,
            json!({"store_domain": "shop.example.com", "store_id": "store-1"})
        );
    }

    #[tokio::test]
    async fn prefix_search_finds_store_records() {
        let store = Arc::new(MemoryObjectStore::new());
        let writer = AuditWriter::new(store);
        writer
            .write_raw(
                &json!({}),
                "store-1",
                EventKind::Unknown,
                datetime!(2026-08-24 12:00:00 UTC),
                "evt-1",
            )
            .await
            .unwrap();

        assert!(writer.has_records_for("store-1").await.unwrap());
        assert!(!writer.has_records_for("store-2").await.unwrap());
    }
}
