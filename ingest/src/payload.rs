use metrics::counter;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::api::IngestError;

/// Input schema variant, resolved once when the payload is normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Full nested schema, no explicit kind: `{"products": {...}}` or a
    /// store object under `store_id`.
    Legacy,
    /// Reduced schema carrying an explicit `event_type` hint.
    Simplified,
}

/// Uniform view over both accepted payload shapes.
///
/// The raw value is kept exactly as received: the audit trail and the
/// payload fingerprint are both computed from it, so nothing in the
/// pipeline may mutate it. All derived fields are extracted once here.
#[derive(Debug, Clone)]
pub struct CanonicalEvent {
    raw: Value,
    shape: Shape,
    hint: Option<String>,
    tenant_id: Option<String>,
    product_id: Option<String>,
    tenant_domain: Option<String>,
}

impl CanonicalEvent {
    pub fn from_bytes(body: &[u8]) -> Result<CanonicalEvent, IngestError> {
        let raw: Value = serde_json::from_slice(body)
            .map_err(|e| IngestError::RequestDecodingError(e.to_string()))?;
        Ok(Self::from_value(raw))
    }

    pub fn from_value(raw: Value) -> CanonicalEvent {
        let hint = raw
            .get("event_type")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let shape = match hint {
            Some(_) => Shape::Simplified,
            None => Shape::Legacy,
        };

        let product_id = raw
            .get("products")
            .and_then(|p| p.get("product_id").or_else(|| p.get("id")))
            .and_then(Value::as_str)
            .map(str::to_owned);

        // Product payloads carry their store under `products.store_id`;
        // store payloads carry it top-level, either as a plain identifier
        // or as a full store object.
        let tenant_id = raw
            .get("products")
            .and_then(|p| p.get("store_id"))
            .or_else(|| raw.get("store_id"))
            .and_then(|v| v.as_str().or_else(|| v.get("id").and_then(Value::as_str)))
            .map(str::to_owned);

        let tenant_domain = raw
            .get("store_domain")
            .and_then(Value::as_str)
            .map(str::to_owned);

        CanonicalEvent {
            raw,
            shape,
            hint,
            tenant_id,
            product_id,
            tenant_domain,
        }
    }

    /// The payload exactly as delivered.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    pub fn product_id(&self) -> Option<&str> {
        self.product_id.as_deref()
    }

    pub fn tenant_domain(&self) -> Option<&str> {
        self.tenant_domain.as_deref()
    }

    pub fn has_product_payload(&self) -> bool {
        self.raw.get("products").is_some()
    }

    pub fn product(&self) -> Option<&Map<String, Value>> {
        self.raw.get("products").and_then(Value::as_object)
    }

    /// Legacy store events deliver the store as an object under `store_id`.
    pub fn tenant_object(&self) -> Option<&Map<String, Value>> {
        self.raw.get("store_id").and_then(Value::as_object)
    }
}

/// Identifiers the rest of the pipeline works with. Events may arrive
/// without a store identifier (and product events without a product
/// identifier); those are provisioned here so that every audit record,
/// catalog entry and registry row is addressable. Generated identifiers
/// are never written back into the raw payload.
#[derive(Debug, Clone)]
pub struct EventIdentity {
    pub tenant_id: String,
    pub tenant_provisioned: bool,
    pub product_id: Option<String>,
    pub product_provisioned: bool,
}

impl EventIdentity {
    pub fn provision(event: &CanonicalEvent) -> EventIdentity {
        let (tenant_id, tenant_provisioned) = match event.tenant_id() {
            Some(id) => (id.to_owned(), false),
            None => {
                let id = Uuid::new_v4().to_string();
                info!(tenant_id = %id, "payload carried no store identifier, provisioned one");
                counter!("webhook_generated_identifiers_total", &[("entity", "store")])
                    .increment(1);
                (id, true)
            }
        };

        let (product_id, product_provisioned) = match event.product_id() {
            Some(id) => (Some(id.to_owned()), false),
            None if event.has_product_payload() => {
                let id = Uuid::new_v4().to_string();
                info!(product_id = %id, "product payload carried no identifier, provisioned one");
                counter!("webhook_generated_identifiers_total", &[("entity", "product")])
                    .increment(1);
                (Some(id), true)
            }
            None => (None, false),
        };

        EventIdentity {
            tenant_id,
            tenant_provisioned,
            product_id,
            product_provisioned,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use crate::payload::{CanonicalEvent, EventIdentity, Shape};

    #[test]
    fn detects_shape_by_hint_presence() {
        let legacy = CanonicalEvent::from_value(json!({"products": {"id": "p1"}}));
        assert_eq!(legacy.shape(), Shape::Legacy);
        assert_eq!(legacy.hint(), None);

        let simplified = CanonicalEvent::from_value(json!({
            "event_type": "new_product",
            "products": {"product_id": "p1", "store_id": "s1"}
        }));
        assert_eq!(simplified.shape(), Shape::Simplified);
        assert_eq!(simplified.hint(), Some("new_product"));
    }

    #[test]
    fn extracts_product_id_from_either_field() {
        let new_schema = CanonicalEvent::from_value(json!({
            "products": {"product_id": "p-new", "id": "ignored-when-product-id-present"}
        }));
        assert_eq!(new_schema.product_id(), Some("p-new"));

        let old_schema = CanonicalEvent::from_value(json!({"products": {"id": "p-old"}}));
        assert_eq!(old_schema.product_id(), Some("p-old"));

        let none = CanonicalEvent::from_value(json!({"event_type": "new_store"}));
        assert_eq!(none.product_id(), None);
    }

    #[test]
    fn extracts_tenant_id_from_product_store_or_top_level() {
        let nested = CanonicalEvent::from_value(json!({"products": {"store_id": "s1"}}));
        assert_eq!(nested.tenant_id(), Some("s1"));

        let top_level = CanonicalEvent::from_value(json!({"store_id": "s2"}));
        assert_eq!(top_level.tenant_id(), Some("s2"));

        let store_object =
            CanonicalEvent::from_value(json!({"store_id": {"id": "s3", "name": "Shop"}}));
        assert_eq!(store_object.tenant_id(), Some("s3"));
        assert!(store_object.tenant_object().is_some());
    }

    #[test]
    fn provisions_missing_identifiers() {
        let event = CanonicalEvent::from_value(json!({"products": {"name": "no ids at all"}}));
        let identity = EventIdentity::provision(&event);

        assert!(identity.tenant_provisioned);
        assert!(Uuid::parse_str(&identity.tenant_id).is_ok());
        assert!(identity.product_provisioned);
        assert!(Uuid::parse_str(identity.product_id.as_deref().unwrap()).is_ok());
    }

    #[test]
    fn keeps_supplied_identifiers() {
        let event = CanonicalEvent::from_value(json!({
            "products": {"product_id": "p1", "store_id": "s1"}
        }));
        let identity = EventIdentity::provision(&event);

        assert!(!identity.tenant_provisioned);
        assert_eq!(identity.tenant_id, "s1");
        assert!(!identity.product_provisioned);
        assert_eq!(identity.product_id.as_deref(), Some("p1"));
    }

    #[test]
    fn no_product_id_provisioned_without_product_payload() {
        let event = CanonicalEvent::from_value(json!({"event_type": "new_store"}));
        let identity = EventIdentity::provision(&event);

        assert!(identity.tenant_provisioned);
        assert_eq!(identity.product_id, None);
        assert!(!identity.product_provisioned);
    }

    #[test]
    fn tolerates_non_object_payloads() {
        let event = CanonicalEvent::from_value(json!(["not", "an", "object"]));
        assert_eq!(event.shape(), Shape::Legacy);
        assert_eq!(event.tenant_id(), None);
        assert!(!event.has_product_payload());
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(CanonicalEvent::from_bytes(b"{not json").is_err());
    }
}
