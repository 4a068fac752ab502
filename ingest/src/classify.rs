use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::payload::CanonicalEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "product_create")]
    ProductCreate,
    #[serde(rename = "product_update")]
    ProductUpdate,
    #[serde(rename = "product_delete")]
    ProductDelete,
    #[serde(rename = "store_create")]
    TenantCreate,
    #[serde(rename = "store_update")]
    TenantUpdate,
    #[serde(rename = "store_delete")]
    TenantDelete,
    #[serde(rename = "unknown")]
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ProductCreate => "product_create",
            EventKind::ProductUpdate => "product_update",
            EventKind::ProductDelete => "product_delete",
            EventKind::TenantCreate => "store_create",
            EventKind::TenantUpdate => "store_update",
            EventKind::TenantDelete => "store_delete",
            EventKind::Unknown => "unknown",
        }
    }

    pub fn is_product(&self) -> bool {
        matches!(
            self,
            EventKind::ProductCreate | EventKind::ProductUpdate | EventKind::ProductDelete
        )
    }

    pub fn is_tenant(&self) -> bool {
        matches!(
            self,
            EventKind::TenantCreate | EventKind::TenantUpdate | EventKind::TenantDelete
        )
    }

    pub fn routing_target(&self) -> &'static str {
        match self {
            EventKind::ProductCreate | EventKind::ProductUpdate | EventKind::ProductDelete => {
                "product-service"
            }
            EventKind::TenantCreate | EventKind::TenantUpdate | EventKind::TenantDelete => {
                "store-service"
            }
            EventKind::Unknown => "default-handler",
        }
    }

    fn from_hint(hint: &str) -> Option<EventKind> {
        HINT_KINDS
            .iter()
            .find(|(name, _)| *name == hint)
            .map(|(_, kind)| *kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hint vocabulary used by senders of the simplified schema. Canonical
/// kind names are accepted as hints too.
const HINT_KINDS: &[(&str, EventKind)] = &[
    ("new_product", EventKind::ProductCreate),
    ("product_update", EventKind::ProductUpdate),
    ("product_deletion", EventKind::ProductDelete),
    ("new_store", EventKind::TenantCreate),
    ("updated_store", EventKind::TenantUpdate),
    ("deleted_store", EventKind::TenantDelete),
    ("product_create", EventKind::ProductCreate),
    ("product_delete", EventKind::ProductDelete),
    ("store_create", EventKind::TenantCreate),
    ("store_update", EventKind::TenantUpdate),
    ("store_delete", EventKind::TenantDelete),
];

type Predicate = fn(&CanonicalEvent) -> bool;

/// Structural inference rules, evaluated in order; the first match wins.
/// Product rules come first: a payload carrying both a product and a
/// store object is a product event.
const STRUCTURAL_RULES: &[(Predicate, EventKind)] = &[
    (product_deletion_marker, EventKind::ProductDelete),
    (product_identity, EventKind::ProductUpdate),
    (product_payload, EventKind::ProductCreate),
    (tenant_deletion_marker, EventKind::TenantDelete),
    (tenant_identity, EventKind::TenantUpdate),
    (tenant_payload, EventKind::TenantCreate),
];

/// Assigns an event kind. An explicit hint always wins, even when it is
/// structurally inconsistent with the payload; an unrecognized hint falls
/// back to structural inference.
pub fn classify(event: &CanonicalEvent) -> EventKind {
    if let Some(kind) = event.hint().and_then(EventKind::from_hint) {
        return kind;
    }
    STRUCTURAL_RULES
        .iter()
        .find(|(applies, _)| applies(event))
        .map(|(_, kind)| *kind)
        .unwrap_or(EventKind::Unknown)
}

fn product_deletion_marker(event: &CanonicalEvent) -> bool {
    event
        .product()
        .and_then(|p| p.get("archived_at"))
        .is_some_and(set_and_non_empty)
}

fn product_identity(event: &CanonicalEvent) -> bool {
    event
        .product()
        .and_then(|p| p.get("id"))
        .is_some_and(set_and_non_empty)
}

fn product_payload(event: &CanonicalEvent) -> bool {
    event.has_product_payload()
}

fn tenant_deletion_marker(event: &CanonicalEvent) -> bool {
    event
        .tenant_object()
        .and_then(|t| t.get("archived_at"))
        .is_some_and(set_and_non_empty)
}

fn tenant_identity(event: &CanonicalEvent) -> bool {
    event
        .tenant_object()
        .and_then(|t| t.get("id"))
        .is_some_and(set_and_non_empty)
}

fn tenant_payload(event: &CanonicalEvent) -> bool {
    event.tenant_object().is_some_and(|t| !t.is_empty())
}

/// Markers are "set" when they hold a meaningful value: `archived_at:
/// null` on an active product must not read as a deletion.
fn set_and_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::classify::{classify, EventKind};
    use crate::payload::CanonicalEvent;

    fn kind_of(payload: serde_json::Value) -> EventKind {
        classify(&CanonicalEvent::from_value(payload))
    }

    #[test]
    fn hint_lookup_table() {
        let cases = [
            ("new_product", EventKind::ProductCreate),
            ("product_update", EventKind::ProductUpdate),
            ("product_deletion", EventKind::ProductDelete),
            ("new_store", EventKind::TenantCreate),
            ("updated_store", EventKind::TenantUpdate),
            ("deleted_store", EventKind::TenantDelete),
        ];
        for (hint, expected) in cases {
            assert_eq!(kind_of(json!({"event_type": hint})), expected, "{hint}");
        }
    }

    #[test]
    fn hint_wins_over_structure() {
        // Structurally a deletion, but the hint says otherwise.
        let kind = kind_of(json!({
            "event_type": "new_product",
            "products": {"id": "p1", "archived_at": "2026-01-01T00:00:00Z"}
        }));
        assert_eq!(kind, EventKind::ProductCreate);
    }

    #[test]
    fn unrecognized_hint_falls_back_to_structure() {
        let kind = kind_of(json!({
            "event_type": "something_else",
            "products": {"id": "p1"}
        }));
        assert_eq!(kind, EventKind::ProductUpdate);
    }

    #[test]
    fn deletion_marker_beats_identity() {
        let kind = kind_of(json!({
            "products": {"id": "p1", "archived_at": "2026-01-01T00:00:00Z"}
        }));
        assert_eq!(kind, EventKind::ProductDelete);
    }

    #[test]
    fn null_deletion_marker_is_not_a_deletion() {
        let kind = kind_of(json!({
            "products": {"id": "p1", "archived_at": null}
        }));
        assert_eq!(kind, EventKind::ProductUpdate);
    }

    #[test]
    fn product_without_identity_is_a_create() {
        assert_eq!(
            kind_of(json!({"products": {"name": "X"}})),
            EventKind::ProductCreate
        );
    }

    #[test]
    fn store_object_rules() {
        assert_eq!(
            kind_of(json!({"store_id": {"archived_at": "2026-01-01T00:00:00Z"}})),
            EventKind::TenantDelete
        );
        assert_eq!(
            kind_of(json!({"store_id": {"id": "s1"}})),
            EventKind::TenantUpdate
        );
        assert_eq!(
            kind_of(json!({"store_id": {"name": "New Shop"}})),
            EventKind::TenantCreate
        );
    }

    #[test]
    fn product_rules_shadow_store_rules() {
        let kind = kind_of(json!({
            "products": {"id": "p1"},
            "store_id": {"archived_at": "2026-01-01T00:00:00Z"}
        }));
        assert_eq!(kind, EventKind::ProductUpdate);
    }

    #[test]
    fn shapeless_payload_is_unknown() {
        assert_eq!(kind_of(json!({"something": "else"})), EventKind::Unknown);
        // A bare store identifier is not a store object.
        assert_eq!(kind_of(json!({"store_id": "s1"})), EventKind::Unknown);
    }

    #[test]
    fn routing_targets() {
        assert_eq!(EventKind::ProductDelete.routing_target(), "product-service");
        assert_eq!(EventKind::TenantCreate.routing_target(), "store-service");
        assert_eq!(EventKind::Unknown.routing_target(), "default-handler");
    }

    #[test]
    fn wire_names() {
        assert_eq!(
            serde_json::to_value(EventKind::TenantDelete).unwrap(),
            json!("store_delete")
        );
        let parsed: EventKind = serde_json::from_value(json!("product_update")).unwrap();
        assert_eq!(parsed, EventKind::ProductUpdate);
    }
}
