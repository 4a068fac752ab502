use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classify::EventKind;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestResponse {
    Success {
        event_id: String,
        event_type: EventKind,
        store_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        product_id: Option<String>,
        raw_s3_key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata_s3_key: Option<String>,
        payload_hash: String,
        routing_target: String,
    },
    /// Short-circuit response for a payload fingerprint that is already
    /// registered. Carries the identifiers of the first processing run.
    Duplicate {
        event_id: String,
        event_type: EventKind,
        original_processing_timestamp: String,
    },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),

    #[error("failed to serialize payload: {0}")]
    PayloadSerialization(#[from] serde_json::Error),

    #[error("failed to write audit record")]
    AuditWriteFailed,

    #[error("failed to write catalog entry")]
    CatalogWriteFailed,

    #[error("failed to register processed event")]
    RegistryWriteFailed,

    #[error("failed to publish change notification")]
    NotificationFailed,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::RequestDecodingError(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            IngestError::PayloadSerialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }

            // Store failures are retryable by the delivering side.
            IngestError::AuditWriteFailed
            | IngestError::CatalogWriteFailed
            | IngestError::RegistryWriteFailed
            | IngestError::NotificationFailed => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
        }
        .into_response()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::api::IngestResponse;
    use crate::classify::EventKind;

    #[test]
    fn response_serialization() {
        let success = IngestResponse::Success {
            event_id: "abcd1234abcd1234-1700000000".to_string(),
            event_type: EventKind::ProductCreate,
            store_id: "store-1".to_string(),
            product_id: Some("prod-1".to_string()),
            raw_s3_key: "store-1/product_create/2026/08/24/abcd1234abcd1234-1700000000.json"
                .to_string(),
            metadata_s3_key: None,
            payload_hash: "ff".repeat(32),
            routing_target: "product-service".to_string(),
        };
        let value = serde_json::to_value(&success).unwrap();
        assert_eq!(value["status"], json!("success"));
        assert_eq!(value["event_type"], json!("product_create"));
        assert!(value.get("metadata_s3_key").is_none());

        let duplicate = IngestResponse::Duplicate {
            event_id: "abcd1234abcd1234-1700000000".to_string(),
            event_type: EventKind::TenantUpdate,
            original_processing_timestamp: "2026-08-24T12:00:00Z".to_string(),
        };
        let value = serde_json::to_value(&duplicate).unwrap();
        assert_eq!(value["status"], json!("duplicate"));
        assert_eq!(value["event_type"], json!("store_update"));
        assert_eq!(
            value["original_processing_timestamp"],
            json!("2026-08-24T12:00:00Z")
        );
    }
}
