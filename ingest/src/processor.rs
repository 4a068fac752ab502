use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::api::{IngestError, IngestResponse};
use crate::audit::AuditWriter;
use crate::catalog::{Catalog, ProjectionMetadata};
use crate::classify::{classify, EventKind};
use crate::fingerprint::{derive_event_id, payload_fingerprint};
use crate::notify::{ChangeNotification, Notifier};
use crate::payload::{CanonicalEvent, EventIdentity};
use crate::redact::redact;
use crate::registry::{Registry, RegistryEntry, STATUS_PROCESSED};
use crate::time::{rfc3339, TimeSource};
use crate::validate::EntityValidator;

/// The event-processing pipeline. One call per inbound payload, all
/// steps sequential:
///
/// normalize → provision → classify → fingerprint → registry lookup
/// (short-circuit on duplicate) → audit write → redact → validate →
/// catalog → notify → register.
///
/// The registry write at the very end is the durable commit point. The
/// dedup lookup and that write are deliberately not atomic: two
/// concurrent deliveries of the same payload may both run to completion,
/// leaving idempotent content and two registry rows. Suppression is
/// eventual, side effects are at-least-once.
pub struct Processor {
    registry: Arc<dyn Registry>,
    audit: AuditWriter,
    catalog: Catalog,
    validator: EntityValidator,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn TimeSource>,
    retention: Duration,
    event_version: String,
}

impl Processor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn Registry>,
        audit: AuditWriter,
        catalog: Catalog,
        validator: EntityValidator,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn TimeSource>,
        retention: Duration,
        event_version: String,
    ) -> Processor {
        Processor {
            registry,
            audit,
            catalog,
            validator,
            notifier,
            clock,
            retention,
            event_version,
        }
    }

    #[instrument(skip(self, event), fields(event_kind, event_id))]
    pub async fn process(&self, event: CanonicalEvent) -> Result<IngestResponse, IngestError> {
        counter!("webhook_events_received_total").increment(1);

        let identity = EventIdentity::provision(&event);
        let kind = classify(&event);
        tracing::Span::current().record("event_kind", kind.as_str());

        // The fingerprint covers the payload exactly as delivered, so a
        // redelivery maps to the same key even though provisioning would
        // generate fresh identifiers for it.
        let fingerprint = payload_fingerprint(event.raw());

        match self.registry.most_recent(&fingerprint).await {
            Ok(Some(prior)) => {
                info!(
                    "payload {} already processed as {}, short-circuiting",
                    fingerprint, prior.event_id
                );
                counter!("webhook_events_duplicate_total").increment(1);
                return Ok(IngestResponse::Duplicate {
                    event_id: prior.event_id,
                    event_type: prior.event_type,
                    original_processing_timestamp: prior.processing_timestamp,
                });
            }
            Ok(None) => {}
            // A lookup failure must not cost us the audit record, so the
            // payload is treated as new and processed in full.
            Err(err) => {
                error!("registry lookup failed, processing as new: {}", err);
                counter!("webhook_registry_lookup_failures_total").increment(1);
            }
        }

        let now = self.clock.now();
        let event_id = derive_event_id(&fingerprint, now.unix_timestamp());
        tracing::Span::current().record("event_id", event_id.as_str());

        let raw_key = self
            .audit
            .write_raw(event.raw(), &identity.tenant_id, kind, now, &event_id)
            .await?;
        let metadata_key = match kind {
            EventKind::TenantCreate => Some(
                self.audit
                    .write_tenant_metadata(
                        &raw_key,
                        event.tenant_domain(),
                        &identity.tenant_id,
                        identity.product_id.as_deref(),
                    )
                    .await?,
            ),
            _ => None,
        };

        let processed = redact(event.raw());

        self.validator
            .check_tenant(&identity.tenant_id, identity.tenant_provisioned)
            .await;
        if kind.is_product() {
            if let Some(product_id) = identity.product_id.as_deref() {
                self.validator
                    .check_product(product_id, identity.product_provisioned)
                    .await;
            }
        }

        let timestamp = rfc3339(now);
        let mutated = self
            .apply_to_catalog(kind, &identity, &processed, &fingerprint, &timestamp)
            .await?;
        if mutated {
            self.notifier
                .publish(&ChangeNotification {
                    store_id: identity.tenant_id.clone(),
                    timestamp: timestamp.clone(),
                    trigger: kind.as_str().to_string(),
                })
                .await?;
        }

        let routing_target = kind.routing_target();
        let entry = RegistryEntry {
            payload_hash: fingerprint.clone(),
            processing_timestamp: timestamp,
            event_id: event_id.clone(),
            event_type: kind,
            store_id: identity.tenant_id.clone(),
            s3_key: raw_key.clone(),
            status: STATUS_PROCESSED.to_string(),
            routing_target: routing_target.to_string(),
            ttl: (now + self.retention).unix_timestamp(),
        };
        self.registry.register(&entry).await.map_err(|err| {
            error!("failed to register event {}: {}", event_id, err);
            IngestError::RegistryWriteFailed
        })?;

        counter!("webhook_events_processed_total", &[("kind", kind.as_str())]).increment(1);
        Ok(IngestResponse::Success {
            event_id,
            event_type: kind,
            store_id: identity.tenant_id,
            product_id: identity.product_id,
            raw_s3_key: raw_key,
            metadata_s3_key: metadata_key,
            payload_hash: fingerprint,
            routing_target: routing_target.to_string(),
        })
    }

    /// Returns whether a tenant catalog entry was touched, which is what
    /// drives the change notification. Store-kind and unknown events
    /// never reach the catalog.
    async fn apply_to_catalog(
        &self,
        kind: EventKind,
        identity: &EventIdentity,
        processed: &Value,
        fingerprint: &str,
        timestamp: &str,
    ) -> Result<bool, IngestError> {
        if !kind.is_product() {
            return Ok(false);
        }
        let Some(product_id) = identity.product_id.as_deref() else {
            // A product hint without a product object; nothing to project.
            warn!("product event without a product payload, catalog untouched");
            return Ok(false);
        };

        match kind {
            EventKind::ProductCreate | EventKind::ProductUpdate => {
                let definition = processed
                    .get("products")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default()));
                self.catalog.upsert_master(product_id, &definition).await?;

                let stamp = ProjectionMetadata {
                    processing_timestamp: timestamp.to_string(),
                    payload_hash: fingerprint.to_string(),
                    event_version: self.event_version.clone(),
                    event_type: kind,
                };
                self.catalog
                    .project_to_tenant(&identity.tenant_id, product_id, &definition, &stamp)
                    .await?;
            }
            EventKind::ProductDelete => {
                self.catalog
                    .remove_from_tenant(&identity.tenant_id, product_id)
                    .await?;
            }
            _ => unreachable!("guarded by is_product"),
        }
        Ok(true)
    }
}
