use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use metrics::histogram;
use tracing::{error, instrument};

use crate::api::{IngestError, IngestResponse};
use crate::payload::CanonicalEvent;
use crate::router;

/// The invocation seam: the trigger layer POSTs the webhook payload as
/// the request body. No envelope, no authentication; transport concerns
/// live upstream of this service.
#[instrument(skip(state, body))]
pub async fn event(
    state: State<router::State>,
    body: Bytes,
) -> Result<Json<IngestResponse>, IngestError> {
    histogram!("webhook_payload_size_bytes").record(body.len() as f64);

    let event = CanonicalEvent::from_bytes(&body)?;
    match state.processor.process(event).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            error!("event processing failed: {}", err);
            Err(err)
        }
    }
}
