//! The ingestion endpoint: OTLP metrics in, counters out.

use crate::api::models::ingest::IngestResponse;
use crate::auth::verifier;
use crate::errors::{Error, Result};
use crate::ingest::{self, MetricsEnvelope};
use crate::AppState;
use axum::{extract::State, Json};

/// Ingest one OTLP metrics envelope.
///
/// The envelope authenticates itself through resource attributes; the
/// request either fully counts or is rejected before any state change
/// (volatile-layer degradation excepted, which the reporter never sees).
#[utoipa::path(
    post,
    path = "/api/v1/metrics",
    tag = "ingestion",
    request_body = MetricsEnvelope,
    responses(
        (status = 200, description = "Event applied, or acknowledged as a no-op", body = IngestResponse),
        (status = 401, description = "Missing resource attributes"),
        (status = 403, description = "Invalid credentials"),
        (status = 500, description = "Durable store failure; safe to retry, may double count"),
    )
)]
pub async fn ingest_metrics(State(state): State<AppState>, Json(envelope): Json<MetricsEnvelope>) -> Result<Json<IngestResponse>> {
    // Nothing to process; acknowledge without touching credentials.
    if envelope.resource_metrics.is_empty() {
        return Ok(Json(IngestResponse::noop()));
    }

    let handle = envelope.resource_attribute(ingest::HANDLE_ATTRIBUTE).unwrap_or_default();
    let api_key = envelope.resource_attribute(ingest::API_KEY_ATTRIBUTE).unwrap_or_default();
    if handle.is_empty() || api_key.is_empty() {
        return Err(Error::MissingAttributes);
    }

    let principal = verifier::verify(state.durable.as_ref(), handle, api_key).await?;

    let event = ingest::extract(&envelope);
    if event.is_empty() {
        return Ok(Json(IngestResponse::noop()));
    }

    let outcome = state.engine.apply(&principal, &event).await?;
    Ok(Json(IngestResponse::applied(outcome.tokens)))
}
