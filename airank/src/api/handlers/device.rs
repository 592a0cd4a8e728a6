//! Device-code login flow (server side).
//!
//! The CLI requests a code, the user approves it in the browser (an
//! external frontend holding the service-role credential), and the CLI
//! polls until the approved key appears.

use crate::api::models::device::{
    DeviceApproveRequest, DeviceApproveResponse, DeviceCodeGrant, DevicePollQuery, DevicePollResponse,
};
use crate::auth::{self, verifier};
use crate::crypto;
use crate::errors::{Error, Result};
use crate::AppState;
use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;

const DEVICE_CODE_TTL_SECS: i64 = 600;
const POLL_INTERVAL_SECS: u64 = 5;

fn expired_code() -> Error {
    Error::NotFound {
        resource: "Device code".into(),
    }
}

/// Issue a fresh device code.
#[utoipa::path(
    post,
    path = "/api/auth/device",
    tag = "auth",
    responses((status = 200, body = DeviceCodeGrant))
)]
pub async fn create_device_code(State(state): State<AppState>) -> Result<Json<DeviceCodeGrant>> {
    let code = crypto::generate_device_code();
    let expires_at = Utc::now() + chrono::Duration::seconds(DEVICE_CODE_TTL_SECS);

    state.durable.insert_device_code(&code, expires_at).await?;

    Ok(Json(DeviceCodeGrant {
        device_code: code,
        verification_uri: format!("{}/auth/device", state.config.dashboard_url.trim_end_matches('/')),
        expires_in: DEVICE_CODE_TTL_SECS as u64,
        interval: POLL_INTERVAL_SECS,
    }))
}

/// Poll a device code. Unknown and expired codes are indistinguishable.
#[utoipa::path(
    get,
    path = "/api/auth/device",
    tag = "auth",
    params(DevicePollQuery),
    responses(
        (status = 200, body = DevicePollResponse),
        (status = 404, description = "Unknown or expired code"),
    )
)]
pub async fn poll_device_code(State(state): State<AppState>, Query(query): Query<DevicePollQuery>) -> Result<Json<DevicePollResponse>> {
    let record = state.durable.device_code(&query.code).await?.ok_or_else(expired_code)?;

    if record.expires_at < Utc::now() {
        return Err(expired_code());
    }

    if record.verified {
        Ok(Json(DevicePollResponse::Complete {
            api_key: record.temp_api_key,
            twitter_handle: record.twitter_handle,
        }))
    } else {
        Ok(Json(DevicePollResponse::Pending))
    }
}

/// Approve a device code for a user, rotating their API key.
///
/// Called by the trusted frontend after the user authenticated there.
/// The fresh plaintext key is parked on the device-code row for the CLI
/// to collect; the profile keeps only the digest.
#[utoipa::path(
    put,
    path = "/api/auth/device",
    tag = "auth",
    request_body = DeviceApproveRequest,
    security(("service_key" = [])),
    responses(
        (status = 200, body = DeviceApproveResponse),
        (status = 401, description = "Missing or invalid service credential"),
        (status = 404, description = "Unknown user or code"),
    )
)]
pub async fn approve_device_code(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DeviceApproveRequest>,
) -> Result<Json<DeviceApproveResponse>> {
    auth::require_service_key(&state.config, &headers)?;

    let handle = verifier::normalize_handle(&request.twitter_handle);
    let profile = state
        .durable
        .profile_by_handle(&handle)
        .await?
        .ok_or_else(|| Error::NotFound { resource: "User".into() })?;

    let record = state.durable.device_code(&request.code).await?.ok_or_else(expired_code)?;
    if record.expires_at < Utc::now() {
        return Err(expired_code());
    }

    // Approval rotates the credential: the old key stops working.
    let api_key = crypto::generate_api_key();
    state.durable.rotate_api_key(profile.id, &crypto::api_key_digest(&api_key)).await?;
    state.durable.approve_device_code(&request.code, profile.id, &api_key).await?;

    Ok(Json(DeviceApproveResponse { success: true }))
}
