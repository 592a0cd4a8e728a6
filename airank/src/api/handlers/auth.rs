//! Key verification and profile sync endpoints.

use crate::api::models::auth::{SyncRequest, SyncResponse, VerifyRequest, VerifyResponse};
use crate::auth::{self, verifier};
use crate::crypto;
use crate::db::NewProfile;
use crate::errors::{Error, Result};
use crate::AppState;
use axum::{extract::State, http::HeaderMap, Json};

/// Map a raw API key back to its handle (CLI status check).
#[utoipa::path(
    post,
    path = "/api/auth/verify",
    tag = "auth",
    request_body = VerifyRequest,
    responses(
        (status = 200, body = VerifyResponse),
        (status = 401, description = "Unknown API key"),
    )
)]
pub async fn verify_api_key(State(state): State<AppState>, Json(request): Json<VerifyRequest>) -> Result<Json<VerifyResponse>> {
    if request.api_key.is_empty() {
        return Err(Error::BadRequest {
            message: "API key required".into(),
        });
    }

    let digest = crypto::api_key_digest(&request.api_key);
    match state.durable.profile_by_key_digest(&digest).await? {
        Some(profile) => Ok(Json(VerifyResponse {
            success: true,
            twitter_handle: profile.twitter_handle,
        })),
        None => Err(Error::Unauthenticated {
            message: Some("Invalid API key".into()),
        }),
    }
}

/// Create or refresh a profile after an external identity login.
///
/// Called by the trusted web frontend with the service-role credential
/// once it has authenticated the user. On first sync the profile is
/// created and the plaintext API key is returned exactly once; only its
/// digest is kept.
#[utoipa::path(
    post,
    path = "/api/auth/sync",
    tag = "auth",
    request_body = SyncRequest,
    security(("service_key" = [])),
    responses(
        (status = 200, body = SyncResponse),
        (status = 401, description = "Missing or invalid service credential"),
    )
)]
pub async fn sync_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>> {
    auth::require_service_key(&state.config, &headers)?;

    let handle = verifier::normalize_handle(&request.twitter_handle);
    if handle.is_empty() {
        return Err(Error::BadRequest {
            message: "twitter_handle required".into(),
        });
    }

    if let Some(existing) = state.durable.profile_by_handle(&handle).await? {
        state.durable.touch_profile(existing.id, request.avatar_url.as_deref()).await?;
        return Ok(Json(SyncResponse {
            success: true,
            api_key: None,
        }));
    }

    let api_key = crypto::generate_api_key();
    state
        .durable
        .create_profile(&NewProfile {
            twitter_handle: handle,
            avatar_url: request.avatar_url,
            api_key_digest: crypto::api_key_digest(&api_key),
        })
        .await?;

    Ok(Json(SyncResponse {
        success: true,
        api_key: Some(api_key),
    }))
}
