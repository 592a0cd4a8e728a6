//! Ingestion credential verification.

use crate::crypto;
use crate::db::{DurableStore, ProfileRecord};
use crate::errors::{Error, Result};
use tracing::{info, instrument};

/// Normalize a reported handle: strip a leading `@`, trim whitespace,
/// lowercase. Handles compare case-insensitively everywhere.
pub fn normalize_handle(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_ascii_lowercase()
}

/// Verify a claimed handle and presented API key against the stored digest.
///
/// Pure read-and-compare: no state changes on any outcome. Unknown
/// handle, absent stored digest, and digest mismatch all collapse into
/// the same generic [`Error::InvalidCredentials`] so a caller cannot
/// probe which check failed. A missing handle or key is a caller bug and
/// reports as [`Error::MissingAttributes`] instead.
#[instrument(skip_all, fields(handle = %raw_handle))]
pub async fn verify(store: &dyn DurableStore, raw_handle: &str, api_key: &str) -> Result<ProfileRecord> {
    let handle = normalize_handle(raw_handle);
    if handle.is_empty() || api_key.is_empty() {
        return Err(Error::MissingAttributes);
    }

    let digest = crypto::api_key_digest(api_key);

    match store.profile_by_handle(&handle).await? {
        Some(profile) if profile.api_key_hash.as_deref() == Some(digest.as_str()) => Ok(profile),
        _ => {
            info!("rejected ingestion credentials");
            Err(Error::InvalidCredentials)
        }
    }
}
