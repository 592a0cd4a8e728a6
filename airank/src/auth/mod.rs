//! Authentication: ingestion credential verification and the
//! service-role guard for privileged endpoints.

pub mod verifier;

use crate::config::Config;
use crate::errors::{Error, Result};
use axum::http::{header, HeaderMap};

/// Require the configured service-role credential as a bearer token.
///
/// The browser/identity-provider half of the login flow lives outside
/// this service; its privileged writes (profile sync, device-code
/// approval) authenticate with this shared credential instead.
pub fn require_service_key(config: &Config, headers: &HeaderMap) -> Result<()> {
    let Some(expected) = config.auth.service_key.as_deref() else {
        return Err(Error::Unauthenticated {
            message: Some("service credential not configured".to_string()),
        });
    };

    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match presented {
        Some(token) if token == expected => Ok(()),
        _ => Err(Error::Unauthenticated { message: None }),
    }
}
