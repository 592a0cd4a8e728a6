//! API key and device code generation, plus the key digest used for
//! credential verification.

use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};

/// Prefix for every API key issued by this service.
pub const API_KEY_PREFIX: &str = "sk_airank_";

/// Generates a new API key: the `sk_airank_` prefix followed by 128 bits
/// of cryptographically secure randomness, hex encoded.
pub fn generate_api_key() -> String {
    let mut key_bytes = [0u8; 16];
    thread_rng().fill(&mut key_bytes);

    format!("{}{}", API_KEY_PREFIX, hex::encode(key_bytes))
}

/// Generates a short uppercase device code for the login flow (6 hex chars).
pub fn generate_device_code() -> String {
    let mut code_bytes = [0u8; 3];
    thread_rng().fill(&mut code_bytes);

    hex::encode_upper(code_bytes)
}

/// Deterministic SHA-256 digest of an API key, hex encoded.
///
/// Verification recomputes this digest and compares it against the stored
/// value, so the digest is intentionally unsalted: the same key always
/// produces the same digest.
pub fn api_key_digest(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}
