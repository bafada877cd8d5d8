//! Opaque token generation
//!
//! Refresh tokens and authorization codes are random bytes from the OS CSPRNG,
//! base64url encoded without padding and tagged with a fixed prefix.

use crate::constants::{AUTH_CODE_BYTES, AUTH_CODE_PREFIX, REFRESH_TOKEN_BYTES, REFRESH_TOKEN_PREFIX};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

fn random_token(prefix: &str, len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    format!("{}{}", prefix, URL_SAFE_NO_PAD.encode(bytes))
}

/// Generate a refresh token (`rt_` + 48 random bytes)
pub fn generate_refresh_token() -> String {
    random_token(REFRESH_TOKEN_PREFIX, REFRESH_TOKEN_BYTES)
}

/// Generate an authorization code (`ac_` + 32 random bytes)
pub fn generate_auth_code() -> String {
    random_token(AUTH_CODE_PREFIX, AUTH_CODE_BYTES)
}

/// Structural check of an access credential before it is sent upstream.
///
/// Accepts three non-empty base64url segments separated by dots (JWT shape).
pub fn is_well_formed_credential(token: &str) -> bool {
    let segments: Vec<&str> = token.split('.').collect();
    segments.len() == 3
        && segments.iter().all(|s| {
            !s.is_empty()
                && s.bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        })
}
