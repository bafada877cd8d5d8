//! Request authentication
//!
//! Resolves the interactive user behind a request from the `Authorization:
//! Bearer` header or the Supabase session cookie, and verifies the credential
//! against the credential store.

use crate::auth::credentials::CredentialStore;
use crate::constants::SESSION_COOKIE_NAME;
use crate::error::OAuthError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use std::sync::Arc;

/// User authenticated by a credential-store bearer credential
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
    /// The credential exactly as presented; captured into issued codes
    pub access_token: String,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<dyn CredentialStore>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = OAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(parts)
            .or_else(|| extract_session_cookie(parts))
            .ok_or_else(|| OAuthError::access_denied("Authentication required"))?;

        let credentials = Arc::<dyn CredentialStore>::from_ref(state);
        validate_token(credentials.as_ref(), &token).await
    }
}

/// Extract bearer token from the Authorization header
pub fn extract_bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Extract the Supabase session credential from the cookie header
pub fn extract_session_cookie(parts: &Parts) -> Option<String> {
    let prefix = format!("{}=", SESSION_COOKIE_NAME);
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(str::trim)
        .find_map(|c| c.strip_prefix(prefix.as_str()))
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Verify a credential and return the authenticated user
pub async fn validate_token(
    credentials: &dyn CredentialStore,
    token: &str,
) -> Result<AuthenticatedUser, OAuthError> {
    match credentials.verify(token).await? {
        Some(user) => Ok(AuthenticatedUser {
            user_id: user.id,
            email: user.email,
            access_token: token.to_string(),
        }),
        None => Err(OAuthError::access_denied("Invalid or expired session")),
    }
}
