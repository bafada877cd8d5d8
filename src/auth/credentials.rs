//! Credential store clients
//!
//! The credential store (Supabase Auth) mints user-bound bearer credentials at
//! interactive login. This service only verifies them: a credential is either
//! accepted for a user, rejected, or the store could not be asked.

use crate::config::CredentialsConfig;
use crate::constants::{SUPABASE_AUDIENCE, SUPABASE_USER_PATH};
use crate::error::NetworkError;
use crate::{AstralError, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Identity behind an accepted credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub id: String,
    pub email: Option<String>,
}

/// Verifies bearer credentials issued by the credential store
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// `Ok(Some)` when accepted, `Ok(None)` when rejected, `Err` when the
    /// store is unreachable or answered unexpectedly.
    async fn verify(&self, token: &str) -> Result<Option<VerifiedUser>>;
}

/// Create a credential store from configuration
pub fn create_credential_store(config: &CredentialsConfig) -> Result<Arc<dyn CredentialStore>> {
    match config.driver.as_str() {
        "supabase" => {
            let url = config
                .supabase_url
                .as_deref()
                .ok_or_else(|| AstralError::config("credentials.supabaseUrl is required"))?;
            let anon_key = config
                .supabase_anon_key
                .as_deref()
                .ok_or_else(|| AstralError::config("credentials.supabaseAnonKey is required"))?;
            Ok(Arc::new(SupabaseCredentialStore::new(
                url,
                anon_key,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "jwt" => {
            let secret = config
                .jwt_secret
                .as_deref()
                .ok_or_else(|| AstralError::config("credentials.jwtSecret is required"))?;
            Ok(Arc::new(JwtCredentialStore::new(secret)))
        }
        "memory" => {
            tracing::warn!("Using in-memory credential store; do not use in production");
            let store = MemoryCredentialStore::new();
            for (token, user_id) in &config.tokens {
                store.insert(token, user_id);
            }
            Ok(Arc::new(store))
        }
        other => Err(AstralError::config(format!(
            "Unknown credentials driver: {}. Supported: supabase, jwt, memory",
            other
        ))),
    }
}

// ============================================================================
// Supabase Auth
// ============================================================================

/// Asks Supabase Auth who owns a credential (`GET /auth/v1/user`)
pub struct SupabaseCredentialStore {
    client: reqwest::Client,
    user_url: String,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl SupabaseCredentialStore {
    pub fn new(base_url: &str, anon_key: &str, timeout: Duration) -> Result<Self> {
        let base = url::Url::parse(base_url)
            .map_err(|e| NetworkError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            user_url: format!("{}{}", base.as_str().trim_end_matches('/'), SUPABASE_USER_PATH),
            anon_key: anon_key.to_string(),
        })
    }
}

#[async_trait]
impl CredentialStore for SupabaseCredentialStore {
    async fn verify(&self, token: &str) -> Result<Option<VerifiedUser>> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!(status = %response.status(), "Credential rejected by Supabase");
                Ok(None)
            }
            status if status.is_success() => {
                let user: SupabaseUser = response.json().await?;
                Ok(Some(VerifiedUser {
                    id: user.id,
                    email: user.email,
                }))
            }
            status => Err(NetworkError::Http(format!(
                "Supabase user lookup returned {}",
                status
            ))
            .into()),
        }
    }
}

// ============================================================================
// Local JWT verification
// ============================================================================

/// Verifies Supabase session JWTs locally with the project's HS256 secret
pub struct JwtCredentialStore {
    key: DecodingKey,
    validation: Validation,
}

#[derive(Debug, Deserialize)]
struct SupabaseClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

impl JwtCredentialStore {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SUPABASE_AUDIENCE]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

#[async_trait]
impl CredentialStore for JwtCredentialStore {
    async fn verify(&self, token: &str) -> Result<Option<VerifiedUser>> {
        match jsonwebtoken::decode::<SupabaseClaims>(token, &self.key, &self.validation) {
            Ok(data) => Ok(Some(VerifiedUser {
                id: data.claims.sub,
                email: data.claims.email,
            })),
            Err(e) => {
                tracing::debug!("JWT rejected: {}", e);
                Ok(None)
            }
        }
    }
}

// ============================================================================
// In-memory (development and tests)
// ============================================================================

/// In-process credential -> user map
///
/// **WARNING:** for development and tests only. Credentials never expire and
/// are lost on restart.
#[derive(Default)]
pub struct MemoryCredentialStore {
    tokens: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as a credential of `user_id`
    pub fn insert(&self, token: &str, user_id: &str) {
        self.tokens
            .write()
            .insert(token.to_string(), user_id.to_string());
    }

    /// Stop accepting `token`
    pub fn revoke(&self, token: &str) {
        self.tokens.write().remove(token);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn verify(&self, token: &str) -> Result<Option<VerifiedUser>> {
        Ok(self.tokens.read().get(token).map(|id| VerifiedUser {
            id: id.clone(),
            email: None,
        }))
    }
}
