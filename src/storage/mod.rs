//! Storage backends for Astral
//!
//! Provides multiple storage backends behind a unified trait. Every mutation the
//! OAuth flow relies on is a single-row conditional write so that concurrent
//! handlers coordinate through the store alone.

pub mod memory;
pub mod postgres;
pub mod sql_common;
pub mod sqlite;

use crate::{Result, model::*};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Storage for authorization codes, token records, and user profiles
#[async_trait]
pub trait OAuthStorage: Send + Sync {
    // Authorization code methods
    /// Insert a freshly issued authorization code
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<()>;

    /// Find a code matching `{code, client_id, used = false}`, joined with the
    /// owner's profile
    async fn find_unused_authorization_code(
        &self,
        code: &str,
        client_id: &str,
    ) -> Result<Option<RedeemableCode>>;

    /// Get a code regardless of its state
    async fn get_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>>;

    /// Delete a code
    async fn delete_authorization_code(&self, code: &str) -> Result<()>;

    /// Compare-and-set `used` from false to true.
    /// Returns false when no unused row matched.
    async fn mark_authorization_code_used(&self, code: &str) -> Result<bool>;

    // Token record methods
    /// Insert a token record.
    /// A conflict on the access credential is reported as
    /// `TokenInsert::AccessTokenExists`; any other uniqueness conflict is an error.
    async fn insert_oauth_token(&self, record: &OAuthTokenRecord) -> Result<TokenInsert>;

    /// Overwrite refresh token, scope, and expiries of the record holding
    /// `record.access_token` for `record.client_id`. Returns false when no
    /// such record exists or it belongs to another client.
    async fn update_oauth_token_by_access(&self, record: &OAuthTokenRecord) -> Result<bool>;

    /// Get a token record by access credential
    async fn get_oauth_token_by_access(&self, access_token: &str)
    -> Result<Option<OAuthTokenRecord>>;

    /// Find a token record by `{refresh_token, client_id}`
    async fn find_oauth_token_by_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<Option<OAuthTokenRecord>>;

    /// Rotate the refresh token only if the record still holds `old_refresh`.
    /// Returns false when another request rotated or deleted it first.
    async fn rotate_refresh_token(
        &self,
        old_refresh: &str,
        client_id: &str,
        new_refresh: &str,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete a token record by refresh token
    async fn delete_oauth_token_by_refresh(&self, refresh_token: &str) -> Result<()>;

    // User profile methods
    /// Save a user profile
    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Get a user profile by ID
    async fn get_user_profile(&self, id: &str) -> Result<Option<UserProfile>>;

    // Maintenance
    /// Delete codes expired before `now` and records whose refresh token expired
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport>;
}

pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;

/// Create a storage backend from configuration
pub async fn create_storage_from_config(
    config: &crate::config::StorageConfig,
) -> crate::Result<Arc<dyn OAuthStorage>> {
    match config.driver.as_str() {
        "memory" => Ok(Arc::new(MemoryStorage::new())),
        "sqlite" => Ok(Arc::new(SqliteStorage::new(&config.dsn).await?)),
        "postgres" => Ok(Arc::new(PostgresStorage::new(&config.dsn).await?)),
        _ => Err(crate::AstralError::config(format!(
            "Unknown storage driver: {}. Supported: memory, sqlite, postgres",
            config.driver
        ))),
    }
}

#[cfg(test)]
mod storage_test;
