//! In-memory storage implementation
//!
//! Fast, non-persistent storage for development and testing.
//! Uses DashMap so the conditional writes the OAuth flow depends on run under
//! the entry's shard lock. Refresh-token uniqueness spans every shard, so
//! writes that set a refresh token also take `token_writes`.
//!
//! **WARNING:** MemoryStorage is NOT recommended for production use:
//! - Data is lost on process restart
//! - Does not coordinate state across multiple process instances
//!
//! For production deployments, use SqliteStorage or PostgresStorage.

use super::*;
use crate::error::StorageError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;

/// In-memory storage implementation
#[derive(Clone)]
pub struct MemoryStorage {
    codes: Arc<DashMap<String, AuthorizationCode>>,
    tokens: Arc<DashMap<String, OAuthTokenRecord>>, // access_token -> record
    users: Arc<DashMap<String, UserProfile>>,
    token_writes: Arc<Mutex<()>>,
}

impl MemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        Self {
            codes: Arc::new(DashMap::new()),
            tokens: Arc::new(DashMap::new()),
            users: Arc::new(DashMap::new()),
            token_writes: Arc::new(Mutex::new(())),
        }
    }

    fn access_for_refresh(&self, refresh_token: &str) -> Option<String> {
        self.tokens
            .iter()
            .find(|r| r.refresh_token == refresh_token)
            .map(|r| r.key().clone())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OAuthStorage for MemoryStorage {
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        match self.codes.entry(code.code.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(code.clone());
                Ok(())
            }
            Entry::Occupied(_) => Err(StorageError::UniqueViolation(
                "oauth_codes.code".to_string(),
            )
            .into()),
        }
    }

    async fn find_unused_authorization_code(
        &self,
        code: &str,
        client_id: &str,
    ) -> Result<Option<RedeemableCode>> {
        let Some(found) = self
            .codes
            .get(code)
            .filter(|c| c.client_id == client_id && !c.used)
            .map(|c| c.clone())
        else {
            return Ok(None);
        };

        let user = self.users.get(&found.user_id).map(|u| u.clone());
        Ok(Some(RedeemableCode { code: found, user }))
    }

    async fn get_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        Ok(self.codes.get(code).map(|c| c.clone()))
    }

    async fn delete_authorization_code(&self, code: &str) -> Result<()> {
        self.codes.remove(code);
        Ok(())
    }

    async fn mark_authorization_code_used(&self, code: &str) -> Result<bool> {
        match self.codes.get_mut(code) {
            Some(mut entry) if !entry.used => {
                entry.used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_oauth_token(&self, record: &OAuthTokenRecord) -> Result<TokenInsert> {
        // Scan and insert must not interleave with another token write
        let _guard = self.token_writes.lock();
        if self
            .tokens
            .iter()
            .any(|r| r.refresh_token == record.refresh_token && r.key() != &record.access_token)
        {
            return Err(StorageError::UniqueViolation("oauth_tokens.refresh_token".to_string()).into());
        }

        match self.tokens.entry(record.access_token.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(record.clone());
                Ok(TokenInsert::Inserted)
            }
            Entry::Occupied(_) => Ok(TokenInsert::AccessTokenExists),
        }
    }

    async fn update_oauth_token_by_access(&self, record: &OAuthTokenRecord) -> Result<bool> {
        let _guard = self.token_writes.lock();
        match self.tokens.get_mut(&record.access_token) {
            Some(mut existing) if existing.client_id == record.client_id => {
                existing.refresh_token = record.refresh_token.clone();
                existing.scope = record.scope.clone();
                existing.expires_at = record.expires_at;
                existing.refresh_expires_at = record.refresh_expires_at;
                existing.updated_at = record.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_oauth_token_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<OAuthTokenRecord>> {
        Ok(self.tokens.get(access_token).map(|r| r.clone()))
    }

    async fn find_oauth_token_by_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<Option<OAuthTokenRecord>> {
        Ok(self
            .tokens
            .iter()
            .find(|r| r.refresh_token == refresh_token && r.client_id == client_id)
            .map(|r| r.value().clone()))
    }

    async fn rotate_refresh_token(
        &self,
        old_refresh: &str,
        client_id: &str,
        new_refresh: &str,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let _guard = self.token_writes.lock();
        let Some(access) = self.access_for_refresh(old_refresh) else {
            return Ok(false);
        };

        // Re-check under the entry lock; a concurrent rotation may have won.
        match self.tokens.get_mut(&access) {
            Some(mut record)
                if record.refresh_token == old_refresh && record.client_id == client_id =>
            {
                record.refresh_token = new_refresh.to_string();
                record.expires_at = expires_at;
                record.refresh_expires_at = refresh_expires_at;
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_oauth_token_by_refresh(&self, refresh_token: &str) -> Result<()> {
        self.tokens.retain(|_, r| r.refresh_token != refresh_token);
        Ok(())
    }

    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        self.users.insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn get_user_profile(&self, id: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let codes_before = self.codes.len();
        self.codes.retain(|_, c| !c.is_expired_at(now));
        let tokens_before = self.tokens.len();
        self.tokens.retain(|_, r| !r.is_refresh_expired_at(now));

        Ok(PurgeReport {
            codes: (codes_before - self.codes.len()) as u64,
            tokens: (tokens_before - self.tokens.len()) as u64,
        })
    }
}
