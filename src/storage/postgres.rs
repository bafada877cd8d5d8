//! PostgreSQL storage backend
//!
//! Production implementation of `OAuthStorage`. The `oauth_tokens` table carries
//! named unique constraints so a repeated redemption can be told apart from a
//! refresh-token collision.

use super::{OAuthStorage, sql_common::*};
use crate::{AstralError, Result, model::*};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

const TOKEN_COLUMNS: &str = "access_token, refresh_token, user_id, client_id, scope, \
     expires_at, refresh_expires_at, created_at, updated_at";

const CODE_COLUMNS: &str = "code, client_id, user_id, redirect_uri, scope, state, \
     supabase_jwt_token, used, expires_at, created_at";

/// PostgreSQL storage implementation
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Create a new PostgreSQL storage from a connection string
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await.map_err(|e| {
            AstralError::storage(format!("Failed to connect to PostgreSQL: {}", e))
        })?;

        sqlx::migrate!("./migrations/postgres")
            .run(&pool)
            .await
            .map_err(|e| AstralError::storage(format!("Failed to run migrations: {}", e)))?;

        Ok(Self { pool })
    }

    fn parse_code(row: &PgRow) -> Result<AuthorizationCode> {
        Ok(AuthorizationCode {
            code: row.try_get("code")?,
            client_id: row.try_get("client_id")?,
            user_id: row.try_get("user_id")?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            state: row.try_get("state")?,
            access_credential: row.try_get("supabase_jwt_token")?,
            used: row.try_get("used")?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn parse_token(row: &PgRow) -> Result<OAuthTokenRecord> {
        Ok(OAuthTokenRecord {
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            user_id: row.try_get("user_id")?,
            client_id: row.try_get("client_id")?,
            scope: row.try_get("scope")?,
            expires_at: row.try_get("expires_at")?,
            refresh_expires_at: row.try_get("refresh_expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl OAuthStorage for PostgresStorage {
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            "INSERT INTO oauth_codes
             (code, client_id, user_id, redirect_uri, scope, state, supabase_jwt_token,
              used, expires_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.state)
        .bind(&code.access_credential)
        .bind(code.used)
        .bind(code.expires_at)
        .bind(code.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_unused_authorization_code(
        &self,
        code: &str,
        client_id: &str,
    ) -> Result<Option<RedeemableCode>> {
        let row = sqlx::query(
            "SELECT c.code, c.client_id, c.user_id, c.redirect_uri, c.scope, c.state,
                    c.supabase_jwt_token, c.used, c.expires_at, c.created_at,
                    u.id AS profile_id, u.username, u.email, u.avatar_url
             FROM oauth_codes c
             LEFT JOIN users u ON u.id = c.user_id
             WHERE c.code = $1 AND c.client_id = $2 AND c.used = FALSE",
        )
        .bind(code)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let user = match row.try_get::<Option<String>, _>("profile_id")? {
            Some(id) => Some(UserProfile {
                id,
                username: row.try_get("username")?,
                email: row.try_get("email")?,
                avatar_url: row.try_get("avatar_url")?,
            }),
            None => None,
        };

        Ok(Some(RedeemableCode {
            code: Self::parse_code(&row)?,
            user,
        }))
    }

    async fn get_authorization_code(&self, code: &str) -> Result<Option<AuthorizationCode>> {
        let row = sqlx::query(&format!(
            "SELECT {CODE_COLUMNS} FROM oauth_codes WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_code).transpose()
    }

    async fn delete_authorization_code(&self, code: &str) -> Result<()> {
        sqlx::query("DELETE FROM oauth_codes WHERE code = $1")
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_authorization_code_used(&self, code: &str) -> Result<bool> {
        let result =
            sqlx::query("UPDATE oauth_codes SET used = TRUE WHERE code = $1 AND used = FALSE")
                .bind(code)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_oauth_token(&self, record: &OAuthTokenRecord) -> Result<TokenInsert> {
        let result = sqlx::query(&format!(
            "INSERT INTO oauth_tokens ({TOKEN_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(&record.user_id)
        .bind(&record.client_id)
        .bind(&record.scope)
        .bind(record.expires_at)
        .bind(record.refresh_expires_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await;

        classify_token_insert(result)
    }

    async fn update_oauth_token_by_access(&self, record: &OAuthTokenRecord) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE oauth_tokens
             SET refresh_token = $1, scope = $2, expires_at = $3, refresh_expires_at = $4,
                 updated_at = $5
             WHERE access_token = $6 AND client_id = $7",
        )
        .bind(&record.refresh_token)
        .bind(&record.scope)
        .bind(record.expires_at)
        .bind(record.refresh_expires_at)
        .bind(record.updated_at)
        .bind(&record.access_token)
        .bind(&record.client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_oauth_token_by_access(
        &self,
        access_token: &str,
    ) -> Result<Option<OAuthTokenRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM oauth_tokens WHERE access_token = $1"
        ))
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_token).transpose()
    }

    async fn find_oauth_token_by_refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<Option<OAuthTokenRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {TOKEN_COLUMNS} FROM oauth_tokens
             WHERE refresh_token = $1 AND client_id = $2"
        ))
        .bind(refresh_token)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_token).transpose()
    }

    async fn rotate_refresh_token(
        &self,
        old_refresh: &str,
        client_id: &str,
        new_refresh: &str,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE oauth_tokens
             SET refresh_token = $1, expires_at = $2, refresh_expires_at = $3, updated_at = NOW()
             WHERE refresh_token = $4 AND client_id = $5",
        )
        .bind(new_refresh)
        .bind(expires_at)
        .bind(refresh_expires_at)
        .bind(old_refresh)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_oauth_token_by_refresh(&self, refresh_token: &str) -> Result<()> {
        sqlx::query("DELETE FROM oauth_tokens WHERE refresh_token = $1")
            .bind(refresh_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, avatar_url)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT(id) DO UPDATE SET
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                avatar_url = EXCLUDED.avatar_url",
        )
        .bind(&profile.id)
        .bind(&profile.username)
        .bind(&profile.email)
        .bind(&profile.avatar_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_user_profile(&self, id: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, username, email, avatar_url FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(UserProfile {
                id: row.try_get("id")?,
                username: row.try_get("username")?,
                email: row.try_get("email")?,
                avatar_url: row.try_get("avatar_url")?,
            })),
            None => Ok(None),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let codes = sqlx::query("DELETE FROM oauth_codes WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let tokens = sqlx::query("DELETE FROM oauth_tokens WHERE refresh_expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(PurgeReport { codes, tokens })
    }
}
