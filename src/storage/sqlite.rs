//! SQLite storage implementation
//!
//! Provides persistent storage for authorization codes, token records, and
//! user profiles using SQLite. Timestamps are stored as unix seconds.

use crate::model::*;
use crate::storage::{OAuthStorage, sql_common::*};
use crate::{AstralError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

const TOKEN_COLUMNS: &str = "access_token, refresh_token, user_id, client_id, scope, \
     expires_at, refresh_expires_at, created_at, updated_at";

const CODE_COLUMNS: &str = "code, client_id, user_id, redirect_uri, scope, state, \
     supabase_jwt_token, used, expires_at, created_at";

/// SQLite storage backend
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage
    ///
    /// # Arguments
    /// * `dsn` - Database path (e.g., ".astral/astral.db" or ":memory:" for in-memory)
    pub async fn new(dsn: &str) -> Result<Self> {
        // Prepend sqlite: prefix if not present and add create-if-missing option
        let connection_string = if dsn.starts_with("sqlite:") {
            if dsn.contains('?') {
                dsn.to_string()
            } else {
                format!("{}?mode=rwc", dsn)
            }
        } else {
            format!("sqlite:{}?mode=rwc", dsn)
        };

        let file_path = dsn.strip_prefix("sqlite:").unwrap_or(dsn);

        if file_path.contains("..") {
            return Err(AstralError::config(
                "Database path cannot contain '..' (path traversal not allowed)",
            ));
        }

        if file_path != ":memory:"
            && let Some(parent) = Path::new(file_path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Pragmas go on the connect options so every pooled connection gets them.
        let options = SqliteConnectOptions::from_str(&connection_string)
            .map_err(|e| AstralError::config(format!("Invalid SQLite DSN: {}", e)))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        // Each connection to :memory: is its own database
        let max_connections = if file_path == ":memory:" { 1 } else { 10 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| AstralError::storage(format!("Failed to connect to SQLite: {}", e)))?;

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .map_err(|e| AstralError::storage(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!(dsn = %file_path, "SQLite storage ready");
        Ok(Self { pool })
    }

    fn parse_code(row: &SqliteRow) -> Result<AuthorizationCode> {
        Ok(AuthorizationCode {
            code: row.try_get("code")?,
            client_id: row.try_get("client_id")?,
            user_id: row.try_get("user_id")?,
            redirect_uri: row.try_get("redirect_uri")?,
            scope: row.try_get("scope")?,
            state: row.try_get("state")?,
            access_credential: row.try_get("supabase_jwt_token")?,
            used: row.try_get::<i64, _>("used")? != 0,
            expires_at: datetime_from_unix(row.try_get("expires_at")?),
            created_at: datetime_from_unix(row.try_get("created_at")?),
        })
    }

    fn parse_token(row: &SqliteRow) -> Result<OAuthTokenRecord> {
        Ok(OAuthTokenRecord {
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            user_id: row.try_get("user_id")?,
            client_id: row.try_get("client_id")?,
            scope: row.try_get("scope")?,
            expires_at: datetime_from_unix(row.try_get("expires_at")?),
            refresh_expires_at: datetime_from_unix(row.try_get("refresh_expires_at")?),
            created_at: datetime_from_unix(row.try_get("created_at")?),
            updated_at: datetime_from_unix(row.try_get("updated_at")?),
        })
    }

    fn parse_user(row: &SqliteRow) -> Result<UserProfile> {
        Ok(UserProfile {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            avatar_url: row.try_get("avatar_url")?,
        })
    }
}

#[async_trait]
impl OAuthStorage for SqliteStorage {
    async fn insert_authorization_code(&self, code: &AuthorizationCode) -> Result<()> {
        sqlx::query(
            "INSERT INTO oauth_codes
             (code, client_id, user_id, redirect_uri, scope, state, supabase_jwt_token,
              used, expires_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&code.code)
        .bind(&code.client_id)
        .bind(&code.user_id)
        .bind(&code.redirect_uri)
        .bind(&code.scope)
        .bind(&code.state)
        .bind(&code.access_credential)
        .bind(code.used as i64)
        .bind(datetime_to_unix(code.expires_at))
        .bind(datetime_to_unix(code.created_at))
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
             WHERE c.code = ? AND c.client_id = ? AND c.used = 0",
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
            "SELECT {CODE_COLUMNS} FROM oauth_codes WHERE code = ?"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_code).transpose()
    }

    async fn delete_authorization_code(&self, code: &str) -> Result<()> {
        sqlx::query("DELETE FROM oauth_codes WHERE code = ?")
            .bind(code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_authorization_code_used(&self, code: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE oauth_codes SET used = 1 WHERE code = ? AND used = 0")
            .bind(code)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_oauth_token(&self, record: &OAuthTokenRecord) -> Result<TokenInsert> {
        let result = sqlx::query(&format!(
            "INSERT INTO oauth_tokens ({TOKEN_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(&record.user_id)
        .bind(&record.client_id)
        .bind(&record.scope)
        .bind(datetime_to_unix(record.expires_at))
        .bind(datetime_to_unix(record.refresh_expires_at))
        .bind(datetime_to_unix(record.created_at))
        .bind(datetime_to_unix(record.updated_at))
        .execute(&self.pool)
        .await;

        classify_token_insert(result)
    }

    async fn update_oauth_token_by_access(&self, record: &OAuthTokenRecord) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE oauth_tokens
             SET refresh_token = ?, scope = ?, expires_at = ?, refresh_expires_at = ?,
                 updated_at = ?
             WHERE access_token = ? AND client_id = ?",
        )
        .bind(&record.refresh_token)
        .bind(&record.scope)
        .bind(datetime_to_unix(record.expires_at))
        .bind(datetime_to_unix(record.refresh_expires_at))
        .bind(datetime_to_unix(record.updated_at))
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
            "SELECT {TOKEN_COLUMNS} FROM oauth_tokens WHERE access_token = ?"
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
            "SELECT {TOKEN_COLUMNS} FROM oauth_tokens WHERE refresh_token = ? AND client_id = ?"
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
             SET refresh_token = ?, expires_at = ?, refresh_expires_at = ?, updated_at = ?
             WHERE refresh_token = ? AND client_id = ?",
        )
        .bind(new_refresh)
        .bind(datetime_to_unix(expires_at))
        .bind(datetime_to_unix(refresh_expires_at))
        .bind(datetime_to_unix(Utc::now()))
        .bind(old_refresh)
        .bind(client_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_oauth_token_by_refresh(&self, refresh_token: &str) -> Result<()> {
        sqlx::query("DELETE FROM oauth_tokens WHERE refresh_token = ?")
            .bind(refresh_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_user_profile(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, avatar_url)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                email = excluded.email,
                avatar_url = excluded.avatar_url",
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
        let row = sqlx::query("SELECT id, username, email, avatar_url FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::parse_user).transpose()
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<PurgeReport> {
        let now = datetime_to_unix(now);

        let codes = sqlx::query("DELETE FROM oauth_codes WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let tokens = sqlx::query("DELETE FROM oauth_tokens WHERE refresh_expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(PurgeReport { codes, tokens })
    }
}
