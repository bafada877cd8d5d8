//! Common SQL helpers for SQLite and PostgreSQL
//!
//! Shared timestamp conversions and uniqueness-violation classification used by
//! both SQL backends.

use crate::model::TokenInsert;
use crate::{AstralError, Result};
use chrono::{DateTime, Utc};

// ============================================================================
// SQLite-specific Helpers
// ============================================================================

/// Convert DateTime to SQLite INTEGER (unix timestamp)
#[inline]
pub fn datetime_to_unix(dt: DateTime<Utc>) -> i64 {
    dt.timestamp()
}

/// Parse DateTime from SQLite INTEGER (unix timestamp)
#[inline]
pub fn datetime_from_unix(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

// ============================================================================
// Uniqueness classification (used by both backends)
// ============================================================================

/// Column whose uniqueness makes a repeated redemption collapse onto one record
pub const ACCESS_TOKEN_COLUMN: &str = "access_token";

/// Check whether a database error is a uniqueness violation on `column`.
///
/// Postgres reports the constraint name (`oauth_tokens_access_token_key`),
/// SQLite reports `UNIQUE constraint failed: oauth_tokens.access_token`.
pub fn is_unique_violation_on(err: &sqlx::Error, column: &str) -> bool {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            db.constraint().is_some_and(|c| c.contains(column))
                || db.message().contains(column)
        }
        _ => false,
    }
}

/// Map the result of a token insert onto `TokenInsert`
pub fn classify_token_insert<T>(result: std::result::Result<T, sqlx::Error>) -> Result<TokenInsert> {
    match result {
        Ok(_) => Ok(TokenInsert::Inserted),
        Err(e) if is_unique_violation_on(&e, ACCESS_TOKEN_COLUMN) => {
            Ok(TokenInsert::AccessTokenExists)
        }
        Err(e) => Err(AstralError::from(e)),
    }
}
