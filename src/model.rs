//! Core data structures for the OAuth code exchange
//!
//! Authorization codes, token records, and the user profile snapshot returned
//! to the launcher.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Single-use authorization code issued when a user approves a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Opaque code value (unique)
    pub code: String,

    /// Client the code was issued to
    pub client_id: String,

    /// User who approved the client
    pub user_id: String,

    /// Redirect URI recorded at issuance
    pub redirect_uri: String,

    /// Granted scope (space separated)
    pub scope: String,

    /// CSRF state echoed back to the client
    pub state: Option<String>,

    /// Access credential captured from the approving session.
    /// Legacy rows may not carry one.
    pub access_credential: Option<String>,

    /// Flips false -> true exactly once
    pub used: bool,

    /// Absolute expiry
    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl AuthorizationCode {
    /// Check whether the code is past its expiry at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Long-lived session of a client: access credential plus rotating refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthTokenRecord {
    /// Access credential minted by the credential store (unique)
    pub access_token: String,

    /// Current refresh token (unique)
    pub refresh_token: String,

    pub user_id: String,

    pub client_id: String,

    pub scope: String,

    /// Access bookkeeping expiry
    pub expires_at: DateTime<Utc>,

    /// Refresh token expiry
    pub refresh_expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl OAuthTokenRecord {
    /// Build a fresh record with standard lifetimes starting at `now`
    pub fn issue(
        access_token: String,
        refresh_token: String,
        user_id: String,
        client_id: String,
        scope: String,
        now: DateTime<Utc>,
    ) -> Self {
        let (expires_at, refresh_expires_at) = token_expiries(now);
        Self {
            access_token,
            refresh_token,
            user_id,
            client_id,
            scope,
            expires_at,
            refresh_expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check whether the refresh token is past its expiry at `now`
    pub fn is_refresh_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_expires_at
    }
}

/// Access and refresh expiries for a record (re)issued at `now`
pub fn token_expiries(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        now + Duration::seconds(crate::constants::ACCESS_TOKEN_TTL_SECS),
        now + Duration::seconds(crate::constants::REFRESH_TOKEN_TTL_SECS),
    )
}

/// Profile row joined into the token response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserProfile {
    /// Profile carrying only the identifier (no `users` row yet)
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: None,
            email: None,
            avatar_url: None,
        }
    }
}

/// An unused authorization code together with the owner's profile
#[derive(Debug, Clone)]
pub struct RedeemableCode {
    pub code: AuthorizationCode,
    pub user: Option<UserProfile>,
}

/// Outcome of inserting a token record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenInsert {
    /// A new record was created
    Inserted,
    /// A record for the same access credential already exists
    AccessTokenExists,
}

/// Counts returned by the expired-row purge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub codes: u64,
    pub tokens: u64,
}
