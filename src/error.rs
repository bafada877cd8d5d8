//! Error types for Astral
//!
//! This module provides the crate-wide error hierarchy using thiserror, plus the
//! OAuth-flavored error taxonomy returned by the token, refresh, and
//! authorization endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main error type for Astral operations
#[derive(Error, Debug)]
pub enum AstralError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::UniqueViolation(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::Connection(err.to_string())
            }
            _ => StorageError::Database(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for AstralError {
    fn from(err: sqlx::Error) -> Self {
        AstralError::Storage(StorageError::from(err))
    }
}

impl From<sqlx::migrate::MigrateError> for AstralError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AstralError::Storage(StorageError::Database(format!(
            "Failed to run migrations: {}",
            err
        )))
    }
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Reqwest error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl From<reqwest::Error> for AstralError {
    fn from(err: reqwest::Error) -> Self {
        AstralError::Network(NetworkError::Reqwest(err))
    }
}

/// Convenient result type for Astral operations
pub type Result<T> = std::result::Result<T, AstralError>;

impl AstralError {
    /// Create a validation error
    #[inline]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        AstralError::Validation(msg.into())
    }

    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        AstralError::Config(msg.into())
    }

    /// Create a storage error
    #[inline]
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        AstralError::Storage(StorageError::Database(msg.into()))
    }

    /// Create a credential store error
    #[inline]
    pub fn credential<S: Into<String>>(msg: S) -> Self {
        AstralError::Credential(msg.into())
    }
}

// ============================================================================
// OAuth error taxonomy
// ============================================================================

/// OAuth error codes surfaced to clients as `{error, error_description}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorKind {
    /// Structurally malformed input (missing field, mismatched state)
    InvalidRequest,
    /// Grant type this service does not implement
    UnsupportedGrantType,
    /// Code or refresh token unknown, used, expired, or bound to a dead credential
    InvalidGrant,
    /// client_id not in the registry
    UnknownClient,
    /// redirect_uri differs from the registered one
    InvalidRedirectUri,
    /// Caller is not authenticated, or the user declined
    AccessDenied,
    /// Unexpected store or upstream failure
    ServerError,
}

impl OAuthErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthErrorKind::InvalidRequest => "invalid_request",
            OAuthErrorKind::UnsupportedGrantType => "unsupported_grant_type",
            OAuthErrorKind::InvalidGrant => "invalid_grant",
            OAuthErrorKind::UnknownClient => "unknown_client",
            OAuthErrorKind::InvalidRedirectUri => "invalid_redirect_uri",
            OAuthErrorKind::AccessDenied => "access_denied",
            OAuthErrorKind::ServerError => "server_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthErrorKind::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
            OAuthErrorKind::AccessDenied => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for OAuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol-level OAuth failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {description}")]
pub struct OAuthError {
    pub kind: OAuthErrorKind,
    pub description: String,
}

impl OAuthError {
    pub fn new<S: Into<String>>(kind: OAuthErrorKind, description: S) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    pub fn invalid_request<S: Into<String>>(description: S) -> Self {
        Self::new(OAuthErrorKind::InvalidRequest, description)
    }

    pub fn invalid_grant<S: Into<String>>(description: S) -> Self {
        Self::new(OAuthErrorKind::InvalidGrant, description)
    }

    pub fn unsupported_grant_type<S: Into<String>>(description: S) -> Self {
        Self::new(OAuthErrorKind::UnsupportedGrantType, description)
    }

    pub fn access_denied<S: Into<String>>(description: S) -> Self {
        Self::new(OAuthErrorKind::AccessDenied, description)
    }

    pub fn server_error() -> Self {
        Self::new(
            OAuthErrorKind::ServerError,
            "An internal error occurred. Please retry.",
        )
    }
}

/// Wire shape of an OAuth error body
#[derive(Debug, Serialize)]
struct OAuthErrorBody<'a> {
    error: &'a str,
    error_description: &'a str,
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        tracing::debug!(
            error = self.kind.as_str(),
            description = %self.description,
            "OAuth error response"
        );

        let body = OAuthErrorBody {
            error: self.kind.as_str(),
            error_description: &self.description,
        };
        (self.kind.status(), Json(body)).into_response()
    }
}

// Store and upstream failures never leak details to the client.
impl From<AstralError> for OAuthError {
    fn from(err: AstralError) -> Self {
        tracing::error!("OAuth request failed: {}", err);
        OAuthError::server_error()
    }
}

impl From<StorageError> for OAuthError {
    fn from(err: StorageError) -> Self {
        OAuthError::from(AstralError::Storage(err))
    }
}
