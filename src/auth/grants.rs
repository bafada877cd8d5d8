//! Authorization, code exchange, and refresh rotation
//!
//! The protocol state lives entirely in `OAuthStorage`. Handlers never lock
//! in-process; every state transition is a single-row conditional write:
//!
//! - a code is consumed with `used = false -> true`, and only after the token
//!   record it produces has been persisted
//! - concurrent redemptions of one code collapse onto a single record through
//!   the access-credential uniqueness constraint
//! - a refresh token is rotated with a compare-and-set on its old value

use crate::auth::codec::{generate_auth_code, generate_refresh_token, is_well_formed_credential};
use crate::auth::credentials::CredentialStore;
use crate::auth::middleware::AuthenticatedUser;
use crate::config::RegisteredClient;
use crate::constants::{
    ACCESS_TOKEN_TTL_SECS, AUTH_CODE_TTL_SECS, GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN,
    REFRESH_TOKEN_TTL_SECS, TOKEN_TYPE_BEARER,
};
use crate::error::{OAuthError, OAuthErrorKind};
use crate::model::*;
use crate::storage::OAuthStorage;
use crate::telemetry;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use url::Url;

type GrantResult<T> = std::result::Result<T, OAuthError>;

/// Parameters of an authorization request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizeRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// The user's answer on the consent page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Deny,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Approve => "approve",
            Decision::Deny => "deny",
        }
    }
}

/// A validated authorization request, ready for the consent page
#[derive(Debug, Clone)]
pub struct ResolvedAuthorization {
    pub client: RegisteredClient,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
}

/// Where to send the user agent after a decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizeOutcome {
    pub redirect_to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Authorization-code grant parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

/// Refresh-token grant parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Successful token or refresh response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl TokenResponse {
    fn new(record: &OAuthTokenRecord, user: Option<UserProfile>) -> Self {
        Self {
            access_token: record.access_token.clone(),
            refresh_token: record.refresh_token.clone(),
            token_type: TOKEN_TYPE_BEARER,
            expires_in: ACCESS_TOKEN_TTL_SECS,
            refresh_expires_in: REFRESH_TOKEN_TTL_SECS,
            scope: record.scope.clone(),
            user,
        }
    }
}

/// OAuth authorization server core
pub struct OAuthService {
    storage: Arc<dyn OAuthStorage>,
    credentials: Arc<dyn CredentialStore>,
    clients: HashMap<String, RegisteredClient>,
}

impl OAuthService {
    pub fn new(
        storage: Arc<dyn OAuthStorage>,
        credentials: Arc<dyn CredentialStore>,
        clients: Vec<RegisteredClient>,
    ) -> Self {
        Self {
            storage,
            credentials,
            clients: clients
                .into_iter()
                .map(|c| (c.client_id.clone(), c))
                .collect(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn OAuthStorage> {
        &self.storage
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub fn client(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients.get(client_id)
    }

    // ------------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------------

    /// Validate an authorization request against the client registry
    pub fn resolve(&self, req: &AuthorizeRequest) -> GrantResult<ResolvedAuthorization> {
        if req.client_id.is_empty() {
            return Err(OAuthError::invalid_request("client_id is required"));
        }

        let client = self.client(&req.client_id).ok_or_else(|| {
            OAuthError::new(OAuthErrorKind::UnknownClient, "Unknown client_id")
        })?;

        let redirect_uri = match req.redirect_uri.as_deref().filter(|u| !u.is_empty()) {
            Some(uri) if uri != client.redirect_uri => {
                return Err(OAuthError::new(
                    OAuthErrorKind::InvalidRedirectUri,
                    "redirect_uri does not match the registered redirect URI",
                ));
            }
            _ => client.redirect_uri.clone(),
        };

        let scope = match req.scope.as_deref().map(str::trim) {
            Some(scope) if !scope.is_empty() => scope.to_string(),
            _ => client.default_scope(),
        };

        Ok(ResolvedAuthorization {
            client: client.clone(),
            redirect_uri,
            scope,
            state: req.state.clone().filter(|s| !s.is_empty()),
        })
    }

    /// Record the user's decision.
    ///
    /// Approval stores a single-use code capturing the user's credential;
    /// denial writes nothing.
    pub async fn authorize(
        &self,
        req: &AuthorizeRequest,
        user: &AuthenticatedUser,
        decision: Decision,
    ) -> GrantResult<AuthorizeOutcome> {
        let resolved = self.resolve(req)?;
        telemetry::record_authorization(&resolved.client.client_id, decision.as_str());

        if decision == Decision::Deny {
            tracing::info!(
                client_id = %resolved.client.client_id,
                user_id = %user.user_id,
                "Authorization denied"
            );
            let redirect_to = build_redirect(
                &resolved.redirect_uri,
                &[("error", "access_denied")],
                resolved.state.as_deref(),
            )?;
            return Ok(AuthorizeOutcome {
                redirect_to,
                code: None,
            });
        }

        let now = Utc::now();
        let code = AuthorizationCode {
            code: generate_auth_code(),
            client_id: resolved.client.client_id.clone(),
            user_id: user.user_id.clone(),
            redirect_uri: resolved.redirect_uri.clone(),
            scope: resolved.scope.clone(),
            state: resolved.state.clone(),
            access_credential: Some(user.access_token.clone()),
            used: false,
            expires_at: now + Duration::seconds(AUTH_CODE_TTL_SECS),
            created_at: now,
        };

        if let Err(e) = self.storage.insert_authorization_code(&code).await {
            tracing::error!(client_id = %code.client_id, "Failed to store authorization code: {}", e);
            return Err(OAuthError::server_error());
        }

        tracing::info!(
            client_id = %code.client_id,
            user_id = %code.user_id,
            "Authorization code issued"
        );

        let redirect_to = build_redirect(
            &resolved.redirect_uri,
            &[("code", code.code.as_str())],
            resolved.state.as_deref(),
        )?;

        Ok(AuthorizeOutcome {
            redirect_to,
            code: Some(code.code),
        })
    }

    // ------------------------------------------------------------------------
    // Authorization-code grant
    // ------------------------------------------------------------------------

    /// Redeem an authorization code for the captured access credential and a
    /// fresh refresh token
    pub async fn exchange_code(&self, req: TokenRequest) -> GrantResult<TokenResponse> {
        let result = self.exchange_code_inner(req).await;
        record_outcome(GRANT_AUTHORIZATION_CODE, &result);
        result
    }

    async fn exchange_code_inner(&self, req: TokenRequest) -> GrantResult<TokenResponse> {
        require_grant_type(req.grant_type.as_deref(), GRANT_AUTHORIZATION_CODE)?;

        let (Some(code), Some(client_id)) = (non_empty(&req.code), non_empty(&req.client_id))
        else {
            return Err(OAuthError::invalid_request(
                "code and client_id are required",
            ));
        };

        let Some(RedeemableCode { code: row, user }) = self
            .storage
            .find_unused_authorization_code(code, client_id)
            .await?
        else {
            return Err(OAuthError::invalid_grant(
                "Authorization code is invalid, expired, or already used",
            ));
        };

        let now = Utc::now();
        if row.is_expired_at(now) {
            self.storage.delete_authorization_code(&row.code).await?;
            return Err(OAuthError::invalid_grant("Authorization code has expired"));
        }

        if let Some(redirect_uri) = non_empty(&req.redirect_uri)
            && !ct_eq(redirect_uri, &row.redirect_uri)
        {
            return Err(OAuthError::invalid_grant("redirect_uri mismatch"));
        }

        if let Some(state) = non_empty(&req.state)
            && !row.state.as_deref().is_some_and(|s| ct_eq(state, s))
        {
            return Err(OAuthError::invalid_request("state mismatch"));
        }

        let Some(access_token) = row.access_credential.clone() else {
            tracing::warn!(client_id = %client_id, "Authorization code has no captured credential");
            return Err(OAuthError::invalid_grant(
                "Authorization code is missing its session; please authorize again",
            ));
        };

        let record = OAuthTokenRecord::issue(
            access_token,
            generate_refresh_token(),
            row.user_id.clone(),
            row.client_id.clone(),
            row.scope.clone(),
            now,
        );

        // Persist tokens first; the code stays redeemable if this fails.
        match self.storage.insert_oauth_token(&record).await? {
            TokenInsert::Inserted => {}
            TokenInsert::AccessTokenExists => {
                if !self.storage.update_oauth_token_by_access(&record).await? {
                    return Err(self.unwritable_token_record(&record).await?);
                }
                tracing::debug!(client_id = %client_id, "Token record updated in place");
            }
        }

        if !self.storage.mark_authorization_code_used(&row.code).await? {
            tracing::debug!(client_id = %client_id, "Authorization code already consumed concurrently");
        }

        tracing::info!(client_id = %client_id, user_id = %row.user_id, "Authorization code redeemed");

        let user = user.unwrap_or_else(|| UserProfile::bare(row.user_id.clone()));
        Ok(TokenResponse::new(&record, Some(user)))
    }

    /// Explain why a conflicting token record could not be overwritten.
    /// A record held by another client stays untouched and the code stays unused.
    async fn unwritable_token_record(&self, record: &OAuthTokenRecord) -> GrantResult<OAuthError> {
        match self.storage.get_oauth_token_by_access(&record.access_token).await? {
            Some(existing) if existing.client_id != record.client_id => {
                tracing::warn!(
                    client_id = %record.client_id,
                    holder = %existing.client_id,
                    "Session already linked to another client"
                );
                Ok(OAuthError::invalid_grant(
                    "Session is already linked to another client; please sign in again",
                ))
            }
            _ => {
                tracing::error!(
                    client_id = %record.client_id,
                    "Token record vanished between conflict and update"
                );
                Ok(OAuthError::server_error())
            }
        }
    }

    // ------------------------------------------------------------------------
    // Refresh-token grant
    // ------------------------------------------------------------------------

    /// Rotate a refresh token, returning the still-valid access credential
    pub async fn refresh(&self, req: RefreshRequest) -> GrantResult<TokenResponse> {
        let result = self.refresh_inner(req).await;
        record_outcome(GRANT_REFRESH_TOKEN, &result);
        result
    }

    async fn refresh_inner(&self, req: RefreshRequest) -> GrantResult<TokenResponse> {
        require_grant_type(req.grant_type.as_deref(), GRANT_REFRESH_TOKEN)?;

        let (Some(refresh_token), Some(client_id)) =
            (non_empty(&req.refresh_token), non_empty(&req.client_id))
        else {
            return Err(OAuthError::invalid_request(
                "refresh_token and client_id are required",
            ));
        };

        let Some(mut record) = self
            .storage
            .find_oauth_token_by_refresh(refresh_token, client_id)
            .await?
        else {
            return Err(OAuthError::invalid_grant("Invalid refresh token"));
        };

        let now = Utc::now();
        if record.is_refresh_expired_at(now) {
            self.storage.delete_oauth_token_by_refresh(refresh_token).await?;
            return Err(OAuthError::invalid_grant("Refresh token has expired"));
        }

        if !self.access_credential_still_valid(&record).await? {
            tracing::info!(
                client_id = %client_id,
                user_id = %record.user_id,
                "Access credential no longer accepted; dropping token record"
            );
            self.storage.delete_oauth_token_by_refresh(refresh_token).await?;
            return Err(OAuthError::invalid_grant(
                "Session is no longer valid; please authorize again",
            ));
        }

        let new_refresh = generate_refresh_token();
        let (expires_at, refresh_expires_at) = token_expiries(now);
        let rotated = self
            .storage
            .rotate_refresh_token(
                refresh_token,
                client_id,
                &new_refresh,
                expires_at,
                refresh_expires_at,
            )
            .await?;

        if !rotated {
            return Err(OAuthError::invalid_grant(
                "Refresh token was already used",
            ));
        }

        record.refresh_token = new_refresh;
        record.expires_at = expires_at;
        record.refresh_expires_at = refresh_expires_at;

        tracing::info!(client_id = %client_id, user_id = %record.user_id, "Refresh token rotated");
        Ok(TokenResponse::new(&record, None))
    }

    /// `Ok(false)` when the credential is malformed, rejected, or now belongs
    /// to another user; `Err` when the credential store could not be asked.
    async fn access_credential_still_valid(
        &self,
        record: &OAuthTokenRecord,
    ) -> GrantResult<bool> {
        if !is_well_formed_credential(&record.access_token) {
            return Ok(false);
        }

        match self.credentials.verify(&record.access_token).await {
            Ok(Some(user)) => Ok(user.id == record.user_id),
            Ok(None) => Ok(false),
            Err(e) => {
                tracing::error!("Credential store unavailable during refresh: {}", e);
                Err(OAuthError::server_error())
            }
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn require_grant_type(grant_type: Option<&str>, expected: &str) -> GrantResult<()> {
    match grant_type.filter(|g| !g.is_empty()) {
        None => Err(OAuthError::invalid_request("grant_type is required")),
        Some(g) if g == expected => Ok(()),
        Some(g) => Err(OAuthError::unsupported_grant_type(format!(
            "Unsupported grant_type '{}'",
            g
        ))),
    }
}

fn ct_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn record_outcome<T>(grant_type: &str, result: &GrantResult<T>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind.as_str(),
    };
    telemetry::record_grant(grant_type, outcome);
}

/// Append query parameters (and `state` when present) to a redirect URI
fn build_redirect(
    redirect_uri: &str,
    params: &[(&str, &str)],
    state: Option<&str>,
) -> GrantResult<String> {
    let mut url = Url::parse(redirect_uri).map_err(|e| {
        tracing::error!(redirect_uri, "Registered redirect URI is invalid: {}", e);
        OAuthError::server_error()
    })?;

    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }

    Ok(url.to_string())
}
