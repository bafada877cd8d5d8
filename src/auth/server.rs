//! OAuth HTTP endpoints
//!
//! Consent page and decision endpoints for the interactive user, plus the
//! JSON token and refresh endpoints called by the launcher. All protocol logic
//! lives in [`OAuthService`]; handlers only translate requests and errors.

use crate::auth::credentials::CredentialStore;
use crate::auth::grants::{
    AuthorizeRequest, Decision, OAuthService, RefreshRequest, TokenRequest, TokenResponse,
};
use crate::auth::middleware::AuthenticatedUser;
use crate::error::{OAuthError, OAuthErrorKind};
use crate::http::template::TemplateRenderer;
use axum::{
    Form, Json, Router,
    extract::{
        FromRef, Query, State,
        rejection::{FormRejection, JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// State shared by the OAuth handlers
#[derive(Clone)]
pub struct OAuthServerState {
    pub service: Arc<OAuthService>,
    pub templates: Arc<TemplateRenderer>,
}

impl OAuthServerState {
    pub fn new(service: Arc<OAuthService>) -> Self {
        Self {
            service,
            templates: Arc::new(TemplateRenderer::with_oauth_templates()),
        }
    }
}

impl FromRef<OAuthServerState> for Arc<dyn CredentialStore> {
    fn from_ref(state: &OAuthServerState) -> Self {
        state.service.credentials().clone()
    }
}

/// Consent decision submitted by the form or the JSON endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    pub decision: Decision,
}

impl DecisionRequest {
    fn into_parts(self) -> (AuthorizeRequest, Decision) {
        (
            AuthorizeRequest {
                client_id: self.client_id,
                redirect_uri: self.redirect_uri,
                state: self.state,
                scope: self.scope,
            },
            self.decision,
        )
    }
}

/// Create OAuth routes
pub fn create_oauth_routes(state: OAuthServerState) -> Router {
    Router::new()
        .route(
            "/oauth/authorize",
            get(authorize_page_handler).post(authorize_form_handler),
        )
        .route("/api/oauth/authorize", post(authorize_api_handler))
        .route("/api/oauth/token", post(token_handler))
        .route("/api/oauth/refresh", post(refresh_handler))
        .with_state(state)
}

// ============================================================================
// Consent (HTML)
// ============================================================================

/// Render the consent page for a signed-in user
async fn authorize_page_handler(
    State(state): State<OAuthServerState>,
    query: Result<Query<AuthorizeRequest>, QueryRejection>,
    user: Result<AuthenticatedUser, OAuthError>,
) -> Response {
    let Query(req) = match query {
        Ok(q) => q,
        Err(rejection) => {
            let err = OAuthError::invalid_request(rejection.body_text());
            return error_page(&state.templates, &err);
        }
    };

    let resolved = match state.service.resolve(&req) {
        Ok(r) => r,
        Err(err) => return error_page(&state.templates, &err),
    };

    let user = match user {
        Ok(user) => user,
        Err(err) if err.kind == OAuthErrorKind::AccessDenied => {
            return render_page(
                &state.templates,
                StatusCode::UNAUTHORIZED,
                "login",
                json!({
                    "client_name": resolved.client.name,
                    "description": err.description,
                }),
            );
        }
        Err(err) => return error_page(&state.templates, &err),
    };

    let scopes: Vec<&str> = resolved.scope.split_whitespace().collect();
    render_page(
        &state.templates,
        StatusCode::OK,
        "consent",
        json!({
            "client_name": resolved.client.name,
            "client_id": resolved.client.client_id,
            "redirect_uri": resolved.redirect_uri,
            "scope": resolved.scope,
            "scopes": scopes,
            "state": resolved.state,
            "email": user.email,
        }),
    )
}

/// Apply the consent form's decision and redirect back to the client
async fn authorize_form_handler(
    State(state): State<OAuthServerState>,
    user: Result<AuthenticatedUser, OAuthError>,
    form: Result<Form<DecisionRequest>, FormRejection>,
) -> Response {
    let user = match user {
        Ok(user) => user,
        Err(err) => return error_page(&state.templates, &err),
    };
    let Form(form) = match form {
        Ok(f) => f,
        Err(rejection) => {
            let err = OAuthError::invalid_request(rejection.body_text());
            return error_page(&state.templates, &err);
        }
    };

    let (req, decision) = form.into_parts();
    match state.service.authorize(&req, &user, decision).await {
        Ok(outcome) => Redirect::to(&outcome.redirect_to).into_response(),
        Err(err) => error_page(&state.templates, &err),
    }
}

// ============================================================================
// JSON API
// ============================================================================

/// Apply a decision for script-driven consent pages
async fn authorize_api_handler(
    State(state): State<OAuthServerState>,
    user: AuthenticatedUser,
    payload: Result<Json<DecisionRequest>, JsonRejection>,
) -> Result<Response, OAuthError> {
    let Json(body) = payload.map_err(malformed_body)?;
    let (req, decision) = body.into_parts();
    let outcome = state.service.authorize(&req, &user, decision).await?;
    Ok(Json(outcome).into_response())
}

/// Authorization-code grant
async fn token_handler(
    State(state): State<OAuthServerState>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Response, OAuthError> {
    let Json(req) = payload.map_err(malformed_body)?;
    let response = state.service.exchange_code(req).await?;
    Ok(token_response(response))
}

/// Refresh-token grant
async fn refresh_handler(
    State(state): State<OAuthServerState>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Response, OAuthError> {
    let Json(req) = payload.map_err(malformed_body)?;
    let response = state.service.refresh(req).await?;
    Ok(token_response(response))
}

// ============================================================================
// Helpers
// ============================================================================

fn token_response(body: TokenResponse) -> Response {
    (
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
        .into_response()
}

fn malformed_body(rejection: JsonRejection) -> OAuthError {
    tracing::debug!("Rejected request body: {}", rejection.body_text());
    OAuthError::invalid_request("Request body must be a JSON object")
}

fn error_page(templates: &TemplateRenderer, err: &OAuthError) -> Response {
    render_page(
        templates,
        err.kind.status(),
        "error",
        json!({
            "error": err.kind.as_str(),
            "error_description": err.description,
        }),
    )
}

fn render_page(
    templates: &TemplateRenderer,
    status: StatusCode,
    name: &str,
    data: Value,
) -> Response {
    match templates.render_json(name, &data) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!("Failed to render {} page: {}", name, e);
            OAuthError::server_error().into_response()
        }
    }
}
