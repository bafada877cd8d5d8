//! OAuth authorization server for the launcher
//!
//! - **Grants**: authorization, code exchange, and refresh rotation
//! - **Server**: consent page and JSON endpoints
//! - **Middleware**: resolves the signed-in user from the credential store
//! - **Credentials**: credential store clients (Supabase, local JWT, memory)
//! - **Codec**: refresh token and authorization code generation

pub mod codec;
pub mod credentials;
pub mod grants;
pub mod middleware;
pub mod server;

pub use credentials::{
    CredentialStore, JwtCredentialStore, MemoryCredentialStore, SupabaseCredentialStore,
    VerifiedUser, create_credential_store,
};
pub use grants::{
    AuthorizeOutcome, AuthorizeRequest, Decision, OAuthService, RefreshRequest, TokenRequest,
    TokenResponse,
};
pub use middleware::{AuthenticatedUser, extract_bearer_token, validate_token};
pub use server::{OAuthServerState, create_oauth_routes};

#[cfg(test)]
mod codec_test;
