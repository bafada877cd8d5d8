//! Astral - launcher companion web service
//!
//! The launcher signs users in through the browser and receives an
//! authorization code on its registered redirect URI. This crate implements
//! the server side of that exchange:
//! - Consent page and authorization decision (`/oauth/authorize`)
//! - Race-safe code redemption (`/api/oauth/token`)
//! - Refresh-token rotation (`/api/oauth/refresh`)
//! - Pluggable storage (in-memory, SQLite, PostgreSQL)
//! - Pluggable credential verification (Supabase Auth, local JWT, in-memory)
//!
//! # Example
//!
//! ```rust,no_run
//! use astral_web::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load()?;
//!     astral_web::http::start_server(config).await?;
//!     Ok(())
//! }
//! ```

// Core modules
pub mod constants;
pub mod error;
pub mod model;

// Infrastructure
pub mod config;
pub mod storage;
pub mod telemetry;

// Interface layers
pub mod auth;
pub mod cli;
pub mod http;

// Utilities
pub mod utils;

// Re-exports for convenience
pub use error::{AstralError, OAuthError, Result};
pub use model::{AuthorizationCode, OAuthTokenRecord, UserProfile};

/// Initialize logging for the application
///
/// `RUST_LOG` takes precedence over `log.level`. `log.format = "json"`
/// switches to structured output.
pub fn init_logging(config: Option<&config::LogConfig>) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let default_level = config
        .and_then(|c| c.level.as_deref())
        .map(|level| format!("astral_web={}", level))
        .unwrap_or_else(|| "astral_web=info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into());

    let json = config.is_some_and(|c| c.is_json());
    let registry = tracing_subscriber::registry().with(filter);

    // A subscriber may already be installed (tests, embedding applications)
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("Logging already initialized: {}", e);
    }
}
