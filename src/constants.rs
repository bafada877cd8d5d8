//! Constants used throughout Astral
//!
//! Configuration paths, protocol lifetimes, token prefixes, and header names.

use once_cell::sync::Lazy;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Get the home directory with fallback to current directory
pub fn get_home_dir() -> &'static str {
    static HOME_DIR: Lazy<String> = Lazy::new(|| {
        dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string())
    });
    &HOME_DIR
}

/// Default config directory (~/.astral)
pub fn default_config_dir() -> &'static str {
    static CONFIG_DIR: Lazy<String> = Lazy::new(|| format!("{}/.astral", get_home_dir()));
    &CONFIG_DIR
}

/// Default SQLite DSN (~/.astral/astral.db)
pub fn default_sqlite_dsn() -> &'static str {
    static SQLITE_DSN: Lazy<String> = Lazy::new(|| format!("{}/astral.db", default_config_dir()));
    &SQLITE_DSN
}

/// Configuration file name
pub const CONFIG_FILE_NAME: &str = "astral.config.json";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default HTTP host
pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";

/// Environment variable overriding `storage.dsn`
pub const ENV_DATABASE_URL: &str = "ASTRAL_DATABASE_URL";

/// Environment variable overriding `credentials.supabaseUrl`
pub const ENV_SUPABASE_URL: &str = "ASTRAL_SUPABASE_URL";

/// Environment variable overriding `credentials.supabaseAnonKey`
pub const ENV_SUPABASE_ANON_KEY: &str = "ASTRAL_SUPABASE_ANON_KEY";

/// Environment variable overriding `credentials.jwtSecret`
pub const ENV_SUPABASE_JWT_SECRET: &str = "ASTRAL_SUPABASE_JWT_SECRET";

// ============================================================================
// OAUTH PROTOCOL
// ============================================================================

/// Authorization code lifetime (10 minutes)
pub const AUTH_CODE_TTL_SECS: i64 = 600;

/// Access credential bookkeeping lifetime (1 hour)
pub const ACCESS_TOKEN_TTL_SECS: i64 = 3600;

/// Refresh token lifetime (7 days)
pub const REFRESH_TOKEN_TTL_SECS: i64 = 604_800;

/// Random bytes behind a refresh token
pub const REFRESH_TOKEN_BYTES: usize = 48;

/// Random bytes behind an authorization code
pub const AUTH_CODE_BYTES: usize = 32;

/// Refresh token prefix
pub const REFRESH_TOKEN_PREFIX: &str = "rt_";

/// Authorization code prefix
pub const AUTH_CODE_PREFIX: &str = "ac_";

/// Token type returned by the token and refresh endpoints
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Grant type for code redemption
pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";

/// Grant type for refresh rotation
pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Default client registered out of the box
pub const DEFAULT_CLIENT_ID: &str = "astral-launcher";

/// Default redirect URI of the launcher
pub const DEFAULT_CLIENT_REDIRECT_URI: &str = "astral-ai://callback";

// ============================================================================
// HTTP
// ============================================================================

/// Cookie carrying the Supabase session access token
pub const SESSION_COOKIE_NAME: &str = "sb-access-token";

/// Supabase JWT audience for signed-in users
pub const SUPABASE_AUDIENCE: &str = "authenticated";

/// Supabase endpoint returning the user behind a bearer credential
pub const SUPABASE_USER_PATH: &str = "/auth/v1/user";
