//! Configuration management for Astral
//!
//! Loads and manages service configuration from astral.config.json

use crate::auth::codec::is_well_formed_credential;
use crate::constants::{
    DEFAULT_CLIENT_ID, DEFAULT_CLIENT_REDIRECT_URI, ENV_DATABASE_URL, ENV_SUPABASE_ANON_KEY,
    ENV_SUPABASE_JWT_SECRET, ENV_SUPABASE_URL,
};
use crate::{AstralError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::Path;

/// Complete Astral configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Storage configuration (required)
    pub storage: StorageConfig,

    /// HTTP server configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<LogConfig>,

    /// Credential store used to verify user sessions
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Registered OAuth clients
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthConfig>,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Driver name (sqlite, postgres, memory)
    pub driver: String,

    /// Data source name / connection string
    pub dsn: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins (e.g., ["https://astral.example.com"])
    /// If not specified, defaults to localhost origins for development
    #[serde(skip_serializing_if = "Option::is_none", rename = "allowedOrigins")]
    pub allowed_origins: Option<Vec<String>>,
}

fn default_host() -> String {
    crate::constants::DEFAULT_HTTP_HOST.to_string()
}

fn default_port() -> u16 {
    crate::constants::DEFAULT_HTTP_PORT
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Output format (text, json)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl LogConfig {
    pub fn is_json(&self) -> bool {
        self.format.as_deref() == Some("json")
    }
}

/// Credential store configuration
///
/// String values may reference the environment with `$env:NAME`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsConfig {
    /// Driver (supabase, jwt, memory)
    pub driver: String,

    /// Supabase project URL (supabase driver)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase_url: Option<String>,

    /// Supabase anon key sent as `apikey` (supabase driver)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supabase_anon_key: Option<String>,

    /// Project JWT secret (jwt driver)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Upstream request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Static credential -> user id map (memory driver, development only).
    /// Credentials must be JWT-shaped (three dot-separated base64url
    /// segments); refresh drops records whose credential is not.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tokens: HashMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            driver: "memory".to_string(),
            supabase_url: None,
            supabase_anon_key: None,
            jwt_secret: None,
            timeout_secs: default_timeout_secs(),
            tokens: HashMap::new(),
        }
    }
}

/// OAuth client registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub clients: Vec<RegisteredClient>,
}

/// A client allowed to request authorization codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredClient {
    pub client_id: String,

    /// Display name shown on the consent page
    pub name: String,

    pub redirect_uri: String,

    #[serde(default)]
    pub default_scopes: Vec<String>,
}

impl RegisteredClient {
    /// The built-in launcher client
    pub fn launcher() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            name: "Astral Launcher".to_string(),
            redirect_uri: DEFAULT_CLIENT_REDIRECT_URI.to_string(),
            default_scopes: vec!["profile".to_string()],
        }
    }

    /// Default scopes joined with spaces
    pub fn default_scope(&self) -> String {
        self.default_scopes.join(" ")
    }
}

impl Config {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path(crate::constants::CONFIG_FILE_NAME)
    }

    /// Load configuration from specific path
    ///
    /// Supports both JSON and YAML formats based on file extension:
    /// - `.json` files are parsed as JSON
    /// - `.yaml` or `.yml` files are parsed as YAML
    /// - Files without extension default to JSON parsing
    ///
    /// `$env:` references are expanded and `ASTRAL_*` overrides applied before
    /// validation.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|s| s.to_str()) {
                Some("yaml") | Some("yml") => serde_yaml::from_str(&content).map_err(|e| {
                    AstralError::config(format!("Failed to parse YAML config: {}", e))
                })?,
                _ => serde_json::from_str(&content).map_err(|e| {
                    AstralError::config(format!("Failed to parse JSON config: {}", e))
                })?,
            }
        } else {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        config.expand_env_values();
        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to specific path
    ///
    /// Supports both JSON and YAML formats based on file extension.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = match path_ref.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::to_string(self).map_err(|e| {
                AstralError::config(format!("Failed to serialize to YAML: {}", e))
            })?,
            _ => serde_json::to_string_pretty(self)?,
        };

        std::fs::write(path_ref, content)?;
        Ok(())
    }

    /// Expand `$env:NAME` references in secret-bearing fields
    fn expand_env_values(&mut self) {
        use crate::utils::expand_env_value;

        self.storage.dsn = expand_env_value(&self.storage.dsn);
        let creds = &mut self.credentials;
        for field in [
            &mut creds.supabase_url,
            &mut creds.supabase_anon_key,
            &mut creds.jwt_secret,
        ]
        .into_iter()
        .flatten()
        {
            *field = expand_env_value(field);
        }
    }

    /// Apply `ASTRAL_*` environment overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(dsn) = var(ENV_DATABASE_URL) {
            if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
                self.storage.driver = "postgres".to_string();
            }
            self.storage.dsn = dsn;
        }
        if let Some(url) = var(ENV_SUPABASE_URL) {
            self.credentials.supabase_url = Some(url);
        }
        if let Some(key) = var(ENV_SUPABASE_ANON_KEY) {
            self.credentials.supabase_anon_key = Some(key);
        }
        if let Some(secret) = var(ENV_SUPABASE_JWT_SECRET) {
            self.credentials.jwt_secret = Some(secret);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.driver.is_empty() {
            return Err(AstralError::config("storage.driver is required"));
        }

        if self.storage.dsn.is_empty() {
            return Err(AstralError::config("storage.dsn is required"));
        }

        match self.storage.driver.as_str() {
            "sqlite" | "postgres" | "memory" => {}
            _ => {
                return Err(AstralError::config(format!(
                    "Unsupported storage driver: '{}'. Supported: sqlite, postgres, memory",
                    self.storage.driver
                )));
            }
        }

        if let Some(ref http) = self.http {
            if http.port == 0 {
                return Err(AstralError::config("http.port must be nonzero (1-65535)"));
            }

            if http.host.is_empty() {
                return Err(AstralError::config("http.host cannot be empty"));
            }

            if let Some(ref origins) = http.allowed_origins {
                for origin in origins {
                    if !origin.starts_with("http://") && !origin.starts_with("https://") {
                        return Err(AstralError::config(format!(
                            "Invalid CORS origin '{}': must start with http:// or https://",
                            origin
                        )));
                    }
                }
            }
        }

        if let Some(ref log) = self.log
            && let Some(ref format) = log.format
            && format != "text"
            && format != "json"
        {
            return Err(AstralError::config(format!(
                "Unsupported log.format: '{}'. Supported: text, json",
                format
            )));
        }

        let creds = &self.credentials;
        match creds.driver.as_str() {
            "supabase" => {
                if creds.supabase_url.as_deref().is_none_or(str::is_empty) {
                    return Err(AstralError::config(
                        "credentials.supabaseUrl is required when using supabase driver",
                    ));
                }
                if creds.supabase_anon_key.as_deref().is_none_or(str::is_empty) {
                    return Err(AstralError::config(
                        "credentials.supabaseAnonKey is required when using supabase driver",
                    ));
                }
            }
            "jwt" => {
                if creds.jwt_secret.as_deref().is_none_or(str::is_empty) {
                    return Err(AstralError::config(
                        "credentials.jwtSecret is required when using jwt driver",
                    ));
                }
            }
            "memory" => {
                if let Some(token) = creds.tokens.keys().find(|t| !is_well_formed_credential(t)) {
                    return Err(AstralError::config(format!(
                        "credentials.tokens entry '{}' is not JWT-shaped (header.payload.signature)",
                        token
                    )));
                }
            }
            other => {
                return Err(AstralError::config(format!(
                    "Unsupported credentials driver: '{}'. Supported: supabase, jwt, memory",
                    other
                )));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for client in self.clients() {
            if client.client_id.is_empty() {
                return Err(AstralError::config("oauth.clients[].clientId is required"));
            }
            if client.redirect_uri.is_empty() {
                return Err(AstralError::config(format!(
                    "oauth client '{}' has no redirectUri",
                    client.client_id
                )));
            }
            if url::Url::parse(&client.redirect_uri).is_err() {
                return Err(AstralError::config(format!(
                    "oauth client '{}' has an invalid redirectUri '{}'",
                    client.client_id, client.redirect_uri
                )));
            }
            if !seen.insert(client.client_id.as_str()) {
                return Err(AstralError::config(format!(
                    "Duplicate oauth client '{}'",
                    client.client_id
                )));
            }
        }

        Ok(())
    }

    /// Registered OAuth clients
    pub fn clients(&self) -> &[RegisteredClient] {
        self.oauth
            .as_ref()
            .map(|o| o.clients.as_slice())
            .unwrap_or_default()
    }

    /// Look up a client by id
    pub fn find_client(&self, client_id: &str) -> Option<&RegisteredClient> {
        self.clients().iter().find(|c| c.client_id == client_id)
    }

    /// HTTP configuration with defaults filled in
    pub fn http_or_default(&self) -> HttpConfig {
        self.http.clone().unwrap_or_else(|| HttpConfig {
            host: default_host(),
            port: default_port(),
            allowed_origins: None,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                driver: "sqlite".to_string(),
                dsn: crate::constants::default_sqlite_dsn().to_string(),
            },
            http: Some(HttpConfig {
                host: default_host(),
                port: default_port(),
                allowed_origins: None, // Defaults to localhost origins
            }),
            log: Some(LogConfig {
                level: Some("info".to_string()),
                format: None,
            }),
            credentials: CredentialsConfig::default(),
            oauth: Some(OAuthConfig {
                clients: vec![RegisteredClient::launcher()],
            }),
        }
    }
}

#[cfg(test)]
mod config_test;
