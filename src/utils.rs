//! Utility functions and helpers
//!
//! Common utilities used throughout Astral.

use crate::auth::{MemoryCredentialStore, OAuthServerState, OAuthService};
use crate::config::{Config, StorageConfig};
use crate::storage::SqliteStorage;
use std::sync::Arc;
use tempfile::TempDir;

/// Expand a `$env:NAME` reference; other values are returned unchanged
pub fn expand_env_value(value: &str) -> String {
    match value.strip_prefix("$env:") {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => value.to_string(),
    }
}

/// Test environment with isolated temporary directories
///
/// Provides an isolated environment that mirrors production:
/// - Temporary `.astral` directory (auto-cleaned on drop)
/// - SQLite database in the temp directory
/// - In-memory credential store the test can seed
/// - `OAuthService` wired to both
///
/// # Example
///
/// ```no_run
/// use astral_web::utils::TestEnvironment;
///
/// # async fn example() {
/// let env = TestEnvironment::new().await;
/// env.credentials.insert("jwt-token", "user-1");
/// // Cleanup happens automatically when env drops
/// # }
/// ```
pub struct TestEnvironment {
    /// Temporary directory - kept alive for test duration
    _temp_dir: TempDir,

    pub config: Arc<Config>,
    pub storage: Arc<SqliteStorage>,
    pub credentials: Arc<MemoryCredentialStore>,
    pub service: Arc<OAuthService>,
}

impl TestEnvironment {
    /// Create a new isolated test environment
    pub async fn new() -> Self {
        Self::with_db_name("astral.db").await
    }

    /// Create a test environment with a custom database name
    pub async fn with_db_name(db_name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join(".astral").join(db_name);
        let dsn = db_path.to_str().expect("temp path is UTF-8").to_string();

        let config = Arc::new(Config {
            storage: StorageConfig {
                driver: "sqlite".to_string(),
                dsn: dsn.clone(),
            },
            ..Default::default()
        });

        let storage = Arc::new(
            SqliteStorage::new(&dsn)
                .await
                .expect("Failed to create SQLite storage"),
        );
        let credentials = Arc::new(MemoryCredentialStore::new());
        let service = Arc::new(OAuthService::new(
            storage.clone(),
            credentials.clone(),
            config.clients().to_vec(),
        ));

        TestEnvironment {
            _temp_dir: temp_dir,
            config,
            storage,
            credentials,
            service,
        }
    }

    /// Handler state for the OAuth routes backed by this environment
    pub fn oauth_state(&self) -> OAuthServerState {
        OAuthServerState::new(self.service.clone())
    }
}
