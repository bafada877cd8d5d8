use super::*;
use crate::utils::expand_env_value;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.storage.driver, "sqlite");
    assert_eq!(config.http_or_default().port, 3000);
    assert_eq!(config.credentials.driver, "memory");

    let launcher = config.find_client("astral-launcher").unwrap();
    assert_eq!(launcher.redirect_uri, "astral-ai://callback");
    assert_eq!(launcher.default_scope(), "profile");
}

#[test]
fn test_config_serialization() {
    let config = Config::default();
    let json = serde_json::to_string_pretty(&config).unwrap();
    assert!(json.contains("\"redirectUri\""));

    let parsed: Config = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.storage.driver, "sqlite");
    assert_eq!(parsed.clients(), config.clients());
}

#[test]
fn test_config_validation() {
    let mut config = Config::default();
    assert!(config.validate().is_ok());

    config.storage.driver = String::new();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.storage.driver = "mongodb".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_bad_origins() {
    let mut config = Config::default();
    config.http = Some(HttpConfig {
        host: "0.0.0.0".to_string(),
        port: 8080,
        allowed_origins: Some(vec!["astral.example.com".to_string()]),
    });
    assert!(config.validate().is_err());

    config.http.as_mut().unwrap().allowed_origins =
        Some(vec!["https://astral.example.com".to_string()]);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validation_requires_credential_settings() {
    let mut config = Config::default();
    config.credentials.driver = "supabase".to_string();
    assert!(config.validate().is_err());

    config.credentials.supabase_url = Some("https://project.supabase.co".to_string());
    config.credentials.supabase_anon_key = Some("anon".to_string());
    assert!(config.validate().is_ok());

    config.credentials.driver = "jwt".to_string();
    assert!(config.validate().is_err());
    config.credentials.jwt_secret = Some("secret".to_string());
    assert!(config.validate().is_ok());

    config.credentials.driver = "ldap".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_requires_jwt_shaped_memory_tokens() {
    let mut config = Config::default();
    config.credentials.tokens.insert(
        "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJkZXYifQ.c2ln".to_string(),
        "dev-user".to_string(),
    );
    assert!(config.validate().is_ok());

    config
        .credentials
        .tokens
        .insert("dev-token".to_string(), "dev-user".to_string());
    let err = config.validate().unwrap_err().to_string();
    assert!(err.contains("dev-token"));
}

#[test]
fn test_validation_rejects_duplicate_clients() {
    let mut config = Config::default();
    config.oauth = Some(OAuthConfig {
        clients: vec![RegisteredClient::launcher(), RegisteredClient::launcher()],
    });
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_bad_redirect_uri() {
    let mut config = Config::default();
    let mut client = RegisteredClient::launcher();
    client.redirect_uri = "not a uri".to_string();
    config.oauth = Some(OAuthConfig {
        clients: vec![client],
    });
    assert!(config.validate().is_err());
}

#[test]
fn test_expand_env_value() {
    unsafe {
        std::env::set_var("ASTRAL_TEST_EXPAND", "test_value");
    }
    assert_eq!(expand_env_value("$env:ASTRAL_TEST_EXPAND"), "test_value");
    assert_eq!(expand_env_value("plain_value"), "plain_value");
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let temp = TempDir::new().unwrap();
    let config = Config::load_from_path(temp.path().join("absent.json")).unwrap();
    assert!(config.find_client("astral-launcher").is_some());
}

#[test]
fn test_load_yaml_config() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("astral.config.yaml");
    fs::write(
        &path,
        r#"
storage:
  driver: memory
  dsn: ":memory:"
log:
  format: json
credentials:
  driver: jwt
  jwtSecret: "$env:ASTRAL_TEST_YAML_SECRET"
oauth:
  clients:
    - clientId: astral-launcher
      name: Astral Launcher
      redirectUri: astral-ai://callback
      defaultScopes: [profile, friends]
"#,
    )
    .unwrap();

    unsafe {
        std::env::set_var("ASTRAL_TEST_YAML_SECRET", "from-env");
    }

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.storage.driver, "memory");
    assert!(config.log.as_ref().unwrap().is_json());
    assert_eq!(config.credentials.jwt_secret.as_deref(), Some("from-env"));
    assert_eq!(
        config.find_client("astral-launcher").unwrap().default_scope(),
        "profile friends"
    );
}

#[test]
fn test_load_invalid_json_fails() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("astral.config.json");
    fs::write(&path, "{ not json").unwrap();
    assert!(Config::load_from_path(&path).is_err());
}

#[test]
fn test_save_and_reload() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("astral.config.json");

    let mut config = Config::default();
    config.storage = StorageConfig {
        driver: "memory".to_string(),
        dsn: ":memory:".to_string(),
    };
    config.save_to_path(&path).unwrap();

    let loaded = Config::load_from_path(&path).unwrap();
    assert_eq!(loaded.storage.driver, "memory");
    assert_eq!(loaded.clients().len(), 1);
}

#[test]
fn test_environment_overrides() {
    let mut config = Config::default();
    config.apply_overrides_from(|name| match name {
        ENV_DATABASE_URL => Some("postgres://astral@localhost/astral".to_string()),
        ENV_SUPABASE_URL => Some("https://project.supabase.co".to_string()),
        ENV_SUPABASE_JWT_SECRET => Some(String::new()),
        _ => None,
    });

    assert_eq!(config.storage.driver, "postgres");
    assert_eq!(config.storage.dsn, "postgres://astral@localhost/astral");
    assert_eq!(
        config.credentials.supabase_url.as_deref(),
        Some("https://project.supabase.co")
    );
    // Empty values are ignored
    assert_eq!(config.credentials.jwt_secret, None);
}
