use super::*;

#[test]
fn test_cli_structure_is_valid() {
    build_cli().debug_assert();
}

#[test]
fn test_serve_overrides_host_and_port() {
    let matches = build_cli()
        .try_get_matches_from(["astral-web", "serve", "--host", "0.0.0.0", "--port", "8080"])
        .unwrap();
    let (_, serve) = matches.subcommand().unwrap();

    let mut config = Config::default();
    apply_serve_overrides(serve, &mut config);

    let http = config.http.unwrap();
    assert_eq!(http.host, "0.0.0.0");
    assert_eq!(http.port, 8080);
}

#[test]
fn test_serve_keeps_configured_values() {
    let matches = build_cli()
        .try_get_matches_from(["astral-web", "serve"])
        .unwrap();
    let (_, serve) = matches.subcommand().unwrap();

    let mut config = Config {
        http: Some(HttpConfig {
            host: "10.0.0.5".to_string(),
            port: 4000,
            allowed_origins: Some(vec!["https://astral.example.com".to_string()]),
        }),
        ..Default::default()
    };
    apply_serve_overrides(serve, &mut config);

    let http = config.http.unwrap();
    assert_eq!(http.host, "10.0.0.5");
    assert_eq!(http.port, 4000);
    assert!(http.allowed_origins.is_some());
}

#[test]
fn test_invalid_port_rejected() {
    let result = build_cli().try_get_matches_from(["astral-web", "serve", "--port", "99999"]);
    assert!(result.is_err());
}

#[test]
fn test_global_config_flag() {
    let matches = build_cli()
        .try_get_matches_from(["astral-web", "purge", "--config", "/etc/astral.yaml", "--json"])
        .unwrap();
    assert_eq!(
        matches.get_one::<String>("config").map(String::as_str),
        Some("/etc/astral.yaml")
    );
    let (name, purge) = matches.subcommand().unwrap();
    assert_eq!(name, "purge");
    assert!(purge.get_flag("json"));
}

#[test]
fn test_config_validate_command() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let path = temp_dir.path().join("astral.config.json");
    std::fs::write(
        &path,
        r#"{"storage": {"driver": "memory", "dsn": "memory"}}"#,
    )
    .unwrap();

    let matches = build_cli()
        .try_get_matches_from(["astral-web", "config", "validate"])
        .unwrap();
    let (_, sub) = matches.subcommand().unwrap();
    assert!(handle_config_command(sub, path.to_str().unwrap()).is_ok());

    std::fs::write(&path, r#"{"storage": {"driver": "oracle", "dsn": "x"}}"#).unwrap();
    assert!(handle_config_command(sub, path.to_str().unwrap()).is_err());
}

#[tokio::test]
async fn test_purge_command_on_memory_storage() {
    let config = Config {
        storage: crate::config::StorageConfig {
            driver: "memory".to_string(),
            dsn: "memory".to_string(),
        },
        ..Default::default()
    };
    let matches = build_cli()
        .try_get_matches_from(["astral-web", "purge"])
        .unwrap();
    let (_, sub) = matches.subcommand().unwrap();

    assert!(handle_purge_command(sub, &config).await.is_ok());
}
