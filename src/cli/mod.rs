//! Command-line interface for Astral
//!
//! `serve` runs the HTTP server; the remaining commands are maintenance
//! helpers operating on the same configuration.

use crate::config::{Config, HttpConfig};
use crate::{AstralError, Result};
use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command};

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or(crate::constants::CONFIG_FILE_NAME);

    match matches.subcommand() {
        Some(("config", sub)) => handle_config_command(sub, config_path),
        Some((command, sub)) => {
            let config = Config::load_from_path(config_path)?;
            crate::init_logging(config.log.as_ref());

            match command {
                "serve" => handle_serve_command(sub, config).await,
                "clients" => handle_clients_command(sub, &config),
                "purge" => handle_purge_command(sub, &config).await,
                other => Err(AstralError::validation(format!("Unknown command: {}", other))),
            }
        }
        None => {
            eprintln!("No command specified. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Build the command tree
pub(crate) fn build_cli() -> Command {
    Command::new("astral-web")
        .about("Astral - launcher companion web service")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .env("ASTRAL_CONFIG")
                .help("Path to the configuration file (JSON or YAML)"),
        )
        .subcommand(
            Command::new("serve")
                .about("Start the HTTP server")
                .arg(Arg::new("host").long("host").help("Server host"))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .short('p')
                        .value_parser(clap::value_parser!(u16))
                        .help("Server port"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Configuration helpers")
                .subcommand_required(true)
                .subcommand(Command::new("validate").about("Load and validate the configuration")),
        )
        .subcommand(
            Command::new("clients")
                .about("List registered OAuth clients")
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("purge")
                .about("Delete expired authorization codes and token records")
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
        )
}

/// Apply `--host` / `--port` on top of the configured HTTP settings
pub(crate) fn apply_serve_overrides(matches: &ArgMatches, config: &mut Config) {
    let mut http = config.http_or_default();
    if let Some(host) = matches.get_one::<String>("host") {
        http.host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("port") {
        http.port = *port;
    }
    config.http = Some(http);
}

async fn handle_serve_command(matches: &ArgMatches, mut config: Config) -> Result<()> {
    apply_serve_overrides(matches, &mut config);
    let HttpConfig { host, port, .. } = config.http_or_default();

    println!("Starting Astral web service on {}:{}", host, port);
    println!("   Press Ctrl+C to stop\n");

    crate::http::start_server(config).await
}

fn handle_config_command(matches: &ArgMatches, config_path: &str) -> Result<()> {
    match matches.subcommand() {
        Some(("validate", _)) => {
            let config = Config::load_from_path(config_path)?;
            println!(
                "Configuration OK: storage={} credentials={} clients={}",
                config.storage.driver,
                config.credentials.driver,
                config.clients().len()
            );
            Ok(())
        }
        _ => Err(AstralError::validation("Unknown config command")),
    }
}

fn handle_clients_command(matches: &ArgMatches, config: &Config) -> Result<()> {
    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(config.clients())?);
        return Ok(());
    }

    println!("\nOAuth Clients:");
    for client in config.clients() {
        println!(
            "  {} ({}) -> {}",
            client.name, client.client_id, client.redirect_uri
        );
    }
    Ok(())
}

async fn handle_purge_command(matches: &ArgMatches, config: &Config) -> Result<()> {
    let storage = crate::storage::create_storage_from_config(&config.storage).await?;
    let report = storage.purge_expired(Utc::now()).await?;

    tracing::info!(
        codes = report.codes,
        tokens = report.tokens,
        "Purged expired OAuth state"
    );

    if matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Removed {} authorization code(s) and {} token record(s)",
            report.codes, report.tokens
        );
    }
    Ok(())
}

#[cfg(test)]
mod cli_test;
