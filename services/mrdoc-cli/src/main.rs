//! MrDoc command-line client
//!
//! Thin binary over `session-client`:
//! 1. Loads config (`--config`, `CONFIG_PATH`, or `mrdoc.toml`)
//! 2. Restores tokens from the credentials file
//! 3. Runs one command; expired access tokens are refreshed transparently
//!
//! Commands: `login <username>`, `me`, `get <path>`, `logout`.

mod config;

use anyhow::{Context, Result, bail};
use common::Secret;
use session_auth::FileCredentialStore;
use session_client::ApiClient;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::ReqwestTransport;

use crate::config::Config;

const USAGE: &str = "usage: mrdoc [--config <path>] <login <username> | me | get <path> | logout>";

/// A parsed command line.
#[derive(Debug, PartialEq, Eq)]
struct Invocation {
    config_path: Option<String>,
    command: Command,
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Login { username: String },
    Me,
    Get { path: String },
    Logout,
}

fn parse_args(args: &[String]) -> Result<Invocation> {
    let mut config_path = None;
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let Some(path) = iter.next() else {
                bail!("--config requires a path\n{USAGE}");
            };
            config_path = Some(path.clone());
        } else {
            positional.push(arg.as_str());
        }
    }

    let command = match positional.as_slice() {
        ["login", username] => Command::Login {
            username: (*username).to_string(),
        },
        ["me"] => Command::Me,
        ["get", path] => Command::Get {
            path: (*path).to_string(),
        },
        ["logout"] => Command::Logout,
        _ => bail!("{USAGE}"),
    };

    Ok(Invocation {
        config_path,
        command,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to encode output")?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs to stderr so command output on stdout stays parseable
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = parse_args(&args)?;

    let (config_path, explicit) = Config::resolve_path(invocation.config_path.as_deref());
    let config = if explicit {
        Config::load(&config_path)
    } else {
        Config::load_or_default(&config_path)
    }
    .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        credentials = %config.auth.credentials_path.display(),
        "configuration loaded"
    );

    let transport = ReqwestTransport::new(&config.api.base_url, config.request_timeout())
        .context("failed to build HTTP client")?;
    let store = FileCredentialStore::load(config.auth.credentials_path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to load credentials from {}",
                config.auth.credentials_path.display()
            )
        })?;
    let client = ApiClient::builder(Arc::new(transport), Arc::new(store))
        .refresh_settings(config.refresh_settings())
        .build();

    match invocation.command {
        Command::Login { username } => {
            let password = std::env::var("MRDOC_PASSWORD")
                .map(Secret::new)
                .context("MRDOC_PASSWORD must be set to log in")?;
            let user = client.login(&username, password).await.context("login failed")?;
            print_json(&user)?;
        }
        Command::Me => {
            let user = client.me().await.context("failed to fetch current user")?;
            print_json(&user)?;
        }
        Command::Get { path } => {
            let data: serde_json::Value = client
                .get_json(&path)
                .await
                .with_context(|| format!("GET {path} failed"))?;
            print_json(&data)?;
        }
        Command::Logout => {
            client.logout().await.context("logout failed")?;
        }
    }

    Ok(())
}
