//! Session client
//!
//! Command-line front end for an authenticated API session:
//! 1. Loads config and opens the on-disk credential store
//! 2. Composes one `Session` (refresh coordinator + executor + invalidator)
//! 3. Runs a single command: login, logout, status or an API request
//!
//! Exit codes: 0 success, 1 request-level failure or bad usage, 2 session-level
//! failure (log in again).

mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use request_coordinator::{ClearSession, LogoutOutcome, Session};
use session_auth::FileCredentialStore;
use transport::{HttpRequest, ReqwestTransport};

use crate::cli::{Cli, Command};
use crate::config::Config;

const SESSION_EXPIRED: u8 = 2;
const REQUEST_FAILED: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
    // JSON logs to stderr so stdout carries only command output
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

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version come through here too
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(REQUEST_FAILED)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::from(REQUEST_FAILED)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store = Arc::new(
        FileCredentialStore::open(config.storage.credentials_path.clone()).with_context(|| {
            format!(
                "failed to open credential store {}",
                config.storage.credentials_path.display()
            )
        })?,
    );
    let client = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let transport = Arc::new(ReqwestTransport::new(client, config.request_timeout()));

    // The API path being called stands in for "where the user was"
    let location = match &cli.command {
        Command::Request { path, .. } => Some(path.clone()),
        _ => None,
    };
    let login_route = config.session.login_route.clone();
    let invalidator = Arc::new(
        ClearSession::new(store.clone(), config.session.login_route.clone())
            .with_location(move || location.clone())
            .on_logout(move || warn!(%login_route, "session ended, log in again")),
    );

    info!(
        base_url = %config.api.base_url,
        credentials = %store.path().display(),
        refresh_timeout_secs = ?config.auth.refresh_timeout_secs,
        "session ready"
    );
    let session = Session::new(
        store,
        transport,
        config.endpoints(),
        invalidator,
        config.refresh_timeout(),
    );

    match cli.command {
        Command::Login { username } => {
            let password = config
                .auth
                .password
                .as_ref()
                .context("SESSION_PASSWORD must be set to log in")?;
            let redirect = session.login(&username, password).await?;
            println!("logged in as {username}");
            if let Some(location) = redirect {
                println!("resume at {location}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Logout => {
            match session.logout().await? {
                LogoutOutcome::Revoked => println!("logged out"),
                LogoutOutcome::LocalOnly => println!("logged out (local credentials cleared)"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&session.status())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Request { method, path, body } => {
            let mut request = HttpRequest::new(method, config.api_url(&path));
            if let Some(body) = &body {
                request = request.json(body)?;
            }

            match session.executor().execute(request).await {
                Ok(response) => {
                    println!("{}", response.status);
                    println!("{}", response.text());
                    if response.is_success() {
                        Ok(ExitCode::SUCCESS)
                    } else {
                        Ok(ExitCode::from(REQUEST_FAILED))
                    }
                }
                Err(e) if e.is_session_level() => {
                    eprintln!("session expired ({e}); run `session-client login <username>`");
                    Ok(ExitCode::from(SESSION_EXPIRED))
                }
                Err(e) => Err(e.into()),
            }
        }
    }
}
