//! Command-line arguments
//!
//! `session-client [--config PATH] <command>`

use clap::{Parser, Subcommand};
use transport::Method;

#[derive(Debug, Parser)]
#[command(
    name = "session-client",
    about = "Authenticated API session client",
    version
)]
pub struct Cli {
    /// Config file (falls back to CONFIG_PATH, then session-client.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, PartialEq, Subcommand)]
pub enum Command {
    /// Sign in; the password is read from SESSION_PASSWORD
    Login { username: String },
    /// Revoke the refresh credential and clear the session
    Logout,
    /// Show stored credentials and their expiry
    Status,
    /// Perform an authenticated API call
    Request {
        /// HTTP method, case-insensitive
        #[arg(value_parser = parse_method)]
        method: Method,
        /// API path, joined onto the configured base URL
        path: String,
        /// JSON request body
        #[arg(value_parser = parse_json)]
        body: Option<serde_json::Value>,
    },
}

fn parse_method(raw: &str) -> Result<Method, String> {
    Method::from_bytes(raw.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method: {raw}"))
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("request body is not valid JSON: {e}"))
}
