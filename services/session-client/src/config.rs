//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The login password is read from the SESSION_PASSWORD env var and never
//! stored in the TOML.

use common::Secret;
use serde::Deserialize;
use session_auth::{AuthEndpoints, DEFAULT_LOGIN_PATH, DEFAULT_LOGOUT_PATH, DEFAULT_REFRESH_PATH};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "session-client.toml";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Authentication server endpoints and refresh policy
#[derive(Debug, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// Upper bound on one refresh exchange. Unset means wait indefinitely.
    #[serde(default)]
    pub refresh_timeout_secs: Option<u64>,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            refresh_path: default_refresh_path(),
            login_path: default_login_path(),
            logout_path: default_logout_path(),
            refresh_timeout_secs: None,
            password: None,
        }
    }
}

/// Where credentials are persisted between invocations
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_credentials_path")]
    pub credentials_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            credentials_path: default_credentials_path(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_login_route")]
    pub login_route: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            login_route: default_login_route(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_login_path() -> String {
    DEFAULT_LOGIN_PATH.to_string()
}

fn default_logout_path() -> String {
    DEFAULT_LOGOUT_PATH.to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("session-credentials.json")
}

fn default_login_route() -> String {
    String::from("/login")
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.api.base_url.starts_with("http://")
            && !config.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.api.base_url
            )));
        }

        if config.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if config.auth.refresh_timeout_secs == Some(0) {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0 when set".into(),
            ));
        }

        if let Ok(password) = std::env::var("SESSION_PASSWORD")
            && !password.is_empty()
        {
            config.auth.password = Some(Secret::new(password));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    pub fn endpoints(&self) -> AuthEndpoints {
        AuthEndpoints::with_paths(
            &self.api.base_url,
            &self.auth.refresh_path,
            &self.auth.login_path,
            &self.auth.logout_path,
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn refresh_timeout(&self) -> Option<Duration> {
        self.auth.refresh_timeout_secs.map(Duration::from_secs)
    }

    /// Absolute URL for an API path.
    pub fn api_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("session-client.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    const MINIMAL: &str = r#"
[api]
base_url = "http://127.0.0.1:8000"
"#;

    #[test]
    fn test_load_minimal_config_fills_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, MINIMAL);
        unsafe { remove_env("SESSION_PASSWORD") };

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.auth.refresh_path, "/auth/token/refresh/");
        assert_eq!(config.auth.login_path, "/auth/login/");
        assert_eq!(config.auth.logout_path, "/auth/logout/");
        assert!(config.refresh_timeout().is_none());
        assert_eq!(
            config.storage.credentials_path,
            PathBuf::from("session-credentials.json")
        );
        assert_eq!(config.session.login_route, "/login");
        assert!(config.auth.password.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[api]
base_url = "https://api.example.org/"
timeout_secs = 5

[auth]
refresh_path = "/token/refresh"
refresh_timeout_secs = 10

[storage]
credentials_path = "/var/lib/session/creds.json"

[session]
login_route = "/signin"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.refresh_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.session.login_route, "/signin");

        let endpoints = config.endpoints();
        assert_eq!(endpoints.refresh_url, "https://api.example.org/token/refresh");
        assert_eq!(endpoints.login_url, "https://api.example.org/auth/login/");
        assert_eq!(
            config.api_url("/api/LLM/rag/"),
            "https://api.example.org/api/LLM/rag/"
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(matches!(result, Err(common::Error::Io(_))));
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(matches!(Config::load(&path), Err(common::Error::Toml(_))));
    }

    #[test]
    fn test_missing_api_section_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[session]\nlogin_route = \"/login\"\n");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "[api]\nbase_url = \"api.example.org\"\n");

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();

        let path = write_config(
            &dir,
            "[api]\nbase_url = \"http://localhost\"\ntimeout_secs = 0\n",
        );
        assert!(Config::load(&path).is_err(), "timeout_secs = 0 must be rejected");

        let path = write_config(
            &dir,
            "[api]\nbase_url = \"http://localhost\"\n[auth]\nrefresh_timeout_secs = 0\n",
        );
        assert!(
            Config::load(&path).is_err(),
            "refresh_timeout_secs = 0 must be rejected"
        );
    }

    #[test]
    fn test_password_from_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, MINIMAL);

        unsafe { set_env("SESSION_PASSWORD", "hunter2") };
        let config = Config::load(&path).unwrap();
        assert_eq!(config.auth.password.as_ref().unwrap().expose(), "hunter2");
        unsafe { remove_env("SESSION_PASSWORD") };
    }

    #[test]
    fn test_password_in_toml_is_ignored() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            "[api]\nbase_url = \"http://localhost\"\n[auth]\npassword = \"leaked\"\n",
        );
        unsafe { remove_env("SESSION_PASSWORD") };

        let config = Config::load(&path).unwrap();
        assert!(config.auth.password.is_none());
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
