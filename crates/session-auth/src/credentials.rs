//! Credential storage for session tokens
//!
//! The store is a synchronous, process-local key-value surface with fixed
//! names (`access`, `refresh`, ...). It is the single source of truth for
//! credentials: callers read it at the moment of use and never keep their own
//! copy across calls.
//!
//! `FileCredentialStore` persists a JSON object with atomic temp-file + rename
//! writes. The surface is infallible, so persist failures are logged and the
//! in-memory value still wins for the rest of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Key-value store for session credentials.
pub trait CredentialStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&self, name: &str, value: &str);
    fn remove(&self, name: &str);
}

/// In-memory store. Lost on exit.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with the given entries.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let state = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        self.lock().insert(name.to_string(), value.to_string());
    }

    fn remove(&self, name: &str) {
        self.lock().remove(name);
    }
}

/// JSON-file-backed store.
///
/// The Mutex serializes writes so concurrent mutations never interleave on
/// disk. Reads only touch the in-memory map.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path.
    ///
    /// If the file doesn't exist, creates it as `{}` (logged-out cold start).
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| Error::Storage(format!("reading credential file: {e}")))?;
            let entries: HashMap<String, String> = serde_json::from_str(&contents)
                .map_err(|e| Error::Storage(format!("parsing credential file: {e}")))?;
            info!(path = %path.display(), keys = entries.len(), "loaded credential file");
            entries
        } else {
            info!(path = %path.display(), "credential file not found, starting logged out");
            let entries = HashMap::new();
            write_atomic(&path, &entries)
                .map_err(|e| Error::Storage(format!("creating credential file: {e}")))?;
            entries
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &HashMap<String, String>) {
        if let Err(e) = write_atomic(&self.path, state) {
            warn!(path = %self.path.display(), error = %e, "failed to persist credentials");
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) {
        let mut state = self.lock();
        state.insert(name.to_string(), value.to_string());
        debug!(key = name, "stored credential");
        self.persist(&state);
    }

    fn remove(&self, name: &str) {
        let mut state = self.lock();
        if state.remove(name).is_some() {
            debug!(key = name, "removed credential");
            self.persist(&state);
        }
    }
}

/// Write the map atomically with 0600 permissions on unix.
fn write_atomic(path: &Path, data: &HashMap<String, String>) -> std::io::Result<()> {
    let json = serde_json::to_string_pretty(data)?;

    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "credential path has no parent directory",
        )
    })?;
    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    std::fs::write(&tmp_path, json.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }

    std::fs::rename(&tmp_path, path)?;
    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
