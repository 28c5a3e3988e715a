//! Session credential library
//!
//! Provides the credential store, the authentication server wire contract
//! (refresh, login, logout) and unverified token-claim inspection. This crate
//! knows nothing about request coordination; it is used by the coordinator
//! and by the client binary independently.
//!
//! Credential flow:
//! 1. Client calls `token::login()` and stores both credentials
//! 2. Requests read `ACCESS_KEY` from the `CredentialStore` at the moment of use
//! 3. On a 401 the coordinator calls `token::refresh_access()` with `REFRESH_KEY`
//! 4. `token::logout()` blacklists the refresh credential server-side

pub mod claims;
pub mod constants;
pub mod credentials;
pub mod error;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{Error, Result};
pub use token::{AuthEndpoints, RefreshResponse, TokenPair, login, logout, refresh_access};
