//! Unverified token claim inspection
//!
//! Reads the `exp` claim from a JWT payload without checking the signature.
//! Only used for local decisions that don't need the server's verdict
//! (skipping a pointless logout call, status reporting). Request execution
//! never consults this: expiry of the access credential is discovered from
//! the server's 401.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

#[derive(Deserialize)]
struct Claims {
    exp: Option<u64>,
}

/// Expiry of `token` as unix seconds, if it is a JWT carrying `exp`.
pub fn expires_at(token: &str) -> Option<u64> {
    let mut parts = token.split('.');
    let (_header, payload, _signature) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    // Some issuers pad the segments; the URL-safe engine here does not accept it
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&decoded).ok()?;
    claims.exp
}

/// Whether `token` is expired at `now` (unix seconds).
///
/// Tokens that can't be decoded, or carry no `exp`, count as expired.
pub fn is_expired(token: &str, now: u64) -> bool {
    match expires_at(token) {
        Some(exp) => exp <= now,
        None => true,
    }
}

/// Current unix time in seconds.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
