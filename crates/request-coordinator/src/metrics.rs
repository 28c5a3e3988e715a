//! Refresh and invalidation counters
//!
//! - `session_refresh_attempts_total` (counter): label `outcome`
//! - `session_invalidations_total` (counter): label `reason`
//!
//! Without an installed recorder these are no-ops.

/// Record the outcome of one refresh episode as seen by its leader.
pub fn record_refresh(outcome: &str) {
    metrics::counter!("session_refresh_attempts_total", "outcome" => outcome.to_string())
        .increment(1);
}

/// Record a session invalidation with its cause.
pub fn record_invalidation(reason: &str) {
    metrics::counter!("session_invalidations_total", "reason" => reason.to_string())
        .increment(1);
}
