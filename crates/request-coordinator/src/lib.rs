//! Authenticated request coordination
//!
//! Wraps outbound API calls with the current access credential and keeps them
//! correct when that credential expires while several calls are in flight.
//! The credential store stays the single source of truth; this crate reads it
//! at the moment of use and only the refresh coordinator writes it.
//!
//! Call lifecycle:
//! 1. `AuthenticatedExecutor::execute` attaches the stored access credential
//! 2. Server answers 401 → `RefreshCoordinator::acquire_refreshed_credential`
//! 3. The first caller performs the refresh exchange, later callers queue
//! 4. Everyone replays once with the broadcast credential
//! 5. Refresh failure → `SessionInvalidator::invalidate` exactly once, every
//!    caller sees `SessionExpired`

pub mod coordinator;
pub mod error;
pub mod executor;
pub mod invalidator;
pub mod metrics;
pub mod session;

#[cfg(test)]
mod test_support;

pub use coordinator::RefreshCoordinator;
pub use error::{Error, Result};
pub use executor::AuthenticatedExecutor;
pub use invalidator::{ClearSession, SessionInvalidator};
pub use session::{LogoutOutcome, Session, SessionStatus};
