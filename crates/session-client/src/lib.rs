//! Authenticated request pipeline for the MrDoc API
//!
//! Wraps a `Transport` so every request carries the current bearer token,
//! and recovers from an expired access token without the caller noticing.
//! Concurrent 401s collapse into one refresh call; the requests that hit
//! them are replayed once with the new token.
//!
//! Request lifecycle:
//! 1. `RequestAuthenticator` stamps `API-Version` and `Authorization`
//! 2. The transport sends it; anything but a 401 goes back to the caller
//! 3. On a 401 the `RefreshCoordinator` starts or joins the refresh episode
//! 4. `Replayer` re-sends the request once with the refreshed token
//! 5. A failed refresh runs the `SessionHook` and rejects every waiter

pub mod authenticator;
pub mod client;
pub mod coordinator;
pub mod error;
mod metrics;
pub mod replay;
#[cfg(test)]
mod testing;

pub use authenticator::RequestAuthenticator;
pub use client::{ApiClient, ApiClientBuilder};
pub use coordinator::{DEFAULT_MAX_WAITERS, DEFAULT_REFRESH_TIMEOUT, RefreshCoordinator, RefreshSettings};
pub use error::{Error, Result};
pub use replay::{Replayer, RequestAttempt};
