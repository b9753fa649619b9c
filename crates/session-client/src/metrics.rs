//! Auth pipeline counters
//!
//! - `auth_refresh_total` (counter): label `outcome` = success | failure | abandoned
//! - `auth_replay_total` (counter): label `outcome` = success | exhausted | transport_error
//! - `auth_logout_total` (counter): label `reason` = refresh_failed | refresh_token_missing | user_logout
//!
//! Without an installed recorder these are no-ops.

pub(crate) fn record_refresh(outcome: &'static str) {
    metrics::counter!("auth_refresh_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_replay(outcome: &'static str) {
    metrics::counter!("auth_replay_total", "outcome" => outcome).increment(1);
}

pub(crate) fn record_logout(reason: &'static str) {
    metrics::counter!("auth_logout_total", "reason" => reason).increment(1);
}
