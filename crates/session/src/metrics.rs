//! Session metrics
//!
//! - `session_refresh_total` (counter): labels `trigger`, `outcome`
//! - `session_logout_total` (counter): label `reason`
//!
//! Without an installed recorder these calls are no-ops.

/// Record a refresh attempt and its outcome.
pub fn record_refresh(trigger: &'static str, outcome: &'static str) {
    metrics::counter!("session_refresh_total", "trigger" => trigger, "outcome" => outcome)
        .increment(1);
}

/// Record a session being cleared.
pub fn record_logout(reason: &'static str) {
    metrics::counter!("session_logout_total", "reason" => reason).increment(1);
}
