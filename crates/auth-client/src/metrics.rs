//! Session metrics
//!
//! - `session_refresh_total` (counter): label `outcome`
//! - `session_refresh_queued_total` (counter): requests parked behind an in-flight refresh
//! - `session_request_retries_total` (counter): requests replayed with a refreshed token
//! - `session_sign_out_total` (counter): label `reason`

/// Record a finished refresh cycle (`success` or a `RefreshError` label).
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request queued behind an in-flight refresh.
pub fn record_queued() {
    metrics::counter!("session_refresh_queued_total").increment(1);
}

/// Record a request replayed after a refresh.
pub fn record_retry() {
    metrics::counter!("session_request_retries_total").increment(1);
}

/// Record a forced or explicit sign-out.
pub fn record_sign_out(reason: &'static str) {
    metrics::counter!("session_sign_out_total", "reason" => reason).increment(1);
}
