//! Metrics definitions for the console client.
//!
//! All metrics follow Prometheus naming conventions:
//! - `console_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP verbs used by the client (5 values)
//! - `status_class`: `2xx`, `3xx`, `4xx`, `5xx`, `error`
//! - `error_kind`: `none` or one of the `ApiError::kind` values (10 values)
//! - `outcome`: `success`, `failure`, `discarded`
//! - `cause`: `unauthorized`, `restore`
//! - `reason`: `logout`, `expired`

use metrics::{counter, histogram};
use std::time::Duration;

/// Record one dispatched request.
///
/// `error_kind` is `None` for a 2xx response and the classified error
/// otherwise.
///
/// Metric: `console_client_requests_total`, `console_client_request_duration_seconds`
/// Labels: `method`, `status_class`, `error_kind`
pub fn record_request(
    method: &str,
    status: Option<u16>,
    error_kind: Option<&'static str>,
    duration: Duration,
) {
    let status_class = match status {
        Some(code @ 100..=599) => format!("{}xx", code / 100),
        _ => "error".to_string(),
    };

    histogram!("console_client_request_duration_seconds", "method" => method.to_string())
        .record(duration.as_secs_f64());

    counter!(
        "console_client_requests_total",
        "method" => method.to_string(),
        "status_class" => status_class,
        "error_kind" => error_kind.unwrap_or("none")
    )
    .increment(1);
}

/// Record a refresh call.
///
/// Metric: `console_token_refresh_total`, `console_token_refresh_duration_seconds`
/// Labels: `outcome`, `cause`
pub fn record_token_refresh(outcome: &str, cause: &str, duration: Duration) {
    histogram!("console_token_refresh_duration_seconds", "cause" => cause.to_string())
        .record(duration.as_secs_f64());

    counter!("console_token_refresh_total", "outcome" => outcome.to_string(), "cause" => cause.to_string())
        .increment(1);
}

/// Record how many requests were parked behind one refresh.
///
/// Metric: `console_refresh_waiters`
#[allow(clippy::cast_precision_loss)]
pub fn record_refresh_waiters(count: usize) {
    histogram!("console_refresh_waiters").record(count as f64);
}

/// Record a session ending.
///
/// Metric: `console_session_invalidations_total`
/// Labels: `reason`
pub fn record_session_invalidation(reason: &str) {
    counter!("console_session_invalidations_total", "reason" => reason.to_string()).increment(1);
}
