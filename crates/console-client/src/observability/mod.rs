//! Observability for the console client.
//!
//! # Privacy by Default
//!
//! Instrumented functions use `#[instrument(skip_all)]` and allow-list their
//! fields. Fields fall into two groups:
//! - **SAFE**: method, path, status, request id, process id, role
//! - **NEVER**: passwords, access tokens, refresh tokens, raw error bodies

pub mod metrics;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "console_client=info,console=info";

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(json_logs: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
