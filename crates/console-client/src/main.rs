//! Console client operator binary.
//!
//! Resumes (or opens) a staff session, looks up one account and prints it
//! as JSON, then logs out. With `CONSOLE_KEEP_SESSION` set the session is
//! left open, and the refresh cookie saved next to `CONSOLE_PREFS_PATH`
//! lets the next run resume it without credentials.
//!
//! ```text
//! CONSOLE_API_URL=http://localhost:8000 \
//! CONSOLE_USERNAME=teller01 CONSOLE_PASSWORD=... \
//!     console-client ACC1001
//! ```

use anyhow::{bail, Context};
use common::secret::SecretString;
use console_client::observability::init_tracing;
use console_client::{AccountsApi, AuthSession, ClientConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ClientConfig::from_env().context("Failed to load configuration")?;
    init_tracing(config.json_logs);

    info!(api_url = %config.api_url, "Starting console client");

    let Some(account_id) = std::env::args().nth(1) else {
        bail!("usage: console-client <account-id>");
    };

    let (session, events) = AuthSession::connect(&config).await?;
    let session = Arc::new(session);
    let shutdown = CancellationToken::new();
    let listener = session.spawn_signal_listener(events, shutdown.clone());

    let result = run(&session, &account_id).await;

    if config.keep_session {
        info!("Keeping session for the next run");
    } else {
        session.logout().await;
    }
    shutdown.cancel();
    if let Err(e) = listener.await {
        error!(error = %e, "Signal listener task failed");
    }

    result
}

async fn run(session: &AuthSession, account_id: &str) -> anyhow::Result<()> {
    if !session.restore().await.is_authenticated() {
        let username =
            std::env::var("CONSOLE_USERNAME").context("No session to restore and CONSOLE_USERNAME is not set")?;
        let password = SecretString::from(
            std::env::var("CONSOLE_PASSWORD").context("CONSOLE_PASSWORD is not set")?,
        );
        let current = session.login(&username, &password).await?;
        info!(role = current.role().unwrap_or_default(), "Logged in");
    }

    let accounts = AccountsApi::new(Arc::clone(session.client()));
    let account = accounts.get(account_id).await?;
    println!("{}", serde_json::to_string_pretty(&account)?);

    Ok(())
}
