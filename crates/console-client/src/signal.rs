//! The "session invalidated" channel.
//!
//! The client writes one [`Unauthorized`] per failed refresh; the session
//! side reads them. One message is sent per refresh failure no matter how
//! many requests were queued behind it.

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::debug;

/// A refresh failed and the session can no longer be trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unauthorized {
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Sending half, held by the client.
#[derive(Debug, Clone)]
pub struct UnauthorizedNotifier(mpsc::UnboundedSender<Unauthorized>);

/// Receiving half, consumed by the session.
#[derive(Debug)]
pub struct UnauthorizedEvents(mpsc::UnboundedReceiver<Unauthorized>);

/// Create a connected notifier/events pair.
#[must_use]
pub fn unauthorized_channel() -> (UnauthorizedNotifier, UnauthorizedEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (UnauthorizedNotifier(tx), UnauthorizedEvents(rx))
}

impl UnauthorizedNotifier {
    /// Raise the signal. A closed receiver is not an error: nobody is
    /// listening, so there is nobody to tell.
    pub fn notify(&self, reason: impl Into<String>) {
        let signal = Unauthorized {
            reason: reason.into(),
            at: Utc::now(),
        };
        if self.0.send(signal).is_err() {
            debug!(
                target: "console.session",
                "Unauthorized signal dropped, no listener"
            );
        }
    }
}

impl UnauthorizedEvents {
    /// Wait for the next signal. `None` once every notifier is gone.
    pub async fn recv(&mut self) -> Option<Unauthorized> {
        self.0.recv().await
    }

    /// Take a pending signal without waiting.
    pub fn try_recv(&mut self) -> Option<Unauthorized> {
        self.0.try_recv().ok()
    }
}
