//! Session lifecycle: login, logout, startup restore, and the reaction to
//! the unauthorized signal.
//!
//! [`AuthSession`] drives the authoritative transitions. The transient
//! Refreshing state belongs to [`AuthenticatedClient`]'s refresh protocol.

use crate::client::{AuthenticatedClient, RefreshCause};
use crate::config::ClientConfig;
use crate::context::ApiRequest;
use crate::cookies::CookieJar;
use crate::errors::ApiError;
use crate::models::AuthResponse;
use crate::observability::metrics;
use crate::prefs::{PrefsStore, SessionPrefs};
use crate::signal::{Unauthorized, UnauthorizedEvents};
use crate::state::{EndReason, Session};
use crate::token_store::Credential;
use chrono::Utc;
use common::secret::{ExposeSecret, SecretString};
use common::types::ProcessId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub const TOKEN_PATH: &str = "/token";
pub const LOGOUT_PATH: &str = "/logout";

#[derive(Debug)]
pub struct AuthSession {
    client: Arc<AuthenticatedClient>,
    prefs: PrefsStore,
}

impl AuthSession {
    #[must_use]
    pub fn new(client: Arc<AuthenticatedClient>, prefs: PrefsStore) -> Self {
        Self { client, prefs }
    }

    /// Build the client and session from configuration.
    ///
    /// The process id is taken from the stored prefs when present and
    /// generated (and stored) otherwise, so it survives restarts. The refresh
    /// cookie jar is loaded from next to the prefs file. Unreadable prefs or
    /// cookies are logged and treated as empty.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidRequest` if the HTTP client cannot be built.
    pub async fn connect(config: &ClientConfig) -> Result<(Self, UnauthorizedEvents), ApiError> {
        let prefs = PrefsStore::new(config.prefs_path.clone());
        let stored = prefs.load().await.unwrap_or_else(|e| {
            warn!(target: "console.session", error = %e, "Ignoring unreadable preferences");
            SessionPrefs::default()
        });

        let process_id = match stored.process_id {
            Some(id) => id,
            None => {
                let id = ProcessId::new();
                let fresh = SessionPrefs {
                    role: stored.role.clone(),
                    process_id: Some(id),
                };
                if let Err(e) = prefs.save(&fresh).await {
                    warn!(target: "console.session", error = %e, "Failed to persist process id");
                }
                id
            }
        };

        let cookies = CookieJar::new(config.cookie_jar_path());
        if let Err(e) = cookies.load().await {
            warn!(target: "console.session", error = %e, "Ignoring unreadable cookie jar");
        }

        info!(
            target: "console.session",
            prefs = ?prefs.path(),
            cookie_jar = ?cookies.path(),
            stored_role = stored.role.as_deref().unwrap_or_default(),
            "Session storage opened"
        );

        let (client, events) = AuthenticatedClient::with_cookie_jar(config, process_id, cookies)?;
        Ok((Self::new(client, prefs), events))
    }

    #[must_use]
    pub fn client(&self) -> &Arc<AuthenticatedClient> {
        &self.client
    }

    #[must_use]
    pub fn prefs(&self) -> &PrefsStore {
        &self.prefs
    }

    #[must_use]
    pub fn current(&self) -> Session {
        self.client.session().snapshot()
    }

    /// Watch session transitions. A value that is Unauthenticated with
    /// [`Session::login_required`] set means the user must log in again.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.client.session().subscribe()
    }

    /// Exchange staff credentials for a session.
    ///
    /// # Errors
    ///
    /// Returns the `/token` error (`Unauthorized` for bad credentials). The
    /// session is left as it was.
    #[instrument(skip_all, name = "console.session.login")]
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<Session, ApiError> {
        let request = ApiRequest::post(TOKEN_PATH).form(vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.expose_secret().to_string()),
        ]);

        let response: AuthResponse = self.client.send_json(&request).await.map_err(|e| {
            warn!(target: "console.session", error = %e, "Login failed");
            e
        })?;

        self.establish(&response).await;
        Ok(self.current())
    }

    /// Install a login response: store the credential, record the role,
    /// persist the non-secret prefs and save the refresh cookie.
    pub async fn establish(&self, response: &AuthResponse) {
        let credential = Credential::from_response(response, Utc::now());
        self.client
            .session()
            .authenticate(&response.role, self.client.tokens(), credential);

        info!(target: "console.session", role = %response.role, "Session established");
        self.persist(Some(response.role.clone())).await;
        if let Err(e) = self.client.cookies().save().await {
            warn!(target: "console.session", error = %e, "Failed to save cookie jar");
        }
    }

    /// End the session.
    ///
    /// `/logout` is best effort: a failure is logged and the local session is
    /// cleared anyway. Calling this when already logged out is harmless.
    #[instrument(skip_all, name = "console.session.logout")]
    pub async fn logout(&self) {
        if let Err(e) = self.client.send_empty(&ApiRequest::post(LOGOUT_PATH)).await {
            warn!(target: "console.session", error = %e, "Logout request failed, clearing local session");
        }

        if self
            .client
            .session()
            .invalidate(EndReason::Logout, self.client.tokens())
        {
            metrics::record_session_invalidation("logout");
            info!(target: "console.session", "Logged out");
        } else {
            debug!(target: "console.session", "Logout with no active session");
        }

        self.forget().await;
    }

    /// Try to resume a session from the refresh cookie, which survives a
    /// restart in the saved cookie jar. Exactly one refresh call is made; on
    /// failure the session stays Unauthenticated and no unauthorized signal
    /// is raised. The cookie is kept, since the failure may be transient.
    #[instrument(skip_all, name = "console.session.restore")]
    pub async fn restore(&self) -> Session {
        let remembered = self.prefs.load().await.ok().and_then(|p| p.role);

        match self.client.refresh_credential(RefreshCause::Restore).await {
            Ok(()) => {
                let session = self.current();
                info!(
                    target: "console.session",
                    role = session.role().unwrap_or_default(),
                    "Session restored"
                );
                self.persist(session.role().map(str::to_string)).await;
                session
            }
            Err(e) => {
                info!(
                    target: "console.session",
                    error = %e,
                    had_role = remembered.is_some(),
                    "No session to restore"
                );
                if remembered.is_some() {
                    self.persist(None).await;
                }
                self.current()
            }
        }
    }

    /// React to a failed refresh.
    ///
    /// The client has already ended the session; this clears what was
    /// persisted. If the staff member logged in again before the signal was
    /// handled, the new session is left alone.
    pub async fn handle_unauthorized(&self, signal: &Unauthorized) {
        if self.current().is_authenticated() {
            debug!(
                target: "console.session",
                "Session re-established before unauthorized signal was handled"
            );
            return;
        }

        warn!(
            target: "console.session",
            reason = %signal.reason,
            at = %signal.at,
            "Session expired, login required"
        );
        self.forget().await;
    }

    /// Consume the unauthorized channel until `shutdown` fires or the
    /// channel closes.
    pub fn spawn_signal_listener(
        self: &Arc<Self>,
        mut events: UnauthorizedEvents,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            debug!(target: "console.session", "Unauthorized signal listener started");
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        debug!(target: "console.session", "Unauthorized signal listener received shutdown");
                        break;
                    }
                    signal = events.recv() => match signal {
                        Some(signal) => session.handle_unauthorized(&signal).await,
                        None => break,
                    },
                }
            }
            debug!(target: "console.session", "Unauthorized signal listener stopped");
        })
    }

    async fn persist(&self, role: Option<String>) {
        let prefs = SessionPrefs {
            role,
            process_id: Some(self.client.process_id()),
        };
        if let Err(e) = self.prefs.save(&prefs).await {
            warn!(target: "console.session", error = %e, "Failed to persist session preferences");
        }
    }

    /// Forget the role and the refresh cookie. The process id is kept.
    async fn forget(&self) {
        self.persist(None).await;
        if let Err(e) = self.client.cookies().clear().await {
            warn!(target: "console.session", error = %e, "Failed to clear cookie jar");
        }
    }
}
