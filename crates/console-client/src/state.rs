//! Observable session state.
//!
//! The state lives in a `tokio::sync::watch` channel so UI code can await
//! transitions (`SessionState::subscribe`) while the client and
//! [`AuthSession`](crate::session::AuthSession) drive them.
//!
//! Every authoritative transition (login, invalidation) bumps an epoch. A
//! refresh records the epoch it started under and may only write its result
//! back if the epoch is unchanged, so a refresh that finishes after logout
//! cannot resurrect the session.

use crate::token_store::{Credential, TokenStore};
use std::sync::Arc;
use tokio::sync::watch;

/// Where the client believes authentication stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Unauthenticated,
    Authenticated,
    /// Transient; only entered by the client's refresh protocol.
    Refreshing,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Unauthenticated => "unauthenticated",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Refreshing => "refreshing",
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Staff member logged out.
    Logout,
    /// Refresh failed or the server rejected the session.
    Expired,
}

/// Snapshot of the session. Never holds the raw token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    status: SessionStatus,
    role: Option<String>,
    ended: Option<EndReason>,
    epoch: u64,
}

impl Session {
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status != SessionStatus::Unauthenticated
    }

    /// True when the session was forcibly ended and the user must be sent
    /// back to the login surface.
    #[must_use]
    pub fn login_required(&self) -> bool {
        self.status == SessionStatus::Unauthenticated && self.ended == Some(EndReason::Expired)
    }

    #[must_use]
    pub fn ended(&self) -> Option<EndReason> {
        self.ended
    }
}

fn end_session(s: &mut Session, reason: EndReason, tokens: &TokenStore) -> bool {
    tokens.clear();
    s.epoch += 1;
    let was_authenticated = s.status != SessionStatus::Unauthenticated;
    if was_authenticated || s.role.is_some() {
        s.status = SessionStatus::Unauthenticated;
        s.role = None;
        s.ended = Some(reason);
    }
    was_authenticated
}

/// Shared handle to the session value. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionState {
    tx: Arc<watch::Sender<Session>>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Start Unauthenticated.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Session {
            status: SessionStatus::Unauthenticated,
            role: None,
            ended: None,
            epoch: 0,
        });
        Self { tx: Arc::new(tx) }
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.tx.borrow().status
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.tx.subscribe()
    }

    /// Login: any → Authenticated with `role`, storing `credential`.
    /// Starts a new epoch.
    pub fn authenticate(&self, role: &str, tokens: &TokenStore, credential: Credential) {
        self.tx.send_modify(|s| {
            tokens.set(Some(credential));
            s.status = SessionStatus::Authenticated;
            s.role = Some(role.to_string());
            s.ended = None;
            s.epoch += 1;
        });
    }

    /// Authenticated → Refreshing. Returns the epoch the refresh runs under.
    ///
    /// From any other status the status is left alone; the epoch is still
    /// returned so a startup restore can complete under it.
    pub fn begin_refresh(&self) -> u64 {
        let mut epoch = 0;
        self.tx.send_if_modified(|s| {
            epoch = s.epoch;
            if s.status == SessionStatus::Authenticated {
                s.status = SessionStatus::Refreshing;
                true
            } else {
                false
            }
        });
        epoch
    }

    /// Refresh succeeded: store `credential` and move to Authenticated with
    /// the refreshed role, only if the session was not invalidated since
    /// `epoch`. Returns whether the result was accepted.
    ///
    /// The credential write happens under the same update as the epoch
    /// check, so a concurrent logout either wins entirely or not at all.
    pub fn finish_refresh(
        &self,
        epoch: u64,
        role: &str,
        tokens: &TokenStore,
        credential: Credential,
    ) -> bool {
        let mut accepted = false;
        self.tx.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            accepted = true;
            tokens.set(Some(credential));
            s.status = SessionStatus::Authenticated;
            s.role = Some(role.to_string());
            s.ended = None;
            true
        });
        accepted
    }

    /// The refresh leader went away without an outcome: Refreshing →
    /// Authenticated under the same epoch, keeping the old credential.
    pub fn abandon_refresh(&self, epoch: u64) {
        self.tx.send_if_modified(|s| {
            if s.epoch == epoch && s.status == SessionStatus::Refreshing {
                s.status = SessionStatus::Authenticated;
                true
            } else {
                false
            }
        });
    }

    /// Any → Unauthenticated. Clears the credential and role and starts a
    /// new epoch.
    ///
    /// Returns `true` if the session was authenticated (or refreshing) before.
    pub fn invalidate(&self, reason: EndReason, tokens: &TokenStore) -> bool {
        let mut was_authenticated = false;
        self.tx.send_if_modified(|s| {
            was_authenticated = end_session(s, reason, tokens);
            was_authenticated
        });
        was_authenticated
    }

    /// Like [`invalidate`](Self::invalidate), but only if nothing
    /// authoritative happened since `epoch`. A refresh that failed after
    /// the staff member logged in again must not end the new session.
    ///
    /// Returns `true` if this call ended the session.
    pub fn invalidate_if_current(&self, epoch: u64, reason: EndReason, tokens: &TokenStore) -> bool {
        let mut ended = false;
        self.tx.send_if_modified(|s| {
            if s.epoch != epoch {
                return false;
            }
            ended = end_session(s, reason, tokens);
            ended
        });
        ended
    }
}
