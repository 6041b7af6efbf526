//! In-memory credential storage.
//!
//! Holds at most one [`Credential`]. The store is memory-only: nothing here
//! ever touches disk, so the credential dies with the process and a fresh
//! process has to go through the refresh protocol to get one back.

use crate::models::AuthResponse;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::secret::SecretString;
use std::sync::{PoisonError, RwLock};

/// The access credential and its lifecycle data.
#[derive(Clone)]
pub struct Credential {
    pub access_token: SecretString,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_token: Option<SecretString>,
}

impl Credential {
    #[must_use]
    pub fn new(access_token: SecretString) -> Self {
        Self {
            access_token,
            expires_at: None,
            refresh_token: None,
        }
    }

    /// Build a credential from a `/token` or `/refresh` response received at `now`.
    #[must_use]
    pub fn from_response(response: &AuthResponse, now: DateTime<Utc>) -> Self {
        let expires_at = response
            .access_token_expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(ChronoDuration::try_seconds)
            .map(|lifetime| now + lifetime);

        Self {
            access_token: response.access_token.clone(),
            expires_at,
            refresh_token: response.refresh_token.clone(),
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Single-slot credential store. Last write wins.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<Credential>>,
}

impl TokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored credential. `None` clears it.
    pub fn set(&self, credential: Option<Credential>) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = credential;
    }

    #[must_use]
    pub fn get(&self) -> Option<Credential> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<SecretString> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    /// The current refresh token, if the server issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(|c| c.refresh_token.clone())
    }

    pub fn clear(&self) {
        self.set(None);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
