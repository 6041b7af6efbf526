//! Authenticated HTTP client for the console API.
//!
//! Every request goes out with the current access token, a fresh request id
//! and the process id. A 401 on a first attempt hands the request to the
//! refresh protocol:
//!
//! 1. If the token was replaced while the request was in flight, the 401 is
//!    stale and the request is replayed with the current token.
//! 2. Otherwise the request joins the [`RefreshGate`]. The first joiner calls
//!    `/refresh`; everyone else parks on the pending queue.
//! 3. On success the new credential is stored, the session goes back to
//!    Authenticated, the queue is resumed in order and every request is
//!    replayed once.
//! 4. On failure the session ends, the queue is rejected and one
//!    [`Unauthorized`](crate::signal::Unauthorized) signal is raised.
//!
//! A replay that gets another 401 fails with that error; it never starts a
//! second refresh. Requests to the auth endpoints never start one either.

use crate::config::ClientConfig;
use crate::context::{
    ApiRequest, Attempt, RequestBody, RequestContext, HEADER_PROCESS_ID, HEADER_REQUEST_ID,
};
use crate::cookies::CookieJar;
use crate::errors::ApiError;
use crate::models::AuthResponse;
use crate::observability::metrics;
use crate::refresh::{Join, RefreshGate, RefreshLease, RefreshOutcome};
use crate::signal::{unauthorized_channel, UnauthorizedEvents, UnauthorizedNotifier};
use crate::state::{EndReason, SessionState, SessionStatus};
use crate::token_store::{Credential, TokenStore};
use chrono::Utc;
use common::secret::{bearer_value, same_secret, ExposeSecret, SecretString};
use common::types::ProcessId;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

pub const REFRESH_PATH: &str = "/refresh";

/// Why a refresh was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshCause {
    /// A request came back 401.
    Unauthorized,
    /// Startup restore from the refresh cookie.
    Restore,
}

impl RefreshCause {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RefreshCause::Unauthorized => "unauthorized",
            RefreshCause::Restore => "restore",
        }
    }
}

/// HTTP client that owns the credential, the session state and the refresh
/// gate. Shared as `Arc<AuthenticatedClient>`.
pub struct AuthenticatedClient {
    http: reqwest::Client,
    base_url: String,
    process_id: ProcessId,
    cookies: CookieJar,
    tokens: TokenStore,
    session: SessionState,
    gate: RefreshGate,
    notifier: UnauthorizedNotifier,
}

impl std::fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("base_url", &self.base_url)
            .field("process_id", &self.process_id)
            .field("cookies", &self.cookies)
            .field("status", &self.session.status())
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

/// Puts the session back to Authenticated if the refresh leader is dropped
/// before it reaches an outcome.
struct RefreshGuard<'a> {
    session: &'a SessionState,
    epoch: u64,
    armed: bool,
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.session.abandon_refresh(self.epoch);
        }
    }
}

impl AuthenticatedClient {
    /// Build the client with a memory-only cookie jar. The returned receiver
    /// carries the unauthorized signal; hand it to
    /// [`AuthSession`](crate::session::AuthSession).
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidRequest` if the HTTP client cannot be built.
    pub fn new(
        config: &ClientConfig,
        process_id: ProcessId,
    ) -> Result<(Arc<Self>, UnauthorizedEvents), ApiError> {
        Self::with_cookie_jar(config, process_id, CookieJar::memory())
    }

    /// Build the client around `cookies`, which carries the refresh cookie.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::InvalidRequest` if the HTTP client cannot be built.
    pub fn with_cookie_jar(
        config: &ClientConfig,
        process_id: ProcessId,
        cookies: CookieJar,
    ) -> Result<(Arc<Self>, UnauthorizedEvents), ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(config.connect_timeout)
            .cookie_provider(cookies.provider())
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to build HTTP client: {e}")))?;

        let (notifier, events) = unauthorized_channel();

        let client = Arc::new(Self {
            http,
            base_url: config.api_url.clone(),
            process_id,
            cookies,
            tokens: TokenStore::new(),
            session: SessionState::new(),
            gate: RefreshGate::new(),
            notifier,
        });

        info!(
            target: "console.client",
            base_url = %client.base_url,
            process_id = %process_id,
            "Console client created"
        );

        Ok((client, events))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    #[must_use]
    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Whether a refresh call is outstanding.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.gate.is_in_flight()
    }

    /// Requests currently parked behind the refresh.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.gate.queued()
    }

    /// Send `request`, recovering from an expired access token at most once.
    ///
    /// # Errors
    ///
    /// Returns the classified [`ApiError`] for non-2xx responses and transport
    /// failures, `RefreshFailed` if the session could not be refreshed, and
    /// `SessionInvalidated` if the session ended while the request waited.
    #[instrument(
        skip_all,
        name = "console.client.send",
        fields(method = %request.method(), path = %request.path())
    )]
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let sent_with = self.tokens.access_token();
        match self.dispatch(request, Attempt::Initial, sent_with.as_ref()).await {
            Err(err) if err.is_retryable_auth() && self.refresh_eligible(request) => {
                self.recover(request, sent_with.as_ref(), &err).await
            }
            other => other,
        }
    }

    /// [`send`](Self::send) and decode the JSON response body.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send), plus `InvalidResponse` if the body does not
    /// decode as `T`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// [`send`](Self::send) and discard the response body.
    ///
    /// # Errors
    ///
    /// As [`send`](Self::send).
    pub async fn send_empty(&self, request: &ApiRequest) -> Result<(), ApiError> {
        self.send(request).await.map(drop)
    }

    /// Run the refresh protocol outside of a failed request, or wait on the
    /// refresh already in flight.
    ///
    /// With [`RefreshCause::Restore`] a failure leaves the session
    /// Unauthenticated without raising the unauthorized signal.
    ///
    /// # Errors
    ///
    /// Returns the refresh error.
    pub async fn refresh_credential(&self, cause: RefreshCause) -> Result<(), ApiError> {
        match self.gate.join() {
            Join::Leader(lease) => self.lead_refresh(lease, cause).await.map(drop),
            Join::Follower(queued) => queued.wait().await.map(drop),
        }
    }

    fn refresh_eligible(&self, request: &ApiRequest) -> bool {
        !request.is_auth_endpoint() && self.session.status() != SessionStatus::Unauthenticated
    }

    async fn recover(
        &self,
        request: &ApiRequest,
        sent_with: Option<&SecretString>,
        rejection: &ApiError,
    ) -> Result<Response, ApiError> {
        // The credential was replaced while this request was in flight.
        if !self.gate.is_in_flight() {
            if let Some(current) = self.tokens.access_token() {
                let stale = match sent_with {
                    Some(used) => !same_secret(used, &current),
                    None => true,
                };
                if stale {
                    debug!(target: "console.refresh", "Stale 401, replaying with current token");
                    return self.dispatch(request, Attempt::Replay, Some(&current)).await;
                }
            }
        }

        debug!(target: "console.refresh", error = %rejection, "Access token rejected");

        let token = match self.gate.join() {
            Join::Follower(queued) => {
                trace!(target: "console.refresh", ticket = queued.ticket(), "Waiting on refresh");
                queued.wait().await?
            }
            Join::Leader(lease) => self.lead_refresh(lease, RefreshCause::Unauthorized).await?,
        };

        self.dispatch(request, Attempt::Replay, Some(&token)).await
    }

    /// Perform the refresh call as the gate leader and publish the outcome.
    async fn lead_refresh(&self, lease: RefreshLease<'_>, cause: RefreshCause) -> RefreshOutcome {
        let epoch = self.session.begin_refresh();
        let mut guard = RefreshGuard {
            session: &self.session,
            epoch,
            armed: true,
        };
        let started = Instant::now();

        info!(target: "console.refresh", cause = cause.as_str(), "Refreshing access token");

        let outcome = match self.call_refresh().await {
            Ok(response) => {
                let credential = Credential::from_response(&response, Utc::now());
                let token = credential.access_token.clone();
                if self
                    .session
                    .finish_refresh(epoch, &response.role, &self.tokens, credential)
                {
                    metrics::record_token_refresh("success", cause.as_str(), started.elapsed());
                    info!(target: "console.refresh", role = %response.role, "Access token refreshed");
                    Ok(token)
                } else {
                    metrics::record_token_refresh("discarded", cause.as_str(), started.elapsed());
                    info!(target: "console.refresh", "Session ended during refresh, result discarded");
                    Err(ApiError::SessionInvalidated)
                }
            }
            Err(e) => {
                metrics::record_token_refresh("failure", cause.as_str(), started.elapsed());
                let err = match e {
                    ApiError::RefreshFailed(_) => e,
                    other => ApiError::RefreshFailed(other.to_string()),
                };
                warn!(target: "console.refresh", error = %err, "Token refresh failed");

                // The session ends before the queue is released so no waiter
                // can observe the old credential and start a second refresh.
                if self
                    .session
                    .invalidate_if_current(epoch, EndReason::Expired, &self.tokens)
                {
                    metrics::record_session_invalidation("expired");
                    if cause == RefreshCause::Unauthorized {
                        self.notifier.notify(err.to_string());
                    }
                }
                Err(err)
            }
        };

        guard.armed = false;
        let notified = lease.settle(&outcome);
        metrics::record_refresh_waiters(notified.len());
        debug!(target: "console.refresh", resumed = notified.len(), "Pending queue drained");

        // The server may have rotated the refresh cookie.
        if outcome.is_ok() {
            if let Err(e) = self.cookies.save().await {
                warn!(target: "console.refresh", error = %e, "Failed to save cookie jar");
            }
        }

        outcome
    }

    async fn call_refresh(&self) -> Result<AuthResponse, ApiError> {
        let body = match self.tokens.refresh_token() {
            Some(refresh_token) => json!({ "refresh_token": refresh_token.expose_secret() }),
            None => json!({}),
        };
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&body)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

        let response = self.dispatch(&request, Attempt::Initial, None).await?;
        response
            .json::<AuthResponse>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    /// One HTTP round trip. No recovery happens here.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        attempt: Attempt,
        token: Option<&SecretString>,
    ) -> Result<Response, ApiError> {
        let ctx = RequestContext::new(self.process_id, attempt);
        let url = format!("{}{}", self.base_url, request.path());

        let mut builder = self
            .http
            .request(request.method().clone(), &url)
            .header(HEADER_REQUEST_ID, ctx.request_id.to_string())
            .header(HEADER_PROCESS_ID, ctx.process_id.to_string());

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(bearer_value(token).expose_secret())
                .map_err(|_| ApiError::InvalidRequest("Access token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, value);
        }

        for (name, value) in request.headers() {
            builder = builder.header(*name, value);
        }

        builder = match request.body() {
            Some(RequestBody::Json(body)) => builder.json(body),
            Some(RequestBody::Form(fields)) => builder.form(fields),
            None => builder,
        };

        let started = Instant::now();
        let result = builder.send().await;
        let method = request.method().as_str();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let err = ApiError::from(e);
                metrics::record_request(method, None, Some(err.kind()), started.elapsed());
                debug!(
                    target: "console.client",
                    request_id = %ctx.request_id,
                    attempt = ctx.attempt.as_str(),
                    error = %err,
                    "Request failed"
                );
                return Err(err);
            }
        };

        let status = response.status();
        debug!(
            target: "console.client",
            request_id = %ctx.request_id,
            attempt = ctx.attempt.as_str(),
            status = status.as_u16(),
            "Response received"
        );

        if status.is_success() {
            metrics::record_request(method, Some(status.as_u16()), None, started.elapsed());
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_status(status, &body);
        metrics::record_request(method, Some(status.as_u16()), Some(err.kind()), started.elapsed());
        Err(err)
    }
}
