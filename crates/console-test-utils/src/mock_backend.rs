//! Mock console API for integration tests
//!
//! Wraps a `wiremock::MockServer` with helpers that mount the auth and
//! accounts endpoints the way the real backend answers them.

use common::types::ProcessId;
use console_client::config::ClientConfig;
use console_client::prefs::PrefsStore;
use console_client::signal::UnauthorizedEvents;
use console_client::{AuthSession, AuthenticatedClient};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Priority for mocks that match an authorized request. Lower wins.
const AUTHORIZED_PRIORITY: u8 = 1;
/// Priority for the 401 fallback behind a protected endpoint.
const FALLBACK_PRIORITY: u8 = 10;
/// Lifetime of the refresh cookie, matching the backend's seven days.
const REFRESH_COOKIE_MAX_AGE: u32 = 7 * 24 * 60 * 60;

/// Mock console API.
///
/// # Example
/// ```rust,ignore
/// let backend = MockBankBackend::start().await;
/// backend.mount_login("old", "teller").await;
/// backend.mount_refresh_success("new", "teller").await;
/// backend
///     .mount_protected("GET", "/accounts", "new", json!([]))
///     .await;
/// ```
pub struct MockBankBackend {
    server: MockServer,
}

impl MockBankBackend {
    /// Start a mock server on a random local port.
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Client configuration pointing at this server, prefs in memory.
    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.uri())
    }

    /// A fresh client with a new process id.
    pub fn client(&self) -> (Arc<AuthenticatedClient>, UnauthorizedEvents) {
        AuthenticatedClient::new(&self.config(), ProcessId::new())
            .expect("client should build against mock server")
    }

    /// A fresh session over a fresh client, prefs in memory.
    pub fn session(&self) -> (Arc<AuthSession>, UnauthorizedEvents) {
        let (client, events) = self.client();
        (
            Arc::new(AuthSession::new(client, PrefsStore::memory())),
            events,
        )
    }

    /// `POST /token` answers with `token` for `role`.
    pub async fn mount_login(&self, token: &str, role: &str) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(auth_body(token, role)))
            .named("login")
            .mount(&self.server)
            .await;
    }

    /// `POST /token` answers with `token` plus a refresh token in the body
    /// and a persistent HttpOnly refresh cookie.
    pub async fn mount_login_with_refresh(&self, token: &str, role: &str, refresh_token: &str) {
        let mut body = auth_body(token, role);
        body["refresh_token"] = json!(refresh_token);
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .append_header("Set-Cookie", refresh_cookie(refresh_token).as_str())
                    .set_body_json(body),
            )
            .named("login with refresh token")
            .mount(&self.server)
            .await;
    }

    /// `POST /refresh` succeeds with `token` for `role`.
    pub async fn mount_refresh_success(&self, token: &str, role: &str) {
        self.mount_refresh(ResponseTemplate::new(200).set_body_json(auth_body(token, role)))
            .await;
    }

    /// `POST /refresh` succeeds with `token` for `role` only when it carries
    /// `refresh_token`, as the cookie or in the JSON body. Anything else gets
    /// a 401.
    pub async fn mount_refresh_requiring(&self, refresh_token: &str, token: &str, role: &str) {
        let success = ResponseTemplate::new(200)
            .append_header("Set-Cookie", refresh_cookie(refresh_token).as_str())
            .set_body_json(auth_body(token, role));

        Mock::given(method("POST"))
            .and(path("/refresh"))
            .and(header("cookie", format!("refresh_token={refresh_token}").as_str()))
            .respond_with(success.clone())
            .with_priority(AUTHORIZED_PRIORITY)
            .named("refresh with cookie")
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path("/refresh"))
            .and(body_json(json!({ "refresh_token": refresh_token })))
            .respond_with(success)
            .with_priority(AUTHORIZED_PRIORITY)
            .named("refresh with body token")
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid refresh token"})),
            )
            .with_priority(FALLBACK_PRIORITY)
            .named("refresh without credential")
            .mount(&self.server)
            .await;
    }

    /// `POST /refresh` succeeds after `delay`, long enough for concurrent
    /// requests to queue behind it.
    pub async fn mount_refresh_success_delayed(&self, token: &str, role: &str, delay: Duration) {
        self.mount_refresh(
            ResponseTemplate::new(200)
                .set_body_json(auth_body(token, role))
                .set_delay(delay),
        )
        .await;
    }

    /// `POST /refresh` fails with `status`.
    pub async fn mount_refresh_failure(&self, status: u16) {
        self.mount_refresh(
            ResponseTemplate::new(status).set_body_json(json!({"detail": "Invalid refresh token"})),
        )
        .await;
    }

    /// `POST /refresh` fails with `status` after `delay`.
    pub async fn mount_refresh_failure_delayed(&self, status: u16, delay: Duration) {
        self.mount_refresh(
            ResponseTemplate::new(status)
                .set_body_json(json!({"detail": "Invalid refresh token"}))
                .set_delay(delay),
        )
        .await;
    }

    async fn mount_refresh(&self, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/refresh"))
            .respond_with(template)
            .named("refresh")
            .mount(&self.server)
            .await;
    }

    /// `POST /logout` answers with `status`.
    pub async fn mount_logout(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/logout"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"message": "Logged out"})))
            .named("logout")
            .mount(&self.server)
            .await;
    }

    /// `verb path` answers `body` only when sent with `Bearer {token}`;
    /// anything else gets a 401.
    pub async fn mount_protected(&self, verb: &str, route: &str, token: &str, body: Value) {
        Mock::given(method(verb))
            .and(path(route))
            .and(header("Authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .with_priority(AUTHORIZED_PRIORITY)
            .named(format!("{verb} {route} authorized"))
            .mount(&self.server)
            .await;

        Mock::given(method(verb))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})),
            )
            .with_priority(FALLBACK_PRIORITY)
            .named(format!("{verb} {route} unauthorized"))
            .mount(&self.server)
            .await;
    }

    /// `verb path` always answers `status` with a FastAPI `detail` body.
    pub async fn mount_status(&self, verb: &str, route: &str, status: u16, detail: Value) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "detail": detail })))
            .mount(&self.server)
            .await;
    }

    /// Every request the server received for `route`, in arrival order.
    pub async fn requests_to(&self, route: &str) -> Vec<Request> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|r| r.url.path() == route)
            .collect()
    }

    /// Number of `/refresh` calls received so far.
    pub async fn refresh_calls(&self) -> usize {
        self.requests_to("/refresh").await.len()
    }
}

/// Header value of `name` on `request`, if present and ASCII.
pub fn header_value(request: &Request, name: &str) -> Option<String> {
    request
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// `Set-Cookie` value the backend sends with a refresh token.
pub fn refresh_cookie(refresh_token: &str) -> String {
    format!("refresh_token={refresh_token}; HttpOnly; Path=/; Max-Age={REFRESH_COOKIE_MAX_AGE}")
}

/// Body of a `/token` or `/refresh` response.
pub fn auth_body(token: &str, role: &str) -> Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "role": role,
        "access_token_expires_in": 900,
    })
}

/// An account record as the backend returns it.
pub fn account_json(account_id: &str) -> Value {
    json!({
        "account_id": account_id,
        "account_holder_name": "Ada Lovelace",
        "dob": "1815-12-10",
        "gender": "Female",
        "email": "ada@example.com",
        "phone": "555-0100",
        "address": "12 St James's Square",
        "zip_code": "10001",
        "account_type": "Savings",
        "balance": 1250.5,
        "date_opened": "2024-01-15",
        "status": "Active",
        "services": "online_banking,debit_card",
        "marketing_opt_in": false,
        "agreed_to_terms": true,
    })
}
