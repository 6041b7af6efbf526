//! Integration tests for the 401 → refresh → replay protocol
//!
//! These tests drive `AuthenticatedClient` against a mock console API and
//! validate the single-flight guarantees: one refresh per burst of 401s,
//! one replay per request, and a clean failure path that never hangs.

use common::secret::{ExposeSecret, SecretString};
use console_client::context::{ApiRequest, HEADER_REQUEST_ID};
use console_client::signal::UnauthorizedEvents;
use console_client::{ApiError, AuthSession, SessionStatus};
use console_test_utils::{auth_body, header_value, MockBankBackend};
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, ResponseTemplate};

const REFRESH_DELAY: Duration = Duration::from_millis(300);
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

async fn logged_in(backend: &MockBankBackend, token: &str) -> (Arc<AuthSession>, UnauthorizedEvents) {
    backend.mount_login(token, "teller").await;
    let (session, events) = backend.session();
    session
        .login("teller01", &SecretString::from("pw"))
        .await
        .unwrap();
    (session, events)
}

/// Poll `condition` until it holds or the test times out.
async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TEST_TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ============================================================================
// Request path
// ============================================================================

#[tokio::test]
async fn test_authorization_matches_store_at_dispatch() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (session, _events) = logged_in(&backend, "at-1").await;
    backend
        .mount_protected("GET", "/accounts", "at-1", json!([]))
        .await;

    // Act
    session
        .client()
        .send_empty(&ApiRequest::get("/accounts"))
        .await
        .unwrap();

    // Assert
    let requests = backend.requests_to("/accounts").await;
    assert_eq!(requests.len(), 1);
    let stored = session.client().tokens().access_token().unwrap();
    assert_eq!(
        header_value(&requests[0], "Authorization"),
        Some(format!("Bearer {}", stored.expose_secret()))
    );
}

// ============================================================================
// Refresh success
// ============================================================================

#[tokio::test]
async fn test_single_401_refreshes_and_replays_once() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (session, _events) = logged_in(&backend, "old").await;
    backend.mount_refresh_success("new", "supervisor").await;
    backend
        .mount_protected("GET", "/accounts", "new", json!([]))
        .await;

    // Act
    let result = session
        .client()
        .send_empty(&ApiRequest::get("/accounts"))
        .await;

    // Assert
    assert!(result.is_ok(), "replay should succeed: {result:?}");
    assert_eq!(backend.refresh_calls().await, 1);

    let current = session.current();
    assert_eq!(current.status(), SessionStatus::Authenticated);
    assert_eq!(current.role(), Some("supervisor"));

    let requests = backend.requests_to("/accounts").await;
    assert_eq!(requests.len(), 2, "original plus exactly one replay");
    assert_eq!(
        header_value(&requests[0], "Authorization").as_deref(),
        Some("Bearer old")
    );
    assert_eq!(
        header_value(&requests[1], "Authorization").as_deref(),
        Some("Bearer new")
    );
    assert_ne!(
        header_value(&requests[0], HEADER_REQUEST_ID),
        header_value(&requests[1], HEADER_REQUEST_ID),
        "each dispatch gets its own request id"
    );
}

#[tokio::test]
async fn test_concurrent_401s_coalesce_into_one_refresh() {
    // Arrange
    const CONCURRENT: usize = 8;
    let backend = MockBankBackend::start().await;
    let (session, _events) = logged_in(&backend, "old").await;
    backend
        .mount_refresh_success_delayed("new", "teller", REFRESH_DELAY)
        .await;
    backend
        .mount_protected("GET", "/accounts", "new", json!([]))
        .await;

    // Act
    let client = session.client();
    let request = ApiRequest::get("/accounts");
    let results = join_all((0..CONCURRENT).map(|_| client.send_empty(&request))).await;

    // Assert
    for result in &results {
        assert!(result.is_ok(), "every request should be replayed: {result:?}");
    }
    assert_eq!(backend.refresh_calls().await, 1, "single-flight refresh");

    let replays = backend
        .requests_to("/accounts")
        .await
        .into_iter()
        .filter(|r| header_value(r, "Authorization").as_deref() == Some("Bearer new"))
        .count();
    assert_eq!(replays, CONCURRENT);
    assert!(!client.is_refreshing());
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn test_queued_requests_replay_in_enqueue_order() {
    // Arrange
    const FOLLOWERS: usize = 5;
    let backend = MockBankBackend::start().await;
    let (session, _events) = logged_in(&backend, "old").await;
    backend
        .mount_refresh_success_delayed("new", "teller", REFRESH_DELAY)
        .await;
    backend
        .mount_protected("GET", "/accounts", "new", json!([]))
        .await;
    let client = Arc::clone(session.client());

    // Act: the first request leads the refresh, the rest join the queue one
    // at a time so the enqueue order is known.
    let mut in_flight = Vec::new();
    let leader = Arc::clone(&client);
    in_flight.push(tokio::spawn(async move {
        leader.send_empty(&ApiRequest::get("/accounts?seq=0")).await
    }));
    wait_until(|| client.is_refreshing()).await;

    for seq in 1..=FOLLOWERS {
        let follower = Arc::clone(&client);
        in_flight.push(tokio::spawn(async move {
            follower
                .send_empty(&ApiRequest::get(format!("/accounts?seq={seq}")))
                .await
        }));
        wait_until(|| client.pending_requests() == seq).await;
    }

    for handle in in_flight {
        let result = tokio::time::timeout(TEST_TIMEOUT, handle)
            .await
            .expect("replay should complete")
            .unwrap();
        assert!(result.is_ok(), "{result:?}");
    }

    // Assert
    let replay_order: Vec<String> = backend
        .requests_to("/accounts")
        .await
        .into_iter()
        .filter(|r| header_value(r, "Authorization").as_deref() == Some("Bearer new"))
        .filter_map(|r| {
            r.url
                .query_pairs()
                .find(|(key, _)| key == "seq")
                .map(|(_, value)| value.into_owned())
        })
        .collect();
    let enqueue_order: Vec<String> = (0..=FOLLOWERS).map(|seq| seq.to_string()).collect();

    assert_eq!(replay_order, enqueue_order);
    assert_eq!(backend.refresh_calls().await, 1);
}

#[tokio::test]
async fn test_stale_401_replays_without_refresh() {
    // Arrange: the slow request is rejected, but by the time its 401 lands
    // a newer credential is already in the store.
    let backend = MockBankBackend::start().await;
    let (session, _events) = logged_in(&backend, "old").await;
    backend.mount_refresh_success("unused", "teller").await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .and(header("Authorization", "Bearer new"))
        .respond_with(ResponseTemplate::new(200))
        .with_priority(1)
        .mount(backend.server())
        .await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"detail": "Token expired"}))
                .set_delay(REFRESH_DELAY),
        )
        .with_priority(10)
        .mount(backend.server())
        .await;

    // Act
    let client = Arc::clone(session.client());
    let in_flight =
        tokio::spawn(async move { client.send_empty(&ApiRequest::get("/slow")).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    session.establish(&serde_json::from_value(auth_body("new", "teller")).unwrap()).await;

    // Assert
    assert!(in_flight.await.unwrap().is_ok());
    assert_eq!(backend.refresh_calls().await, 0);
}

#[tokio::test]
async fn test_refresh_sends_refresh_token_and_cookie() {
    // Arrange
    let backend = MockBankBackend::start().await;
    backend
        .mount_login_with_refresh("old", "teller", "rt-1")
        .await;
    Mock::given(method("POST"))
        .and(path("/refresh"))
        .and(body_json(json!({"refresh_token": "rt-1"})))
        .and(header("cookie", "refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(auth_body("new", "teller")))
        .expect(1)
        .mount(backend.server())
        .await;
    backend
        .mount_protected("GET", "/accounts", "new", json!([]))
        .await;

    let (session, _events) = backend.session();
    session
        .login("teller01", &SecretString::from("pw"))
        .await
        .unwrap();

    // Act
    let result = session
        .client()
        .send_empty(&ApiRequest::get("/accounts"))
        .await;

    // Assert
    assert!(result.is_ok(), "{result:?}");
}

// ============================================================================
// Refresh failure
// ============================================================================

#[tokio::test]
async fn test_refresh_failure_rejects_all_and_signals_once() {
    // Arrange
    const CONCURRENT: usize = 5;
    let backend = MockBankBackend::start().await;
    let (session, mut events) = logged_in(&backend, "old").await;
    backend
        .mount_refresh_failure_delayed(401, REFRESH_DELAY)
        .await;
    backend
        .mount_protected("GET", "/accounts", "new", json!([]))
        .await;

    // Act
    let client = session.client();
    let request = ApiRequest::get("/accounts");
    let results = tokio::time::timeout(
        TEST_TIMEOUT,
        join_all((0..CONCURRENT).map(|_| client.send_empty(&request))),
    )
    .await
    .expect("no request may hang after a failed refresh");

    // Assert
    for result in results {
        assert!(
            matches!(result, Err(ApiError::RefreshFailed(_))),
            "expected RefreshFailed, got {result:?}"
        );
    }
    assert_eq!(backend.refresh_calls().await, 1);
    assert!(client.tokens().is_empty());

    let current = session.current();
    assert_eq!(current.status(), SessionStatus::Unauthenticated);
    assert!(current.login_required());

    assert!(events.try_recv().is_some(), "signal raised");
    assert!(events.try_recv().is_none(), "signal raised exactly once");
}

#[tokio::test]
async fn test_request_to_refresh_endpoint_never_triggers_protocol() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (session, mut events) = logged_in(&backend, "old").await;
    backend.mount_refresh_failure(401).await;

    // Act
    let result = session
        .client()
        .send_empty(&ApiRequest::post("/refresh"))
        .await;

    // Assert
    assert!(matches!(result, Err(ApiError::Unauthorized(_))), "{result:?}");
    assert_eq!(backend.refresh_calls().await, 1, "only the call we made");
    assert_eq!(session.current().status(), SessionStatus::Authenticated);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_replay_401_is_terminal() {
    // Arrange: the refreshed token is rejected too.
    let backend = MockBankBackend::start().await;
    let (session, mut events) = logged_in(&backend, "old").await;
    backend.mount_refresh_success("new", "teller").await;
    backend
        .mount_protected("GET", "/accounts", "never-valid", json!([]))
        .await;

    // Act
    let result = session
        .client()
        .send_empty(&ApiRequest::get("/accounts"))
        .await;

    // Assert
    assert!(matches!(result, Err(ApiError::Unauthorized(_))), "{result:?}");
    assert_eq!(backend.refresh_calls().await, 1, "no second refresh");
    assert_eq!(backend.requests_to("/accounts").await.len(), 2);
    assert_eq!(session.current().status(), SessionStatus::Authenticated);
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_forbidden_does_not_refresh() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (session, _events) = logged_in(&backend, "old").await;
    backend
        .mount_status("DELETE", "/accounts/ACC1", 403, json!("Admins only"))
        .await;

    // Act
    let result = session
        .client()
        .send_empty(&ApiRequest::delete("/accounts/ACC1"))
        .await;

    // Assert
    assert_eq!(result, Err(ApiError::Forbidden("Admins only".to_string())));
    assert_eq!(backend.refresh_calls().await, 0);
}

// ============================================================================
// Races with logout and cancellation
// ============================================================================

#[tokio::test]
async fn test_refresh_completing_after_logout_is_discarded() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (session, mut events) = logged_in(&backend, "old").await;
    backend
        .mount_refresh_success_delayed("late", "teller", REFRESH_DELAY)
        .await;
    backend
        .mount_protected("GET", "/accounts", "late", json!([]))
        .await;
    backend.mount_logout(200).await;

    // Act
    let client = Arc::clone(session.client());
    let in_flight =
        tokio::spawn(async move { client.send_empty(&ApiRequest::get("/accounts")).await });
    let client = session.client();
    wait_until(|| client.is_refreshing()).await;
    session.logout().await;

    // Assert
    let result = in_flight.await.unwrap();
    assert_eq!(result, Err(ApiError::SessionInvalidated));
    assert!(client.tokens().is_empty(), "late credential not stored");
    assert_eq!(session.current().status(), SessionStatus::Unauthenticated);
    assert!(!session.current().login_required());
    assert!(events.try_recv().is_none());
}

#[tokio::test]
async fn test_abandoned_refresh_releases_waiters() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (session, _events) = logged_in(&backend, "old").await;
    backend
        .mount_refresh_success_delayed("new", "teller", Duration::from_secs(2))
        .await;
    backend
        .mount_protected("GET", "/accounts", "new", json!([]))
        .await;

    let client = session.client();
    let leader = {
        let client = Arc::clone(client);
        tokio::spawn(async move { client.send_empty(&ApiRequest::get("/accounts")).await })
    };
    wait_until(|| client.is_refreshing()).await;

    let follower = {
        let client = Arc::clone(client);
        tokio::spawn(async move { client.send_empty(&ApiRequest::get("/accounts")).await })
    };
    wait_until(|| client.pending_requests() == 1).await;

    // Act
    leader.abort();
    assert!(leader.await.unwrap_err().is_cancelled());

    // Assert
    let result = follower.await.unwrap();
    assert!(matches!(result, Err(ApiError::RefreshFailed(_))), "{result:?}");
    assert!(!client.is_refreshing());
    assert_eq!(session.current().status(), SessionStatus::Authenticated);
    assert_eq!(
        client.tokens().access_token().unwrap().expose_secret(),
        "old",
        "old credential kept"
    );
}
