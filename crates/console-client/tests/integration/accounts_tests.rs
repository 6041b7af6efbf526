//! Integration tests for the typed accounts endpoints
//!
//! Covers payload shapes, error classification, and the `Idempotency-Id`
//! contract for account creation across a token refresh.

use common::secret::SecretString;
use console_client::context::{HEADER_IDEMPOTENCY_ID, HEADER_REQUEST_ID};
use console_client::errors::FieldIssue;
use console_client::models::{Account, AccountUpdate, NewAccount};
use console_client::{AccountsApi, ApiError, AuthSession};
use console_test_utils::{account_json, header_value, MockBankBackend};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

async fn accounts_for(backend: &MockBankBackend, token: &str) -> (Arc<AuthSession>, AccountsApi) {
    backend.mount_login(token, "teller").await;
    let (session, _events) = backend.session();
    session
        .login("teller01", &SecretString::from("pw"))
        .await
        .unwrap();
    let accounts = AccountsApi::new(Arc::clone(session.client()));
    (session, accounts)
}

#[tokio::test]
async fn test_list_and_get_decode_accounts() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (_session, accounts) = accounts_for(&backend, "at").await;
    backend
        .mount_protected(
            "GET",
            "/accounts",
            "at",
            json!([account_json("ACC1"), account_json("ACC2")]),
        )
        .await;
    backend
        .mount_protected("GET", "/accounts/ACC1", "at", account_json("ACC1"))
        .await;

    // Act
    let listed = accounts.list().await.unwrap();
    let one = accounts.get("ACC1").await.unwrap();

    // Assert
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[1].account_id, "ACC2");
    assert_eq!(one.account_id, "ACC1");
    assert_eq!(one.account_holder_name, "Ada Lovelace");
    assert!(one.agreed_to_terms);
}

#[tokio::test]
async fn test_get_unknown_account_is_not_found() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (_session, accounts) = accounts_for(&backend, "at").await;
    backend
        .mount_status("GET", "/accounts/NOPE", 404, json!("Account not found"))
        .await;

    // Act
    let err = accounts.get("NOPE").await.unwrap_err();

    // Assert
    assert_eq!(err, ApiError::NotFound("Account not found".to_string()));
    assert_eq!(backend.refresh_calls().await, 0);
}

#[tokio::test]
async fn test_invalid_id_rejected_before_network() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (_session, accounts) = accounts_for(&backend, "at").await;

    // Act
    let empty = accounts.get("").await;
    let traversal = accounts.delete("../token").await;

    // Assert
    assert!(matches!(empty, Err(ApiError::InvalidRequest(_))));
    assert!(matches!(traversal, Err(ApiError::InvalidRequest(_))));
    assert!(backend.requests_to("/accounts/").await.is_empty());
    assert_eq!(
        backend.server().received_requests().await.unwrap().len(),
        1,
        "only the login reached the server"
    );
}

#[tokio::test]
async fn test_create_reuses_idempotency_id_on_replay() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (_session, accounts) = accounts_for(&backend, "old").await;
    backend.mount_refresh_success("new", "teller").await;
    backend
        .mount_protected(
            "POST",
            "/accounts",
            "new",
            json!({"account_id": "ACC9", "message": "Account created successfully"}),
        )
        .await;

    // Act
    let created = accounts
        .create(&NewAccount::new("Grace Hopper", "Checking"))
        .await
        .unwrap();

    // Assert
    assert_eq!(created.account_id, "ACC9");

    let requests = backend.requests_to("/accounts").await;
    assert_eq!(requests.len(), 2, "original plus one replay");
    let first = header_value(&requests[0], HEADER_IDEMPOTENCY_ID).expect("key on first attempt");
    let replay = header_value(&requests[1], HEADER_IDEMPOTENCY_ID).expect("key on replay");
    assert_eq!(first, replay, "same logical attempt, same key");
    assert!(Uuid::parse_str(&first).is_ok());
    assert_ne!(
        header_value(&requests[0], HEADER_REQUEST_ID),
        header_value(&requests[1], HEADER_REQUEST_ID)
    );

    let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
    assert_eq!(body["account_holder_name"], "Grace Hopper");
    assert_eq!(body["status"], "Active");
}

#[tokio::test]
async fn test_separate_creates_use_separate_keys() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (_session, accounts) = accounts_for(&backend, "at").await;
    backend
        .mount_protected("POST", "/accounts", "at", json!({"account_id": "ACC1"}))
        .await;

    // Act
    let draft = NewAccount::new("Grace Hopper", "Checking");
    accounts.create(&draft).await.unwrap();
    accounts.create(&draft).await.unwrap();

    // Assert
    let keys: Vec<_> = backend
        .requests_to("/accounts")
        .await
        .iter()
        .map(|r| header_value(r, HEADER_IDEMPOTENCY_ID))
        .collect();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
}

#[tokio::test]
async fn test_create_validation_error_lists_fields() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (_session, accounts) = accounts_for(&backend, "at").await;
    backend
        .mount_status(
            "POST",
            "/accounts",
            422,
            json!([
                {"loc": ["body", "email"], "msg": "value is not a valid email address", "type": "value_error"}
            ]),
        )
        .await;

    // Act
    let err = accounts
        .create(&NewAccount::new("Grace Hopper", "Checking"))
        .await
        .unwrap_err();

    // Assert
    assert_eq!(
        err,
        ApiError::Validation {
            status: 422,
            issues: vec![FieldIssue {
                field: "body.email".to_string(),
                message: "value is not a valid email address".to_string(),
            }],
        }
    );
}

#[tokio::test]
async fn test_update_and_delete_return_messages() {
    // Arrange
    let backend = MockBankBackend::start().await;
    let (_session, accounts) = accounts_for(&backend, "at").await;
    backend
        .mount_protected(
            "PUT",
            "/accounts/ACC1",
            "at",
            json!({"message": "Account updated successfully"}),
        )
        .await;
    backend
        .mount_protected(
            "DELETE",
            "/accounts/ACC1",
            "at",
            json!({"message": "Account deleted successfully"}),
        )
        .await;

    let account: Account = serde_json::from_value(account_json("ACC1")).unwrap();
    let mut update = AccountUpdate::from(&account);
    update.balance = 99.0;

    // Act
    let updated = accounts.update("ACC1", &update).await.unwrap();
    let deleted = accounts.delete("ACC1").await.unwrap();

    // Assert
    assert_eq!(updated.message, "Account updated successfully");
    assert_eq!(deleted.message, "Account deleted successfully");

    let requests = backend.requests_to("/accounts/ACC1").await;
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["balance"], 99.0);
    assert!(body.get("account_id").is_none());
}
