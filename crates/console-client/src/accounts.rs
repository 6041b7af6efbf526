//! Typed calls for the accounts endpoints.
//!
//! Thin pass-through over [`AuthenticatedClient`]; refresh and replay happen
//! underneath.

use crate::client::AuthenticatedClient;
use crate::context::{ApiRequest, HEADER_IDEMPOTENCY_ID};
use crate::errors::ApiError;
use crate::models::{Account, AccountCreated, AccountUpdate, MessageResponse, NewAccount};
use common::types::IdempotencyKey;
use std::sync::Arc;
use tracing::instrument;

const ACCOUNTS_PATH: &str = "/accounts";

#[derive(Debug, Clone)]
pub struct AccountsApi {
    client: Arc<AuthenticatedClient>,
}

impl AccountsApi {
    #[must_use]
    pub fn new(client: Arc<AuthenticatedClient>) -> Self {
        Self { client }
    }

    /// # Errors
    ///
    /// Any [`ApiError`] from the request.
    #[instrument(skip_all, name = "console.accounts.list")]
    pub async fn list(&self) -> Result<Vec<Account>, ApiError> {
        self.client.send_json(&ApiRequest::get(ACCOUNTS_PATH)).await
    }

    /// # Errors
    ///
    /// `InvalidRequest` for an unusable id, otherwise any [`ApiError`] from
    /// the request (`NotFound` for an unknown account).
    #[instrument(skip_all, name = "console.accounts.get", fields(account_id = %id))]
    pub async fn get(&self, id: &str) -> Result<Account, ApiError> {
        self.client.send_json(&ApiRequest::get(account_path(id)?)).await
    }

    /// Open an account.
    ///
    /// Each call is one logical attempt with its own `Idempotency-Id`. The
    /// descriptor is built once, so a replay after a token refresh carries
    /// the same key and the server can drop the duplicate.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`] from the request; `Validation` for rejected fields.
    #[instrument(skip_all, name = "console.accounts.create")]
    pub async fn create(&self, account: &NewAccount) -> Result<AccountCreated, ApiError> {
        let request = ApiRequest::post(ACCOUNTS_PATH)
            .json(account)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?
            .header(HEADER_IDEMPOTENCY_ID, IdempotencyKey::new().to_string());
        self.client.send_json(&request).await
    }

    /// # Errors
    ///
    /// `InvalidRequest` for an unusable id, otherwise any [`ApiError`] from
    /// the request.
    #[instrument(skip_all, name = "console.accounts.update", fields(account_id = %id))]
    pub async fn update(&self, id: &str, update: &AccountUpdate) -> Result<MessageResponse, ApiError> {
        let request = ApiRequest::put(account_path(id)?)
            .json(update)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        self.client.send_json(&request).await
    }

    /// # Errors
    ///
    /// `InvalidRequest` for an unusable id, otherwise any [`ApiError`] from
    /// the request.
    #[instrument(skip_all, name = "console.accounts.delete", fields(account_id = %id))]
    pub async fn delete(&self, id: &str) -> Result<MessageResponse, ApiError> {
        self.client
            .send_json(&ApiRequest::delete(account_path(id)?))
            .await
    }
}

/// `/accounts/{id}`, accepting only ids made of URL-unreserved characters.
fn account_path(id: &str) -> Result<String, ApiError> {
    if id.is_empty() {
        return Err(ApiError::InvalidRequest("Account id is empty".to_string()));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
        || id == "."
        || id == ".."
    {
        return Err(ApiError::InvalidRequest(format!(
            "Account id {id:?} is not a valid path segment"
        )));
    }
    Ok(format!("{ACCOUNTS_PATH}/{id}"))
}
