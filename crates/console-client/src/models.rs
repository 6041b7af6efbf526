//! Wire types for the console API.

use common::secret::SecretString;
use serde::{Deserialize, Serialize};

/// Response from `/token` and `/refresh`.
#[derive(Clone, Deserialize)]
pub struct AuthResponse {
    pub access_token: SecretString,
    pub token_type: String,
    pub role: String,
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub access_token_expires_in: Option<u64>,
    /// Refresh token lifetime in seconds.
    #[serde(default)]
    pub refresh_token_expires_in: Option<u64>,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("role", &self.role)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("access_token_expires_in", &self.access_token_expires_in)
            .field("refresh_token_expires_in", &self.refresh_token_expires_in)
            .finish()
    }
}

/// A customer account as returned by `GET /accounts/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub account_holder_name: String,
    pub dob: String,
    pub gender: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub zip_code: String,
    pub account_type: String,
    pub balance: f64,
    pub date_opened: String,
    pub status: String,
    /// Comma-separated service codes.
    pub services: String,
    pub marketing_opt_in: bool,
    pub agreed_to_terms: bool,
}

/// Body for `POST /accounts`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewAccount {
    pub account_holder_name: String,
    pub dob: String,
    pub gender: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub zip_code: String,
    pub account_type: String,
    pub balance: f64,
    pub status: String,
    pub services: String,
    pub marketing_opt_in: bool,
    pub agreed_to_terms: bool,
}

impl NewAccount {
    /// Start a new account with the server-side defaults (zero balance, `Active`).
    #[must_use]
    pub fn new(account_holder_name: impl Into<String>, account_type: impl Into<String>) -> Self {
        Self {
            account_holder_name: account_holder_name.into(),
            dob: String::new(),
            gender: String::new(),
            email: String::new(),
            phone: String::new(),
            address: String::new(),
            zip_code: String::new(),
            account_type: account_type.into(),
            balance: 0.0,
            status: "Active".to_string(),
            services: String::new(),
            marketing_opt_in: false,
            agreed_to_terms: false,
        }
    }
}

/// Body for `PUT /accounts/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountUpdate {
    pub account_holder_name: String,
    pub dob: String,
    pub gender: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub zip_code: String,
    pub account_type: String,
    pub balance: f64,
    pub status: String,
    pub services: String,
    pub marketing_opt_in: bool,
}

impl From<&Account> for AccountUpdate {
    fn from(account: &Account) -> Self {
        Self {
            account_holder_name: account.account_holder_name.clone(),
            dob: account.dob.clone(),
            gender: account.gender.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
            address: account.address.clone(),
            zip_code: account.zip_code.clone(),
            account_type: account.account_type.clone(),
            balance: account.balance,
            status: account.status.clone(),
            services: account.services.clone(),
            marketing_opt_in: account.marketing_opt_in,
        }
    }
}

/// Response from `POST /accounts`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountCreated {
    pub account_id: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Acknowledgement body from `PUT` / `DELETE`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
