//! Teller Console Client Library
//!
//! Authenticated HTTP access to the console API for back-office staff,
//! with a single-flight token refresh and an observable session.
//!
//! # Modules
//!
//! - `client` - Authenticated client and the refresh protocol
//! - `session` - Login, logout, startup restore
//! - `refresh` - Single-flight refresh gate and pending queue
//! - `state` - Observable session state
//! - `token_store` - In-memory credential storage
//! - `accounts` - Typed accounts endpoints
//! - `prefs` - Persisted non-secret preferences
//! - `cookies` - Refresh cookie jar, persisted next to the prefs
//! - `config` - Client configuration
//! - `errors` - Error types

pub mod accounts;
pub mod client;
pub mod config;
pub mod context;
pub mod cookies;
pub mod errors;
pub mod models;
pub mod observability;
pub mod prefs;
pub mod refresh;
pub mod session;
pub mod signal;
pub mod state;
pub mod token_store;

pub use accounts::AccountsApi;
pub use client::{AuthenticatedClient, RefreshCause};
pub use config::ClientConfig;
pub use context::ApiRequest;
pub use errors::ApiError;
pub use session::AuthSession;
pub use state::{Session, SessionStatus};
