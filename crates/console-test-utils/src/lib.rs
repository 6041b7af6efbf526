//! # Console Test Utilities
//!
//! Shared test utilities for the console client.
//!
//! This crate provides:
//! - Mock console API (`MockBankBackend`, built on `wiremock`)
//! - Fixture bodies for auth and account responses
//!
//! ## Usage
//!
//! ```rust,ignore
//! use console_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> Result<()> {
//!     let backend = MockBankBackend::start().await;
//!     backend.mount_login("at-1", "teller").await;
//!
//!     let (session, _events) = backend.session();
//!     session.login("teller01", &SecretString::from("pw")).await?;
//!     Ok(())
//! }
//! ```

pub mod mock_backend;

// Re-export commonly used items
pub use mock_backend::*;
