//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for every credential the console
//! touches: staff passwords, access tokens, and refresh tokens.
//!
//! `SecretString` implements `Debug` with redaction, so any struct deriving
//! `Debug` that holds one is safe to pass to `tracing`. The value is zeroized
//! on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{bearer_value, SecretString};
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct StaffLogin {
//!     username: String,
//!     password: SecretString,
//! }
//!
//! let login = StaffLogin {
//!     username: "teller01".to_string(),
//!     password: SecretString::from("hunter2"),
//! };
//!
//! // Password is redacted
//! assert!(!format!("{login:?}").contains("hunter2"));
//!
//! let token = SecretString::from("abc.def.ghi");
//! assert_eq!(bearer_value(&token).expose_secret(), "Bearer abc.def.ghi");
//! ```
//!
//! # Usage Guidelines
//!
//! Use `SecretString` for:
//! - Staff passwords submitted to `/token`
//! - Access tokens (the `Authorization: Bearer` value)
//! - Refresh tokens returned by `/token` and `/refresh`

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Build the `Authorization` header value for a bearer token.
///
/// The result stays wrapped so the formatted header never lands in a plain
/// `String` that could be logged by accident.
#[must_use]
pub fn bearer_value(token: &SecretString) -> SecretString {
    SecretString::from(format!("Bearer {}", token.expose_secret()))
}

/// Compare two secrets without exposing either one to the caller.
#[must_use]
pub fn same_secret(a: &SecretString, b: &SecretString) -> bool {
    a.expose_secret() == b.expose_secret()
}
