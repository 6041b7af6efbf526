//! Error-body sanitizing.
//!
//! Server error bodies end up inside error values and log lines. Some
//! backends echo the `Authorization` header or the submitted token back in
//! their error detail, so bodies are scrubbed before they leave the client.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum length for an error body carried in an error value.
pub const MAX_ERROR_BODY_LEN: usize = 256;

/// Regex pattern for JWT tokens (header.payload.signature).
#[allow(clippy::expect_used)] // constant pattern, covered by tests
static JWT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+(?:\.[A-Za-z0-9_-]*)?").expect("valid JWT regex")
});

/// Regex pattern for Bearer credentials in text.
#[allow(clippy::expect_used)] // constant pattern, covered by tests
static BEARER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+").expect("valid bearer regex")
});

/// Sanitize an error response body.
///
/// - Removes `Bearer <credential>` runs first so the whole header value goes
/// - Removes standalone JWTs (`eyJ...`)
/// - Truncates to [`MAX_ERROR_BODY_LEN`] bytes on a char boundary
#[must_use]
pub fn sanitize_error_body(body: &str) -> String {
    let sanitized = BEARER_PATTERN.replace_all(body, "[BEARER_REDACTED]");
    let sanitized = JWT_PATTERN.replace_all(&sanitized, "[JWT_REDACTED]");

    if sanitized.len() > MAX_ERROR_BODY_LEN {
        let mut cut = MAX_ERROR_BODY_LEN;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        let head = sanitized.get(..cut).unwrap_or_default();
        format!("{head}...[truncated]")
    } else {
        sanitized.into_owned()
    }
}
