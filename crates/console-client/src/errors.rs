use common::sanitize::sanitize_error_body;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Errors surfaced by the authenticated client.
///
/// Payloads are plain strings so a single refresh failure can be cloned to
/// every request that was queued behind it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("Network failure: {0}")]
    Network(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed ({status}): {}", summarize(issues))]
    Validation {
        status: u16,
        issues: Vec<FieldIssue>,
    },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Session was invalidated while the request was waiting")]
    SessionInvalidated,

    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One field-level problem reported by the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    /// Dotted location, e.g. `body.email`. Empty for request-level messages.
    pub field: String,
    pub message: String,
}

fn summarize(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| {
            if i.field.is_empty() {
                i.message.clone()
            } else {
                format!("{}: {}", i.field, i.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    detail: Detail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Detail {
    Message(String),
    Issues(Vec<RawIssue>),
}

#[derive(Deserialize)]
struct RawIssue {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
}

impl ApiError {
    /// Classify a non-success response.
    ///
    /// `body` is the raw response body; it is sanitized before being kept.
    #[must_use]
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let detail = parse_detail(body);

        match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message(detail.as_ref(), body)),
            StatusCode::FORBIDDEN => ApiError::Forbidden(message(detail.as_ref(), body)),
            StatusCode::NOT_FOUND => ApiError::NotFound(message(detail.as_ref(), body)),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                let issues = match detail {
                    Some(Detail::Issues(raw)) => raw
                        .into_iter()
                        .map(|issue| FieldIssue {
                            field: issue
                                .loc
                                .iter()
                                .map(|part| match part {
                                    serde_json::Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                })
                                .collect::<Vec<_>>()
                                .join("."),
                            message: sanitize_error_body(&issue.msg),
                        })
                        .collect(),
                    Some(Detail::Message(m)) => vec![FieldIssue {
                        field: String::new(),
                        message: sanitize_error_body(&m),
                    }],
                    None => vec![FieldIssue {
                        field: String::new(),
                        message: sanitize_error_body(body),
                    }],
                };
                ApiError::Validation {
                    status: status.as_u16(),
                    issues,
                }
            }
            other => ApiError::Status {
                status: other.as_u16(),
                body: sanitize_error_body(body),
            },
        }
    }

    /// True only for the one failure class the refresh protocol recovers from.
    #[must_use]
    pub fn is_retryable_auth(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Bounded `error_kind` label for the request metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Network(_) => "network",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Validation { .. } => "validation",
            ApiError::RefreshFailed(_) => "refresh_failed",
            ApiError::SessionInvalidated => "session_invalidated",
            ApiError::Status { .. } => "status",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::InvalidResponse(_) => "invalid_response",
        }
    }
}

fn message(detail: Option<&Detail>, body: &str) -> String {
    match detail {
        Some(Detail::Message(m)) => sanitize_error_body(m),
        _ => sanitize_error_body(body),
    }
}

fn parse_detail(body: &str) -> Option<Detail> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.detail)
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            ApiError::InvalidRequest(e.to_string())
        } else if e.is_decode() {
            ApiError::InvalidResponse(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}
