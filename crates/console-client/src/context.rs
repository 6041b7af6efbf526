//! Request descriptors and per-dispatch context.
//!
//! An [`ApiRequest`] describes what to send and is never mutated after it is
//! built, so the exact same descriptor can be replayed after a refresh. The
//! retry marker travels separately as an [`Attempt`] inside the
//! [`RequestContext`] of each dispatch.

use common::types::{ProcessId, RequestId};
use reqwest::Method;
use serde::Serialize;

pub const HEADER_REQUEST_ID: &str = "X-Request-Id";
pub const HEADER_PROCESS_ID: &str = "X-Process-Id";
pub const HEADER_IDEMPOTENCY_ID: &str = "Idempotency-Id";

/// Paths that belong to the auth flow itself. A 401 from these is final.
pub const AUTH_PATHS: [&str; 3] = ["/token", "/refresh", "/logout"];

/// Request body.
#[derive(Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestBody::Json(_) => f.write_str("Json([REDACTED])"),
            RequestBody::Form(fields) => f
                .debug_tuple("Form")
                .field(&fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// Immutable description of one API call.
#[derive(Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<RequestBody>,
    headers: Vec<(&'static str, String)>,
}

// Form bodies carry the staff password; only shapes are printed.
impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("body", &self.body)
            .field(
                "headers",
                &self.headers.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ApiRequest {
    /// `path` is relative to the API base URL and must start with `/`.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Fails if `body` cannot be represented as JSON.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        self.body = Some(RequestBody::Json(serde_json::to_value(body)?));
        Ok(self)
    }

    /// Attach a form-encoded body.
    #[must_use]
    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    /// Attach an extra header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }

    /// Whether this request is part of the auth flow (never refresh-eligible).
    #[must_use]
    pub fn is_auth_endpoint(&self) -> bool {
        let path = self.path.split('?').next().unwrap_or_default();
        AUTH_PATHS.contains(&path.trim_end_matches('/'))
    }
}

/// Which dispatch of a request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// First dispatch; a 401 may start the refresh protocol.
    Initial,
    /// Replay after a refresh; a 401 is final.
    Replay,
}

impl Attempt {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Attempt::Initial => "initial",
            Attempt::Replay => "replay",
        }
    }
}

/// Correlation data for a single dispatch. Dropped when the dispatch ends.
#[derive(Debug, Clone, Copy)]
pub struct RequestContext {
    pub request_id: RequestId,
    pub process_id: ProcessId,
    pub attempt: Attempt,
}

impl RequestContext {
    /// Fresh request id, the client's process id.
    #[must_use]
    pub fn new(process_id: ProcessId, attempt: Attempt) -> Self {
        Self {
            request_id: RequestId::new(),
            process_id,
            attempt,
        }
    }
}
