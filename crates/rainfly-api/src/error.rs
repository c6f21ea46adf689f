use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `rainfly-api` crate.
///
/// Local controllers report failures through HTTP status codes, the remote
/// API answers HTTP 200 and embeds an `errorType` in the body. Both are
/// folded into this one taxonomy by the response normalizer.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Connection could not be established (DNS failure, refused, TLS).
    #[error("Cannot connect to {url}: {message}")]
    Connectivity { url: String, message: String },

    /// The per-request timeout elapsed.
    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// The peer closed the connection mid-request.
    ///
    /// Retried once by the controller; callers normally never see it.
    #[error("Connection to {url} was closed by the peer")]
    PeerDisconnected { url: String },

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// HTTP client could not be built (bad CA file, TLS backend failure).
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Response ────────────────────────────────────────────────────
    /// Response body was not valid JSON, or lacked an expected field.
    #[error("Malformed response from {url}: {message}")]
    MalformedResponse {
        url: String,
        message: String,
        body: String,
    },

    /// The API reported a failure (HTTP status and/or embedded error code).
    #[error("Request to {url} failed: {message}")]
    Request {
        url: String,
        message: String,
        status: Option<u16>,
        code: Option<i64>,
    },

    // ── Session ─────────────────────────────────────────────────────
    /// The access token is no longer accepted and could not be refreshed,
    /// or the API explicitly reported the caller as unauthenticated.
    #[error("Access token expired: {message}")]
    TokenExpired { message: String },

    /// The endpoint is not recognized by the controller, or is known to be
    /// broken on the remote API.
    #[error("Unknown API call: {message}")]
    UnknownApiCall { message: String },
}

impl Error {
    /// Returns `true` for normalized request failures, including bodies
    /// that could not be parsed.
    pub fn is_request_error(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::MalformedResponse { .. })
    }

    /// Returns `true` if re-authenticating might resolve this error.
    pub fn is_auth_rejected(&self) -> bool {
        matches!(self, Self::TokenExpired { .. })
    }

    /// Returns `true` for connection-level failures a caller may retry later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connectivity { .. } | Self::Timeout { .. } | Self::PeerDisconnected { .. }
        )
    }

    /// The embedded remote error code, if the failure carried one.
    pub fn remote_code(&self) -> Option<i64> {
        match self {
            Self::Request { code, .. } => *code,
            _ => None,
        }
    }

    /// The HTTP status of the failed response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => *status,
            _ => None,
        }
    }

    pub(crate) fn malformed(url: &str, message: impl Into<String>, body: String) -> Self {
        Self::MalformedResponse {
            url: url.to_owned(),
            message: message.into(),
            body,
        }
    }

    /// Attribute a shape error to the request it came from. Errors that
    /// already name a URL are left alone.
    pub(crate) fn at(self, request_url: &str) -> Self {
        match self {
            Self::MalformedResponse { url, message, body } if url.is_empty() => {
                Self::MalformedResponse {
                    url: request_url.to_owned(),
                    message,
                    body,
                }
            }
            other => other,
        }
    }

    /// Error for a successful response that lacks a field the caller needs.
    pub(crate) fn missing_field(field: &str) -> Self {
        Self::MalformedResponse {
            url: String::new(),
            message: format!("response has no `{field}` field"),
            body: String::new(),
        }
    }
}
