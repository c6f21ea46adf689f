// Response normalization
//
// Local controllers use HTTP status codes; the remote API always answers
// 200 and reports failures through an `errorType` field in the body. Both
// signals are merged here into a single success flag and a typed error.

use serde_json::Value;

use crate::error::Error;
use crate::transport::RawResponse;

/// Body key carrying the remote API error code.
pub const ERROR_TYPE_FIELD: &str = "errorType";

/// Code used for remote errors missing from the table.
pub const UNKNOWN_ERROR_CODE: i64 = 99;

/// How a remote error code is surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Request,
    UnknownApiCall,
    Unauthenticated,
}

/// A resolved remote error: the code as received plus its table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDescriptor {
    pub code: i64,
    pub message: &'static str,
    pub class: ErrorClass,
}

const REMOTE_ERROR_CODES: &[(i64, &str, ErrorClass)] = &[
    (1, "The email has not been validated", ErrorClass::Request),
    (2, "Invalid email or password", ErrorClass::Request),
    (3, "The sprinkler is not connected to the cloud", ErrorClass::Request),
    (4, "Invalid sprinkler password", ErrorClass::Request),
    (5, "Unknown API call", ErrorClass::UnknownApiCall),
    (6, "Not authenticated", ErrorClass::Unauthenticated),
    (UNKNOWN_ERROR_CODE, "Unknown error", ErrorClass::Request),
];

impl ErrorDescriptor {
    /// Look up `code` in the static table, falling back to the generic
    /// "unknown error" entry.
    pub fn resolve(code: i64) -> Self {
        let (message, class) = REMOTE_ERROR_CODES
            .iter()
            .find(|(c, _, _)| *c == code)
            .or_else(|| {
                REMOTE_ERROR_CODES
                    .iter()
                    .find(|(c, _, _)| *c == UNKNOWN_ERROR_CODE)
            })
            .map_or(("Unknown error", ErrorClass::Request), |(_, m, k)| (*m, *k));
        Self {
            code,
            message,
            class,
        }
    }

    /// Whether `code` has its own entry (not the fallback).
    pub fn is_known(code: i64) -> bool {
        REMOTE_ERROR_CODES.iter().any(|(c, _, _)| *c == code)
    }
}

/// A parsed response with the merged success decision.
#[derive(Debug, Clone)]
pub struct NormalizedResponse {
    pub body: Value,
    pub status: u16,
    pub successful: bool,
    pub error: Option<ErrorDescriptor>,
    pub request_url: String,
}

/// Parse a raw response and decide whether it succeeded.
///
/// Fails only when the body is not JSON; API-level failures are recorded
/// on the returned value and raised by [`NormalizedResponse::into_result`].
pub fn normalize(raw: RawResponse) -> Result<NormalizedResponse, Error> {
    let body: Value = serde_json::from_str(&raw.body).map_err(|e| {
        let preview = preview(&raw.body);
        Error::malformed(
            &raw.url,
            format!("HTTP {}: {e} (body preview: {preview:?})", raw.status),
            raw.body.clone(),
        )
    })?;

    let mut successful = (200..300).contains(&raw.status);

    let error = match body.get(ERROR_TYPE_FIELD).and_then(Value::as_i64) {
        Some(code) if code != 0 => {
            successful = false;
            Some(ErrorDescriptor::resolve(code))
        }
        _ => None,
    };

    Ok(NormalizedResponse {
        body,
        status: raw.status,
        successful,
        error,
        request_url: raw.url,
    })
}

impl NormalizedResponse {
    /// Return the JSON body, or the typed error if the call failed.
    pub fn into_result(self) -> Result<Value, Error> {
        if self.successful {
            return Ok(self.body);
        }

        let url = self.request_url;

        if let Some(descriptor) = self.error {
            let message = descriptor.message.to_owned();
            return Err(match descriptor.class {
                ErrorClass::Request => Error::Request {
                    url,
                    message,
                    status: Some(self.status),
                    code: Some(descriptor.code),
                },
                ErrorClass::UnknownApiCall => Error::UnknownApiCall {
                    message: format!("{message} ({url})"),
                },
                ErrorClass::Unauthenticated => Error::TokenExpired { message },
            });
        }

        let message = status_message(self.status, &self.body);
        Err(match self.status {
            401 => Error::TokenExpired { message },
            404 => Error::UnknownApiCall {
                message: format!("{message} ({url})"),
            },
            status => Error::Request {
                url,
                message,
                status: Some(status),
                code: None,
            },
        })
    }
}

/// `HTTP 400 Bad Request`, plus the body's `message` field when present.
fn status_message(status: u16, body: &Value) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status");
    match body.get("message").and_then(Value::as_str) {
        Some(detail) if !detail.is_empty() => format!("HTTP {status} {reason}: {detail}"),
        _ => format!("HTTP {status} {reason}"),
    }
}

fn preview(body: &str) -> &str {
    let end = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(idx, _)| idx);
    &body[..end]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn raw(status: u16, body: &Value) -> RawResponse {
        RawResponse {
            status,
            url: "https://192.168.1.100:8081/api/4/zone".into(),
            body: body.to_string(),
            ..RawResponse::default()
        }
    }

    #[test]
    fn every_table_code_fails_with_its_message() {
        for (code, message, class) in REMOTE_ERROR_CODES {
            let resp = normalize(raw(200, &json!({ "errorType": code }))).unwrap();
            assert!(!resp.successful, "code {code} should fail");
            let descriptor = resp.error.unwrap();
            assert_eq!(descriptor.message, *message);
            assert_eq!(descriptor.class, *class);
        }
    }

    #[test]
    fn unknown_code_falls_back_to_generic_entry() {
        let resp = normalize(raw(200, &json!({ "errorType": 1234 }))).unwrap();
        let descriptor = resp.error.unwrap();
        assert_eq!(descriptor.code, 1234);
        assert_eq!(descriptor.message, "Unknown error");
        assert!(!ErrorDescriptor::is_known(1234));

        match resp_err(200, &json!({ "errorType": 1234 })) {
            Error::Request { message, code, .. } => {
                assert_eq!(message, "Unknown error");
                assert_eq!(code, Some(1234));
            }
            other => panic!("expected Request error, got {other:?}"),
        }
    }

    fn resp_err(status: u16, body: &Value) -> Error {
        normalize(raw(status, body))
            .unwrap()
            .into_result()
            .unwrap_err()
    }

    #[test]
    fn bad_status_without_code_uses_status_message() {
        match resp_err(400, &json!({})) {
            Error::Request {
                message, status, ..
            } => {
                assert_eq!(message, "HTTP 400 Bad Request");
                assert_eq!(status, Some(400));
            }
            other => panic!("expected Request error, got {other:?}"),
        }
    }

    #[test]
    fn remote_message_wins_over_status_message() {
        match resp_err(400, &json!({ "errorType": 2, "message": "bad" })) {
            Error::Request { message, .. } => assert_eq!(message, "Invalid email or password"),
            other => panic!("expected Request error, got {other:?}"),
        }
    }

    #[test]
    fn zero_or_absent_code_is_success() {
        let body = json!({ "errorType": 0, "name": 89 });
        let value = normalize(raw(200, &body)).unwrap().into_result().unwrap();
        assert_eq!(value["name"], 89);

        let resp = normalize(raw(200, &json!({ "zones": [] }))).unwrap();
        assert!(resp.successful);
        assert!(resp.error.is_none());
    }

    #[test]
    fn unauthorized_maps_to_token_expired() {
        let err = resp_err(401, &json!({ "statusCode": 2, "message": "Not Authenticated !" }));
        assert!(err.is_auth_rejected());

        let err = resp_err(200, &json!({ "errorType": 6 }));
        assert!(err.is_auth_rejected());
    }

    #[test]
    fn unknown_api_call_code() {
        let err = resp_err(400, &json!({ "errorType": 5 }));
        assert!(matches!(err, Error::UnknownApiCall { .. }), "got {err:?}");
    }

    #[test]
    fn non_json_body_is_malformed() {
        let response = RawResponse {
            status: 404,
            url: "https://host/api/4/zone".into(),
            body: "404 Not Found".into(),
            ..RawResponse::default()
        };
        let err = normalize(response).unwrap_err();
        assert!(matches!(err, Error::MalformedResponse { .. }));
        assert!(err.is_request_error());
    }
}
