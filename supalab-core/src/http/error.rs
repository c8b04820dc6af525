//! Errors of the REST calls made against a Supabase project.
//!
//! GoTrue and the functions gateway do not agree on an error body. Auth
//! answers `{"code": 400, "error_code": "invalid_credentials", "msg": ...}`,
//! older auth versions `{"error": ..., "error_description": ...}`, and a
//! function may answer with plain text. [`HttpError::from_body`] picks the
//! most useful message out of any of them.
//!
//! ```
//! use reqwest::StatusCode;
//! use supalab_core::http::HttpError;
//!
//! let err = HttpError::from_body(
//!     StatusCode::BAD_REQUEST,
//!     r#"{"error_code": "invalid_credentials", "msg": "Invalid login credentials"}"#,
//! );
//! assert_eq!(err.message(), "Invalid login credentials");
//! assert_eq!(err.error_code(), Some("invalid_credentials"));
//! ```

use reqwest::StatusCode;
use serde_json::Value;

/// Body fields that may carry a readable message, best first.
const MESSAGE_FIELDS: [&str; 4] = ["error_description", "msg", "message", "error"];

/// Plain text bodies longer than this are replaced by the status reason.
const MAX_PLAIN_BODY: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The server answered with an error status
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        error_code: Option<String>,
    },

    #[error("Network error: {0}")]
    Network(reqwest::Error),

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::http(status.as_u16(), err.to_string())
        } else if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else {
            Self::Network(err)
        }
    }
}

fn reason(status: StatusCode) -> String {
    status.canonical_reason().unwrap_or("HTTP error").to_string()
}

impl HttpError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            error_code: None,
        }
    }

    /// Build the error for a non-success response from its body.
    pub fn from_body(status: StatusCode, body: &str) -> Self {
        let json = serde_json::from_str::<Value>(body).ok();
        let field = |name: &str| {
            json.as_ref()
                .and_then(|j| j.get(name))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        let message = MESSAGE_FIELDS
            .iter()
            .find_map(|name| field(name))
            .or_else(|| {
                let body = body.trim();
                (json.is_none() && !body.is_empty() && body.len() < MAX_PLAIN_BODY)
                    .then(|| body.to_string())
            })
            .unwrap_or_else(|| reason(status));

        Self::Http {
            status: status.as_u16(),
            message,
            error_code: field("error_code"),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The message the server sent, without the status prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// GoTrue's machine readable code, e.g. `invalid_credentials`.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Http { error_code, .. } => error_code.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_field_precedence() {
        let err = HttpError::from_body(
            StatusCode::BAD_REQUEST,
            r#"{"error": "invalid_grant", "error_description": "Email not confirmed"}"#,
        );
        assert_eq!(err.to_string(), "HTTP 400: Email not confirmed");
        assert_eq!(err.error_code(), None);

        let err = HttpError::from_body(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code": 422, "error_code": "weak_password", "msg": "Password is too short"}"#,
        );
        assert_eq!(err.status_code(), Some(422));
        assert_eq!(err.message(), "Password is too short");
        assert_eq!(err.error_code(), Some("weak_password"));
    }

    #[test]
    fn test_plain_and_empty_bodies() {
        let err = HttpError::from_body(StatusCode::NOT_FOUND, "Function not found\n");
        assert_eq!(err.message(), "Function not found");

        let err = HttpError::from_body(StatusCode::BAD_GATEWAY, "");
        assert_eq!(err.message(), "Bad Gateway");

        let err = HttpError::from_body(StatusCode::INTERNAL_SERVER_ERROR, &"x".repeat(600));
        assert_eq!(err.message(), "Internal Server Error");

        // JSON without any known field is not shown raw
        let err = HttpError::from_body(StatusCode::FORBIDDEN, r#"{"code": 403}"#);
        assert_eq!(err.message(), "Forbidden");
        assert_eq!(err.status_code(), Some(403));
    }

    #[test]
    fn test_non_status_errors() {
        let err = HttpError::Timeout;
        assert_eq!(err.status_code(), None);
        assert_eq!(err.message(), "Request timeout");

        let err = HttpError::ParseError("expected value".to_string());
        assert_eq!(err.to_string(), "Failed to parse response: expected value");
    }

    #[tokio::test]
    async fn test_from_reqwest_status_error() {
        use wiremock::{
            matchers::{method, path},
            Mock, MockServer, ResponseTemplate,
        };

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/v1/settings"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let response = reqwest::Client::new()
            .get(format!("{}/auth/v1/settings", server.uri()))
            .send()
            .await
            .unwrap();
        let err: HttpError = response.error_for_status().unwrap_err().into();

        assert_eq!(err.status_code(), Some(404));
        assert!(matches!(err, HttpError::Http { .. }));
    }
}
