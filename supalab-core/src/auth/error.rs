use crate::http::{HttpError, RetryError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The auth server answered with an error status
    #[error("{message}")]
    Rejected {
        status: u16,
        message: String,
        /// GoTrue's `error_code`, e.g. `invalid_credentials`
        error_code: Option<String>,
    },

    #[error(transparent)]
    Transport(HttpError),
}

impl AuthError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            Self::Transport(e) => e.status_code(),
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Rejected { error_code, .. } => error_code.as_deref(),
            Self::Transport(_) => None,
        }
    }

    /// The message followed by the error code in parentheses, when the
    /// server sent one.
    pub fn detail(&self) -> String {
        match self.error_code() {
            Some(code) => format!("{self} ({code})"),
            None => self.to_string(),
        }
    }

    /// The session token is no longer accepted.
    pub fn is_session_expired(&self) -> bool {
        matches!(self.status_code(), Some(401 | 403))
    }
}

impl From<HttpError> for AuthError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Http {
                status,
                message,
                error_code,
            } => Self::Rejected {
                status,
                message,
                error_code,
            },
            other => Self::Transport(other),
        }
    }
}

impl From<RetryError> for AuthError {
    fn from(err: RetryError) -> Self {
        err.into_http_error().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_rejection_keeps_error_code() {
        let err: AuthError = HttpError::from_body(
            StatusCode::BAD_REQUEST,
            r#"{"code": 400, "error_code": "invalid_credentials", "msg": "Invalid login credentials"}"#,
        )
        .into();

        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.error_code(), Some("invalid_credentials"));
        assert_eq!(err.to_string(), "Invalid login credentials");
        assert_eq!(err.detail(), "Invalid login credentials (invalid_credentials)");
    }

    #[test]
    fn test_detail_without_error_code() {
        let err: AuthError = HttpError::from_body(
            StatusCode::UNAUTHORIZED,
            r#"{"message": "invalid JWT"}"#,
        )
        .into();
        assert_eq!(err.error_code(), None);
        assert_eq!(err.detail(), "invalid JWT");
        assert!(err.is_session_expired());

        let err = AuthError::from(HttpError::Timeout);
        assert_eq!(err.error_code(), None);
        assert_eq!(err.detail(), "Request timeout");
    }
}
