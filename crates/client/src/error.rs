use std::time::Duration;

use serde_json::Value;

use crate::retry::{classify_status, FailureClass};
use crate::transport::TransportError;

/// Coarse category of an [`ApiError`], for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    Network,
    Timeout,
    /// 408/429/5xx worth retrying.
    Server,
    /// 401/403.
    Auth,
    /// Any other non-success status.
    Client,
    /// Unexpected failure inside the transport, or an unreadable body.
    Fetch,
    Aborted,
    /// Rejected locally before any network call.
    Validation,
}

/// Errors returned by the API client.
///
/// The client resolves every call to `Result<_, ApiError>`; nothing on the
/// request path panics or propagates a panic.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server returned a non-2xx status.
    #[error("API error ({status}): {message}")]
    Http {
        status: u16,
        message: String,
        body: Value,
    },

    #[error("Request failed: {0}")]
    Fetch(String),

    #[error("Response did not match the expected shape: {0}")]
    Decode(String),

    #[error("Request aborted")]
    Aborted,

    #[error("{0}")]
    Validation(String),
}

impl ApiError {
    /// Build from a non-2xx response, pulling a message out of the body.
    pub fn from_response(status: u16, body: Value) -> Self {
        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .or_else(|| body.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("HTTP {status}"));
        Self::Http {
            status,
            message,
            body,
        }
    }

    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Network(_) => ApiErrorKind::Network,
            Self::Timeout(_) => ApiErrorKind::Timeout,
            Self::Http { status, .. } => match classify_status(*status) {
                Some(FailureClass::Auth) => ApiErrorKind::Auth,
                Some(FailureClass::Retryable) => ApiErrorKind::Server,
                Some(FailureClass::Client) | None => ApiErrorKind::Client,
            },
            Self::Fetch(_) | Self::Decode(_) => ApiErrorKind::Fetch,
            Self::Aborted => ApiErrorKind::Aborted,
            Self::Validation(_) => ApiErrorKind::Validation,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ApiErrorKind::Network | ApiErrorKind::Timeout | ApiErrorKind::Server
        )
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ApiErrorKind::Auth
    }

    /// Whether the request never reached the server, so replaying it
    /// later is meaningful.
    pub fn is_offline(&self) -> bool {
        matches!(self.kind(), ApiErrorKind::Network | ApiErrorKind::Timeout)
    }

    /// Text suitable for an inline form error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { message, .. } | Self::Validation(message) => message.clone(),
            Self::Network(_) | Self::Timeout(_) => {
                "Unable to reach the server. Check your connection and try again.".into()
            }
            _ => "Something went wrong. Please try again.".into(),
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Network(msg) => Self::Network(msg),
            TransportError::Timeout(after) => Self::Timeout(after),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kinds_follow_status_class() {
        assert_eq!(ApiError::from_response(401, Value::Null).kind(), ApiErrorKind::Auth);
        assert_eq!(ApiError::from_response(503, Value::Null).kind(), ApiErrorKind::Server);
        assert_eq!(ApiError::from_response(422, Value::Null).kind(), ApiErrorKind::Client);
        assert!(ApiError::Network("refused".into()).is_retryable());
        assert!(ApiError::Timeout(Duration::from_secs(8)).is_retryable());
        assert!(!ApiError::from_response(400, Value::Null).is_retryable());
        assert!(!ApiError::Aborted.is_retryable());
    }

    #[test]
    fn message_prefers_body_message() {
        let err = ApiError::from_response(400, json!({"message": "Invalid OTP"}));
        assert_eq!(err.user_message(), "Invalid OTP");
        assert_eq!(err.to_string(), "API error (400): Invalid OTP");

        let err = ApiError::from_response(500, json!("upstream down"));
        assert_eq!(err.user_message(), "upstream down");

        let err = ApiError::from_response(404, json!({}));
        assert_eq!(err.user_message(), "HTTP 404");
    }

    #[test]
    fn only_pre_server_failures_are_offline() {
        assert!(ApiError::Network("x".into()).is_offline());
        assert!(!ApiError::from_response(503, Value::Null).is_offline());
    }
}
