use std::fmt;

use serde::Serialize;

/// No-response failure: DNS/connect, timeout, TLS or body read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportError {
    message: String,
    timeout: bool,
    retryable: bool,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
            retryable: true,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: true,
            retryable: true,
        }
    }

    /// A failure that repeating the same request cannot fix, e.g. a malformed header.
    pub fn terminal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timeout: false,
            retryable: false,
        }
    }

    /// Human-readable cause.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_timeout(&self) -> bool {
        self.timeout
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest hides the root cause behind `source()`; flatten the chain so
        // the message names the actual DNS/TLS/connect failure.
        let mut message = err.to_string();
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            message,
            timeout: err.is_timeout(),
            retryable: should_retry(&err),
        }
    }
}

// Builder, redirect and decode failures repeat identically on every attempt.
fn should_retry(err: &reqwest::Error) -> bool {
    !err.is_builder()
        && (err.is_timeout() || err.is_connect() || err.is_request() || err.is_body())
}

/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum MongoHttpError {
    /// No response reached the client.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// Response reached, status outside 2xx.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },
    /// Response body does not match the expected envelope shape.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Caller supplied an invalid parameter; no request was sent.
    #[error("validation error: {0}")]
    Validation(String),
    /// The API service reported `"success": false`.
    #[error("api error: {message}")]
    Api { message: String },
    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {0}")]
    Config(String),
}

/// Stable classification of [`MongoHttpError`], recorded in
/// [`LastError`](crate::LastError).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Transport,
    HttpStatus,
    Protocol,
    Validation,
    Api,
    Config,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::HttpStatus => "http_status",
            Self::Protocol => "protocol",
            Self::Validation => "validation",
            Self::Api => "api",
            Self::Config => "config",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MongoHttpError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::Transport,
            Self::Http { .. } => ErrorCode::HttpStatus,
            Self::Protocol(_) => ErrorCode::Protocol,
            Self::Validation(_) => ErrorCode::Validation,
            Self::Api { .. } => ErrorCode::Api,
            Self::Config(_) => ErrorCode::Config,
        }
    }

    /// Whether the retry policy may re-attempt the request that produced this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            Self::Http { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    /// Short summary used as [`LastError::message`](crate::LastError).
    pub(crate) fn summary(&self) -> String {
        match self {
            Self::Transport(err) if err.is_timeout() => "request timed out".to_owned(),
            Self::Transport(_) => "request failed before a response was received".to_owned(),
            Self::Http { status, .. } => format!("HTTP request failed with status code: {status}"),
            Self::Protocol(_) => "unexpected response shape".to_owned(),
            Self::Validation(message) => message.clone(),
            Self::Api { message } => message.clone(),
            Self::Config(message) => message.clone(),
        }
    }

    /// Longer description used as [`LastError::detail`](crate::LastError).
    pub(crate) fn detail(&self) -> String {
        match self {
            Self::Transport(err) => err.message().to_owned(),
            Self::Http { body, .. } => body.clone(),
            Self::Protocol(detail) => detail.clone(),
            Self::Validation(_) | Self::Api { .. } | Self::Config(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorCode, MongoHttpError, TransportError};

    #[test]
    fn retryable_classification() {
        assert!(MongoHttpError::Transport(TransportError::new("refused")).is_retryable());
        assert!(MongoHttpError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
        assert!(!MongoHttpError::Http {
            status: 400,
            body: String::new()
        }
        .is_retryable());
        assert!(!MongoHttpError::Transport(TransportError::terminal("bad header")).is_retryable());
        assert!(!MongoHttpError::Validation("x".to_owned()).is_retryable());
        assert!(!MongoHttpError::Api {
            message: "dup key".to_owned()
        }
        .is_retryable());
    }

    #[test]
    fn codes_are_stable() {
        let err = MongoHttpError::Http {
            status: 404,
            body: "missing".to_owned(),
        };
        assert_eq!(err.code(), ErrorCode::HttpStatus);
        assert_eq!(err.code().to_string(), "http_status");
        assert_eq!(err.summary(), "HTTP request failed with status code: 404");
        assert_eq!(err.detail(), "missing");
    }

    #[test]
    fn timeout_flag_is_kept() {
        let err = TransportError::timeout("deadline elapsed");
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "deadline elapsed");
    }
}
