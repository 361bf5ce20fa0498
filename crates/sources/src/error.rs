use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::content::MediaType;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, SourceError>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid content id `{0}`")]
    InvalidId(String),

    #[error("invalid content key: {0}")]
    InvalidKey(String),

    #[error("no embed providers available for {0}")]
    NoProviders(MediaType),

    #[error("invalid url template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request to {url} failed with HTTP {status}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("no stream url in response from {0}")]
    NoStream(String),

    #[error("client configuration error: {0}")]
    Client(String),

    #[error("resolution cancelled")]
    Cancelled,

    #[error("content unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn malformed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedResponse {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }

    /// Whether another attempt against the same endpoint may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body() || e.is_decode()
            }
            Self::HttpStatus { status, .. } => {
                status.is_server_error()
                    || *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
            }
            Self::Timeout { .. } => true,
            Self::InvalidId(_)
            | Self::InvalidKey(_)
            | Self::NoProviders(_)
            | Self::InvalidTemplate { .. }
            | Self::MalformedResponse { .. }
            | Self::NoStream(_)
            | Self::Client(_)
            | Self::Cancelled
            | Self::Unavailable(_) => false,
        }
    }

    /// Terminal "nothing can be played" condition.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::InvalidId(_) | Self::InvalidKey(_) | Self::NoProviders(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_retryability() {
        assert!(SourceError::http_status(StatusCode::BAD_GATEWAY, "u").is_retryable());
        assert!(SourceError::http_status(StatusCode::TOO_MANY_REQUESTS, "u").is_retryable());
        assert!(!SourceError::http_status(StatusCode::NOT_FOUND, "u").is_retryable());
        assert!(!SourceError::http_status(StatusCode::FORBIDDEN, "u").is_retryable());
    }

    #[test]
    fn test_unavailable_classification() {
        assert!(SourceError::InvalidId("x".into()).is_unavailable());
        assert!(SourceError::NoProviders(MediaType::Movie).is_unavailable());
        assert!(!SourceError::NoStream("u".into()).is_unavailable());
        assert!(!SourceError::Cancelled.is_unavailable());
    }
}
