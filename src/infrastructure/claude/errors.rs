use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when interacting with the Claude API
#[derive(Error, Debug)]
pub enum ClaudeApiError {
    /// Invalid request parameters (HTTP 400)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid or missing API key (HTTP 401)
    #[error("Invalid API key - authentication failed")]
    InvalidApiKey,

    /// Forbidden - permission denied (HTTP 403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown model or endpoint (HTTP 404)
    #[error("Resource not found")]
    NotFound,

    /// Rate limit exceeded (HTTP 429)
    #[error("Rate limit exceeded - too many requests")]
    RateLimitExceeded,

    /// Server error from Claude API (HTTP 500, 502, 503, 504, 529)
    #[error("Server error ({0}): {1}")]
    ServerError(StatusCode, String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(reqwest::Error),

    /// Response body did not match the Messages API shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Unknown or unexpected error
    #[error("Unknown error ({0}): {1}")]
    UnknownError(StatusCode, String),
}

impl ClaudeApiError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status {
            StatusCode::BAD_REQUEST => Self::InvalidRequest(body),
            StatusCode::UNAUTHORIZED => Self::InvalidApiKey,
            StatusCode::FORBIDDEN => Self::Forbidden(body),
            StatusCode::NOT_FOUND => Self::NotFound,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimitExceeded,
            status if status.is_server_error() => Self::ServerError(status, body),
            _ => Self::UnknownError(status, body),
        }
    }

    /// Returns true if this error is transient and should be retried
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded | Self::ServerError(_, _) | Self::Timeout | Self::NetworkError(_)
        )
    }

    /// Returns true if this is a permanent error that should not be retried
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::InvalidApiKey | Self::Forbidden(_) | Self::NotFound
        )
    }
}

impl From<reqwest::Error> for ClaudeApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::NetworkError(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(ClaudeApiError::RateLimitExceeded.is_transient());
        assert!(
            ClaudeApiError::ServerError(StatusCode::INTERNAL_SERVER_ERROR, "test".to_string())
                .is_transient()
        );
        assert!(ClaudeApiError::Timeout.is_transient());
    }

    #[test]
    fn test_permanent_errors() {
        assert!(ClaudeApiError::InvalidRequest("test".to_string()).is_permanent());
        assert!(ClaudeApiError::InvalidApiKey.is_permanent());
        assert!(ClaudeApiError::Forbidden("test".to_string()).is_permanent());
        assert!(ClaudeApiError::NotFound.is_permanent());
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ClaudeApiError::from_status(StatusCode::UNAUTHORIZED, String::new()),
            ClaudeApiError::InvalidApiKey
        ));
        let overloaded = StatusCode::from_u16(529).unwrap();
        assert!(ClaudeApiError::from_status(overloaded, "overloaded".to_string()).is_transient());
        assert!(matches!(
            ClaudeApiError::from_status(StatusCode::IM_A_TEAPOT, String::new()),
            ClaudeApiError::UnknownError(_, _)
        ));
    }

    #[test]
    fn test_malformed_response_is_neither_transient_nor_permanent() {
        let err = ClaudeApiError::MalformedResponse("missing field".to_string());
        assert!(!err.is_transient());
        assert!(!err.is_permanent());
    }
}
