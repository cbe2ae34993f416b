use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("rejected by provider: {0}")]
    Rejected(String),

    #[error("unauthorized - token may be expired")]
    Unauthorized,

    #[error("rate limited - please wait before retrying")]
    RateLimited,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    Timeout,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 300;

impl ProviderError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ProviderError::Unauthorized,
            429 => ProviderError::RateLimited,
            _ => ProviderError::Rejected(format!("status {}: {}", status, truncated)),
        }
    }

    /// Classify a transport error, separating timeouts
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Network(err)
        }
    }

    /// True when the failure means the app token is no longer accepted
    pub fn is_credential_expired(&self) -> bool {
        matches!(self, ProviderError::Unauthorized)
    }
}
