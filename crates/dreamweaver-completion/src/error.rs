use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    /// Network failure, timeout, rate limit or 5xx. The whole turn may be retried.
    #[error("completion service unavailable: {0}")]
    Transient(String),

    /// The provider rejected the payload. Retrying it unmodified will fail again.
    #[error("completion rejected: {0}")]
    Permanent(String),

    #[error("completion cancelled")]
    Cancelled,
}

impl CompletionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub(crate) fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
            Self::Transient(error.to_string())
        } else {
            Self::Permanent(error.to_string())
        }
    }
}
