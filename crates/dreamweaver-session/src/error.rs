use thiserror::Error;
use uuid::Uuid;

use dreamweaver_completion::CompletionError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{0}")]
    Validation(String),

    #[error("chat not found")]
    NotFound,

    /// The completion service is unreachable or overloaded. The user turn
    /// stays in `chat_id` and a retry with the same input reuses it.
    #[error("completion service unavailable: {detail}")]
    UpstreamTransient { chat_id: Uuid, detail: String },

    #[error("completion service rejected the turn: {detail}")]
    UpstreamPermanent { chat_id: Uuid, detail: String },

    #[error("turn cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SessionError {
    pub(crate) fn from_completion(chat_id: Uuid, error: CompletionError) -> Self {
        match error {
            CompletionError::Transient(detail) => Self::UpstreamTransient { chat_id, detail },
            CompletionError::Permanent(detail) => Self::UpstreamPermanent { chat_id, detail },
            CompletionError::Cancelled => Self::Cancelled,
        }
    }
}
