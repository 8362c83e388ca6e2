use thiserror::Error;
use uuid::Uuid;

use dreamweaver_types::api::ErrorKind;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Another turn is still outstanding on this session.
    #[error("a message is already being sent")]
    Busy,

    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Api {
        status: u16,
        kind: ErrorKind,
        message: String,
        chat_id: Option<Uuid>,
    },

    #[error("could not reach the server: {0}")]
    Transport(String),

    #[error("cancelled")]
    Cancelled,

    #[error("not signed in")]
    SignedOut,
}

impl ClientError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Text for the inline notice shown under a failed turn.
    pub fn notice(&self) -> String {
        match self {
            Self::Api { kind: ErrorKind::UpstreamTransient, .. } | Self::Transport(_) => {
                "Sorry, I'm having trouble responding right now. Please try again.".to_string()
            }
            Self::Api { kind: ErrorKind::Unauthenticated | ErrorKind::Forbidden, .. } | Self::SignedOut => {
                "Your session has expired. Please sign in again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}
