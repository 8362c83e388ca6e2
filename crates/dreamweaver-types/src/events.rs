use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification that the caller's chat list changed. Subscribers re-render
/// from these instead of rebuilding lists after every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ChatListEvent {
    /// A chat was created (explicitly or by a first turn)
    Created {
        user_id: Uuid,
        chat_id: Uuid,
        title: String,
    },

    /// A turn completed or the title changed
    Updated {
        user_id: Uuid,
        chat_id: Uuid,
        title: Option<String>,
    },

    /// A chat was deleted
    Deleted { user_id: Uuid, chat_id: Uuid },
}

impl ChatListEvent {
    pub fn user_id(&self) -> Uuid {
        match self {
            Self::Created { user_id, .. }
            | Self::Updated { user_id, .. }
            | Self::Deleted { user_id, .. } => *user_id,
        }
    }

    pub fn chat_id(&self) -> Uuid {
        match self {
            Self::Created { chat_id, .. }
            | Self::Updated { chat_id, .. }
            | Self::Deleted { chat_id, .. } => *chat_id,
        }
    }
}
