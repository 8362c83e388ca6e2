use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to a chat before its first user turn.
pub const DEFAULT_CHAT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One turn of a conversation. Content may be empty when an image carries
/// the turn, but never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub sender: Sender,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, content: impl Into<String>, image: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            content: content.into(),
            image,
            timestamp: Utc::now(),
        }
    }

    /// True when neither text nor image is present.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty() && self.image.as_deref().is_none_or(str::is_empty)
    }
}

/// A persisted conversation thread. `messages` order is authoritative;
/// timestamps are informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    /// A fresh, empty chat with the placeholder title.
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: DEFAULT_CHAT_TITLE.to_string(),
            messages: Vec::new(),
            summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_user_message(&self) -> bool {
        self.messages.iter().any(|m| m.sender == Sender::User)
    }

    pub fn to_summary(&self) -> ChatSummary {
        ChatSummary {
            id: self.id,
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
            preview: self.messages.last().map(|m| preview_of(&m.content)),
        }
    }
}

/// List entry for the chat sidebar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

const PREVIEW_CHARS: usize = 40;

/// First 40 characters of a message, with an ellipsis when cut.
pub fn preview_of(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Which chat a client should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveChat {
    Existing(Uuid),
    CreateNew,
}

/// Picks the chat to show: the stored pointer when it still names one of the
/// user's chats, else the most recently created chat, else a new one.
pub fn resolve_active_chat(stored_pointer: Option<&str>, user_chats: &[ChatSummary]) -> ActiveChat {
    let pointer = stored_pointer.and_then(|p| p.trim().parse::<Uuid>().ok());
    if let Some(id) = pointer {
        if user_chats.iter().any(|c| c.id == id) {
            return ActiveChat::Existing(id);
        }
    }

    user_chats
        .iter()
        .reduce(|newest, c| if c.created_at > newest.created_at { c } else { newest })
        .map(|c| ActiveChat::Existing(c.id))
        .unwrap_or(ActiveChat::CreateNew)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssistantType {
    #[serde(rename = "Female Assistant")]
    Female,
    #[serde(rename = "Male Assistant")]
    Male,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    English,
    Hindi,
    Marathi,
}

macro_rules! closed_set {
    ($ty:ty, $($variant:path => $text:literal),+ $(,)?) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($variant => $text,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($text => Some($variant),)+
                    _ => None,
                }
            }
        }
    };
}

closed_set!(Gender, Gender::Male => "Male", Gender::Female => "Female");
closed_set!(
    AssistantType,
    AssistantType::Female => "Female Assistant",
    AssistantType::Male => "Male Assistant",
);
closed_set!(
    Language,
    Language::English => "English",
    Language::Hindi => "Hindi",
    Language::Marathi => "Marathi",
);

/// Authoritative personalization record held by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    pub name: String,
    pub email: String,
    pub gender: Option<Gender>,
    pub assistant_type: Option<AssistantType>,
    pub language: Option<Language>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}
