/// Row types mapping directly to SQLite rows.
/// Distinct from dreamweaver-types models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub name: String,
    pub email: String,
    /// `None` for accounts created through a social provider.
    pub password: Option<String>,
    pub provider: String,
    pub gender: Option<String>,
    pub assistant_type: Option<String>,
    pub language: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: String,
}

pub struct ChatRow {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Chat row plus the aggregates the chat list needs.
pub struct ChatListRow {
    pub chat: ChatRow,
    pub message_count: i64,
    pub last_content: Option<String>,
}

pub struct MessageRow {
    pub seq: i64,
    pub id: String,
    pub chat_id: String,
    pub sender: String,
    pub content: String,
    pub image: Option<String>,
    pub created_at: String,
}

pub struct NewMessage<'a> {
    pub id: &'a str,
    pub sender: &'a str,
    pub content: &'a str,
    pub image: Option<&'a str>,
    pub created_at: &'a str,
}

pub struct NewFeedback<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub chat_id: &'a str,
    pub message_id: Option<&'a str>,
    pub rating: u8,
    pub feedback: Option<&'a str>,
    pub technical_slipped: bool,
    pub created_at: &'a str,
}
