use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use dreamweaver_db::Database;
use dreamweaver_db::models::{ChatRow, MessageRow, NewMessage};
use dreamweaver_types::models::{Chat, ChatSummary, Message, Sender, preview_of};

/// A message removed from a chat together with its place in the
/// conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct TakenMessage {
    pub message: Message,
    pub position: i64,
}

/// Persistence of chats keyed by owner. Every operation is scoped to
/// `user_id`; a chat owned by someone else behaves as if it did not exist.
///
/// Messages are written additively so concurrent turns on one chat never
/// overwrite each other's messages.
pub trait ChatStore: Send + Sync {
    /// The user's chats, newest first.
    fn list_chats(&self, user_id: Uuid) -> Result<Vec<ChatSummary>>;

    fn get_chat(&self, user_id: Uuid, chat_id: Uuid) -> Result<Option<Chat>>;

    /// Inserts the chat when new, otherwise rewrites its title and summary.
    /// Messages are ignored; use [`ChatStore::append_message`].
    fn save_chat(&self, chat: &Chat) -> Result<()>;

    /// Rewrites title and summary of an existing chat only. False when the
    /// chat is gone.
    fn update_chat(&self, chat: &Chat) -> Result<bool>;

    fn delete_chat(&self, user_id: Uuid, chat_id: Uuid) -> Result<bool>;

    /// Appends after every existing message. False when the chat is gone.
    fn append_message(&self, user_id: Uuid, chat_id: Uuid, message: &Message) -> Result<bool>;

    /// Removes one message. False when it was already gone.
    fn retract_message(&self, user_id: Uuid, chat_id: Uuid, message_id: Uuid) -> Result<bool>;

    /// Removes one message and hands it back, or `None` when it was already
    /// gone.
    fn take_message(&self, user_id: Uuid, chat_id: Uuid, message_id: Uuid) -> Result<Option<TakenMessage>>;

    /// Puts a taken message back where it was. False when the chat is gone.
    fn restore_message(&self, user_id: Uuid, chat_id: Uuid, taken: &TakenMessage) -> Result<bool>;
}

fn format_ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}': {}", raw, e);
        DateTime::default()
    })
}

fn parse_id(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", raw, e);
        Uuid::default()
    })
}

fn message_from_row(row: MessageRow) -> Message {
    let sender = Sender::parse(&row.sender).unwrap_or_else(|| {
        warn!("Unknown sender '{}' on message {}", row.sender, row.id);
        Sender::Assistant
    });
    Message {
        id: parse_id(&row.id),
        sender,
        content: row.content,
        image: row.image,
        timestamp: parse_ts(&row.created_at),
    }
}

fn chat_from_row(row: ChatRow, messages: Vec<Message>) -> Chat {
    Chat {
        id: parse_id(&row.id),
        user_id: parse_id(&row.user_id),
        title: row.title,
        messages,
        summary: row.summary,
        created_at: parse_ts(&row.created_at),
        updated_at: parse_ts(&row.updated_at),
    }
}

impl ChatStore for Database {
    fn list_chats(&self, user_id: Uuid) -> Result<Vec<ChatSummary>> {
        let rows = Database::list_chats(self, &user_id.to_string())?;
        Ok(rows
            .into_iter()
            .map(|row| ChatSummary {
                id: parse_id(&row.chat.id),
                title: row.chat.title,
                created_at: parse_ts(&row.chat.created_at),
                updated_at: parse_ts(&row.chat.updated_at),
                message_count: usize::try_from(row.message_count).unwrap_or_default(),
                preview: row.last_content.as_deref().map(preview_of),
            })
            .collect())
    }

    fn get_chat(&self, user_id: Uuid, chat_id: Uuid) -> Result<Option<Chat>> {
        let found = Database::get_chat(self, &user_id.to_string(), &chat_id.to_string())?;
        Ok(found.map(|(chat, messages)| {
            chat_from_row(chat, messages.into_iter().map(message_from_row).collect())
        }))
    }

    fn save_chat(&self, chat: &Chat) -> Result<()> {
        if ChatStore::update_chat(self, chat)? {
            return Ok(());
        }
        self.insert_chat(&ChatRow {
            id: chat.id.to_string(),
            user_id: chat.user_id.to_string(),
            title: chat.title.clone(),
            summary: chat.summary.clone(),
            created_at: format_ts(&chat.created_at),
            updated_at: format_ts(&chat.updated_at),
        })
    }

    fn update_chat(&self, chat: &Chat) -> Result<bool> {
        self.update_chat_meta(
            &chat.user_id.to_string(),
            &chat.id.to_string(),
            &chat.title,
            chat.summary.as_deref(),
            &format_ts(&chat.updated_at),
        )
    }

    fn delete_chat(&self, user_id: Uuid, chat_id: Uuid) -> Result<bool> {
        Database::delete_chat(self, &user_id.to_string(), &chat_id.to_string())
    }

    fn append_message(&self, user_id: Uuid, chat_id: Uuid, message: &Message) -> Result<bool> {
        let id = message.id.to_string();
        let created_at = format_ts(&message.timestamp);
        let seq = Database::append_message(
            self,
            &user_id.to_string(),
            &chat_id.to_string(),
            &NewMessage {
                id: &id,
                sender: message.sender.as_str(),
                content: &message.content,
                image: message.image.as_deref(),
                created_at: &created_at,
            },
        )?;
        Ok(seq.is_some())
    }

    fn retract_message(&self, user_id: Uuid, chat_id: Uuid, message_id: Uuid) -> Result<bool> {
        self.delete_message(&user_id.to_string(), &chat_id.to_string(), &message_id.to_string())
    }

    fn take_message(&self, user_id: Uuid, chat_id: Uuid, message_id: Uuid) -> Result<Option<TakenMessage>> {
        let row = Database::take_message(self, &user_id.to_string(), &chat_id.to_string(), &message_id.to_string())?;
        Ok(row.map(|row| {
            let position = row.seq;
            TakenMessage {
                message: message_from_row(row),
                position,
            }
        }))
    }

    fn restore_message(&self, user_id: Uuid, chat_id: Uuid, taken: &TakenMessage) -> Result<bool> {
        let message = &taken.message;
        let chat_id = chat_id.to_string();
        Database::restore_message(
            self,
            &user_id.to_string(),
            &chat_id,
            &MessageRow {
                seq: taken.position,
                id: message.id.to_string(),
                chat_id: chat_id.clone(),
                sender: message.sender.as_str().to_string(),
                content: message.content.clone(),
                image: message.image.clone(),
                created_at: format_ts(&message.timestamp),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (Database, Uuid) {
        let db = Database::open_in_memory().unwrap();
        let user_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "Asha", "asha@example.com", "hash", "2026-01-01T00:00:00.000Z")
            .unwrap();
        (db, user_id)
    }

    #[test]
    fn save_then_update_metadata() {
        let (db, user_id) = store();
        let mut chat = Chat::new(user_id);
        ChatStore::save_chat(&db, &chat).unwrap();

        chat.title = "Exam stress".into();
        chat.summary = Some("User worries about exams.".into());
        ChatStore::save_chat(&db, &chat).unwrap();

        let loaded = ChatStore::get_chat(&db, user_id, chat.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Exam stress");
        assert_eq!(loaded.summary.as_deref(), Some("User worries about exams."));
        assert_eq!(ChatStore::list_chats(&db, user_id).unwrap().len(), 1);
    }

    #[test]
    fn messages_round_trip_in_order() {
        let (db, user_id) = store();
        let chat = Chat::new(user_id);
        ChatStore::save_chat(&db, &chat).unwrap();

        let first = Message::new(Sender::User, "", Some("/uploads/sky.png".into()));
        let second = Message::new(Sender::Assistant, "What a lovely sky!", None);
        assert!(ChatStore::append_message(&db, user_id, chat.id, &first).unwrap());
        assert!(ChatStore::append_message(&db, user_id, chat.id, &second).unwrap());

        let loaded = ChatStore::get_chat(&db, user_id, chat.id).unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
        assert_eq!(loaded.messages[0].id, first.id);
        assert_eq!(loaded.messages[0].image.as_deref(), Some("/uploads/sky.png"));
        assert_eq!(loaded.messages[1].sender, Sender::Assistant);

        let listed = ChatStore::list_chats(&db, user_id).unwrap();
        assert_eq!(listed[0].message_count, 2);
        assert_eq!(listed[0].preview.as_deref(), Some("What a lovely sky!"));

        assert!(ChatStore::retract_message(&db, user_id, chat.id, first.id).unwrap());
        assert!(!ChatStore::retract_message(&db, user_id, chat.id, first.id).unwrap());
    }

    #[test]
    fn taken_message_is_restored_unchanged() {
        let (db, user_id) = store();
        let chat = Chat::new(user_id);
        ChatStore::save_chat(&db, &chat).unwrap();
        let first = Message::new(Sender::User, "I can't sleep", Some("/uploads/moon.png".into()));
        let second = Message::new(Sender::Assistant, "That sounds hard.", None);
        ChatStore::append_message(&db, user_id, chat.id, &first).unwrap();
        ChatStore::append_message(&db, user_id, chat.id, &second).unwrap();
        let before = ChatStore::get_chat(&db, user_id, chat.id).unwrap().unwrap();

        let taken = ChatStore::take_message(&db, user_id, chat.id, first.id).unwrap().unwrap();
        assert!(ChatStore::take_message(&db, user_id, chat.id, first.id).unwrap().is_none());
        assert!(ChatStore::restore_message(&db, user_id, chat.id, &taken).unwrap());

        let after = ChatStore::get_chat(&db, user_id, chat.id).unwrap().unwrap();
        assert_eq!(after.messages, before.messages);
    }

    #[test]
    fn append_to_missing_chat_reports_false() {
        let (db, user_id) = store();
        let message = Message::new(Sender::User, "hello", None);
        assert!(!ChatStore::append_message(&db, user_id, Uuid::new_v4(), &message).unwrap());
    }
}
