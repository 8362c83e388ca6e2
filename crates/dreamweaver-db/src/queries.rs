use crate::Database;
use crate::models::{ChatListRow, ChatRow, MessageRow, NewFeedback, NewMessage, UserRow};
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, name, email, password, provider, gender, assistant_type, language, avatar_url, created_at";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        email: &str,
        password_hash: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, provider, created_at) VALUES (?1, ?2, ?3, ?4, 'local', ?5)",
                (id, name, email, password_hash, created_at),
            );
            // false when the email is already registered
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Overwrites the personalization fields. `avatar_url` is only replaced
    /// when a new one is supplied. Returns false when the user does not exist.
    pub fn update_preferences(
        &self,
        id: &str,
        name: &str,
        gender: &str,
        assistant_type: &str,
        language: &str,
        avatar_url: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET name = ?2, gender = ?3, assistant_type = ?4, language = ?5,
                     avatar_url = COALESCE(?6, avatar_url)
                 WHERE id = ?1",
                rusqlite::params![id, name, gender, assistant_type, language, avatar_url],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Chats --

    pub fn insert_chat(&self, chat: &ChatRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chats (id, user_id, title, summary, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    chat.id,
                    chat.user_id,
                    chat.title,
                    chat.summary,
                    chat.created_at,
                    chat.updated_at
                ],
            )?;
            Ok(())
        })
    }

    /// Rewrites title and summary of a chat owned by `user_id`.
    pub fn update_chat_meta(
        &self,
        user_id: &str,
        chat_id: &str,
        title: &str,
        summary: Option<&str>,
        updated_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE chats SET title = ?3, summary = ?4, updated_at = ?5 WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id, title, summary, updated_at],
            )?;
            Ok(changed > 0)
        })
    }

    /// Chats of one user, newest first.
    pub fn list_chats(&self, user_id: &str) -> Result<Vec<ChatListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.user_id, c.title, c.summary, c.created_at, c.updated_at,
                        (SELECT COUNT(*) FROM messages m WHERE m.chat_id = c.id),
                        (SELECT m.content FROM messages m WHERE m.chat_id = c.id ORDER BY m.seq DESC LIMIT 1)
                 FROM chats c
                 WHERE c.user_id = ?1
                 ORDER BY c.created_at DESC, c.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ChatListRow {
                        chat: chat_from_row(row)?,
                        message_count: row.get(6)?,
                        last_content: row.get(7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// A chat and its messages in conversation order. A chat owned by
    /// another user is reported exactly like a missing one.
    pub fn get_chat(&self, user_id: &str, chat_id: &str) -> Result<Option<(ChatRow, Vec<MessageRow>)>> {
        self.with_conn(|conn| {
            let chat = conn
                .query_row(
                    "SELECT id, user_id, title, summary, created_at, updated_at
                     FROM chats WHERE id = ?1 AND user_id = ?2",
                    [chat_id, user_id],
                    chat_from_row,
                )
                .optional()?;

            let Some(chat) = chat else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT seq, id, chat_id, sender, content, image, created_at
                 FROM messages WHERE chat_id = ?1 ORDER BY seq ASC",
            )?;
            let messages = stmt
                .query_map([chat_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Some((chat, messages)))
        })
    }

    pub fn chat_exists(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM chats WHERE id = ?1 AND user_id = ?2",
                    [chat_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Deletes a chat (messages cascade). Returns false when nothing matched.
    pub fn delete_chat(&self, user_id: &str, chat_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM chats WHERE id = ?1 AND user_id = ?2",
                [chat_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Messages --

    /// Appends a message after every existing one and bumps the chat's
    /// `updated_at`. Returns the assigned sequence number, or `None` when the
    /// chat does not exist for `user_id`.
    pub fn append_message(&self, user_id: &str, chat_id: &str, message: &NewMessage<'_>) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let owned = tx.execute(
                "UPDATE chats SET updated_at = ?3 WHERE id = ?1 AND user_id = ?2",
                [chat_id, user_id, message.created_at],
            )?;
            if owned == 0 {
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO messages (id, chat_id, sender, content, image, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    message.id,
                    chat_id,
                    message.sender,
                    message.content,
                    message.image,
                    message.created_at
                ],
            )?;
            let seq = tx.last_insert_rowid();
            tx.commit()?;

            Ok(Some(seq))
        })
    }

    /// Removes one message of a chat owned by `user_id`.
    pub fn delete_message(&self, user_id: &str, chat_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM messages
                 WHERE id = ?1 AND chat_id = ?2
                   AND chat_id IN (SELECT id FROM chats WHERE user_id = ?3)",
                [message_id, chat_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Removes one message and returns it with its sequence number, so
    /// [`Database::restore_message`] can put it back in place.
    pub fn take_message(&self, user_id: &str, chat_id: &str, message_id: &str) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let taken = tx
                .query_row(
                    "SELECT seq, id, chat_id, sender, content, image, created_at
                     FROM messages
                     WHERE id = ?1 AND chat_id = ?2
                       AND chat_id IN (SELECT id FROM chats WHERE user_id = ?3)",
                    [message_id, chat_id, user_id],
                    message_from_row,
                )
                .optional()?;
            if let Some(row) = &taken {
                tx.execute("DELETE FROM messages WHERE seq = ?1", [row.seq])?;
            }
            tx.commit()?;
            Ok(taken)
        })
    }

    /// Reinserts a taken message under its old sequence number. False when
    /// the chat is gone for `user_id`.
    pub fn restore_message(&self, user_id: &str, chat_id: &str, message: &MessageRow) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT INTO messages (seq, id, chat_id, sender, content, image, created_at)
                 SELECT ?1, ?2, id, ?4, ?5, ?6, ?7 FROM chats WHERE id = ?3 AND user_id = ?8",
                rusqlite::params![
                    message.seq,
                    message.id,
                    chat_id,
                    message.sender,
                    message.content,
                    message.image,
                    message.created_at,
                    user_id
                ],
            )?;
            Ok(changed > 0)
        })
    }

    // -- Feedback --

    pub fn insert_feedback(&self, feedback: &NewFeedback<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO feedback (id, user_id, chat_id, message_id, rating, feedback, technical_slipped, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    feedback.id,
                    feedback.user_id,
                    feedback.chat_id,
                    feedback.message_id,
                    feedback.rating,
                    feedback.feedback,
                    feedback.technical_slipped,
                    feedback.created_at
                ],
            )?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                provider: row.get(4)?,
                gender: row.get(5)?,
                assistant_type: row.get(6)?,
                language: row.get(7)?,
                avatar_url: row.get(8)?,
                created_at: row.get(9)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        summary: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        seq: row.get(0)?,
        id: row.get(1)?,
        chat_id: row.get(2)?,
        sender: row.get(3)?,
        content: row.get(4)?,
        image: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
