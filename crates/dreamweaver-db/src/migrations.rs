use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                password        TEXT,
                provider        TEXT NOT NULL DEFAULT 'local',
                provider_id     TEXT,
                gender          TEXT,
                assistant_type  TEXT,
                language        TEXT,
                avatar_url      TEXT,
                created_at      TEXT NOT NULL
            );

            CREATE TABLE chats (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                summary     TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_chats_user
                ON chats(user_id, created_at);

            -- seq is the authoritative conversation order
            CREATE TABLE messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender      TEXT NOT NULL CHECK (sender IN ('user', 'assistant')),
                content     TEXT NOT NULL DEFAULT '',
                image       TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat
                ON messages(chat_id, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (feedback)");
        conn.execute_batch(
            "
            CREATE TABLE feedback (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                chat_id             TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                message_id          TEXT,
                rating              INTEGER NOT NULL CHECK (rating BETWEEN 1 AND 5),
                feedback            TEXT,
                technical_slipped   INTEGER NOT NULL DEFAULT 0,
                created_at          TEXT NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
