use crate::DbError;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS media (
            id          TEXT PRIMARY KEY,
            hash        TEXT NOT NULL,
            kind        TEXT NOT NULL,
            format      TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            bio         TEXT,
            avatar_id   TEXT REFERENCES media(id),
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );

        -- recipient_id is intentionally not FK-constrained: direct messages
        -- may address an id that names no registered user.
        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            recipient_id    TEXT,
            content         TEXT NOT NULL DEFAULT '',
            attachment_id   TEXT REFERENCES media(id),
            kind            TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, recipient_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
