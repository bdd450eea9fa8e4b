use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL,
                name        TEXT,
                password    TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX idx_users_email ON users(email);

            CREATE TABLE channels (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            -- Name lookups for the uniqueness check go through this index
            CREATE UNIQUE INDEX idx_channels_name ON channels(name);

            -- author_id has no FK: identities are owned by the auth layer
            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                seq             INTEGER NOT NULL,
                channel_id      TEXT NOT NULL REFERENCES channels(id),
                author_id       TEXT NOT NULL,
                author_label    TEXT NOT NULL,
                body            TEXT NOT NULL,
                created_at      INTEGER NOT NULL
            );

            CREATE UNIQUE INDEX idx_messages_seq ON messages(seq);

            CREATE INDEX idx_messages_channel
                ON messages(channel_id, created_at, seq);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
