use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users, messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                nickname        TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                token           TEXT UNIQUE,
                online          INTEGER NOT NULL DEFAULT 0,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL,
                last_seen_at    INTEGER NOT NULL
            );

            CREATE INDEX idx_users_updated
                ON users(updated_at, nickname);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                author_id       TEXT NOT NULL REFERENCES users(id),
                source          TEXT NOT NULL,
                rendered        TEXT NOT NULL,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_updated
                ON messages(updated_at);

            CREATE INDEX idx_messages_author
                ON messages(author_id, updated_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
