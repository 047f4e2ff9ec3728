use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::models::{MessageRow, UserFilter, UserRow};

const USER_COLUMNS: &str =
    "id, nickname, password_hash, token, online, created_at, updated_at, last_seen_at";

const MESSAGE_COLUMNS: &str = "id, author_id, source, rendered, created_at, updated_at";

// -- Users --

pub fn insert_user(conn: &Connection, user: &UserRow) -> Result<()> {
    conn.execute(
        "INSERT INTO users
             (id, nickname, password_hash, token, online, created_at, updated_at, last_seen_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            user.id.to_string(),
            user.nickname,
            user.password_hash,
            user.token,
            user.online,
            user.created_at,
            user.updated_at,
            user.last_seen_at,
        ],
    )?;
    Ok(())
}

pub fn user_by_id(conn: &Connection, id: &Uuid) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let row = conn
        .query_row(&sql, [id.to_string()], user_from_row)
        .optional()?;
    Ok(row)
}

pub fn user_by_nickname(conn: &Connection, nickname: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE nickname = ?1");
    let row = conn.query_row(&sql, [nickname], user_from_row).optional()?;
    Ok(row)
}

pub fn user_by_token(conn: &Connection, token: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE token = ?1");
    let row = conn.query_row(&sql, [token], user_from_row).optional()?;
    Ok(row)
}

/// Users ordered by `updated_at`, then `nickname`. Both filter predicates
/// apply when both are set.
pub fn list_users(conn: &Connection, filter: &UserFilter) -> Result<Vec<UserRow>> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users
         WHERE (?1 IS NULL OR online = ?1)
           AND (?2 IS NULL OR updated_at > ?2)
         ORDER BY updated_at ASC, nickname ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![filter.online, filter.updated_since], user_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_nickname(conn: &Connection, id: &Uuid, nickname: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET nickname = ?1, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![nickname, now, id.to_string()],
    )?;
    Ok(())
}

/// Store a new password digest. Any live token is revoked in the same
/// statement.
pub fn update_password(conn: &Connection, id: &Uuid, password_hash: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?1, token = NULL, updated_at = ?2 WHERE id = ?3",
        rusqlite::params![password_hash, now, id.to_string()],
    )?;
    Ok(())
}

/// Install `candidate` as the user's token unless one is already live, then
/// return whichever token the row holds. `None` if the user does not exist.
pub fn set_token_if_absent(
    conn: &Connection,
    id: &Uuid,
    candidate: &str,
    now: i64,
) -> Result<Option<String>> {
    conn.execute(
        "UPDATE users SET token = ?1, updated_at = ?2 WHERE id = ?3 AND token IS NULL",
        rusqlite::params![candidate, now, id.to_string()],
    )?;
    let token = conn
        .query_row(
            "SELECT token FROM users WHERE id = ?1",
            [id.to_string()],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(token.flatten())
}

/// Drop the user's token and mark them offline.
pub fn clear_token(conn: &Connection, id: &Uuid, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET token = NULL, online = 0, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, id.to_string()],
    )?;
    Ok(())
}

/// Presence ping: the user was just seen.
pub fn touch_user(conn: &Connection, id: &Uuid, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET online = 1, last_seen_at = ?1, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, id.to_string()],
    )?;
    Ok(())
}

/// Flag users not seen since `cutoff` as offline. Returns how many changed.
pub fn mark_idle_offline(conn: &Connection, cutoff: i64, now: i64) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE users SET online = 0, updated_at = ?1 WHERE online = 1 AND last_seen_at < ?2",
        rusqlite::params![now, cutoff],
    )?;
    Ok(changed)
}

// -- Messages --

pub fn insert_message(conn: &Connection, message: &MessageRow) -> Result<()> {
    conn.execute(
        "INSERT INTO messages (id, author_id, source, rendered, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            message.id.to_string(),
            message.author_id.to_string(),
            message.source,
            message.rendered,
            message.created_at,
            message.updated_at,
        ],
    )?;
    Ok(())
}

pub fn message_by_id(conn: &Connection, id: &Uuid) -> Result<Option<MessageRow>> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    let row = conn
        .query_row(&sql, [id.to_string()], message_from_row)
        .optional()?;
    Ok(row)
}

/// Messages with `updated_at` strictly after `since`, oldest change first.
pub fn messages_updated_since(conn: &Connection, since: i64) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE updated_at > ?1
         ORDER BY updated_at ASC, created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([since], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One author's messages, oldest change first, optionally only those
/// updated after `since`.
pub fn messages_by_author(
    conn: &Connection,
    author_id: &Uuid,
    since: Option<i64>,
) -> Result<Vec<MessageRow>> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE author_id = ?1
           AND (?2 IS NULL OR updated_at > ?2)
         ORDER BY updated_at ASC, created_at ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params![author_id.to_string(), since], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn update_message_source(
    conn: &Connection,
    id: &Uuid,
    source: &str,
    rendered: &str,
    now: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE messages SET source = ?1, rendered = ?2, updated_at = ?3 WHERE id = ?4",
        rusqlite::params![source, rendered, now, id.to_string()],
    )?;
    Ok(())
}

/// True when `err` is SQLite rejecting a write because of a UNIQUE
/// constraint.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, _)) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: uuid_at(row, 0)?,
        nickname: row.get(1)?,
        password_hash: row.get(2)?,
        token: row.get(3)?,
        online: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        last_seen_at: row.get(7)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: uuid_at(row, 0)?,
        author_id: uuid_at(row, 1)?,
        source: row.get(2)?,
        rendered: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
