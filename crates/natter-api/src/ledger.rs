use rusqlite::Connection;
use tracing::info;
use uuid::Uuid;

use natter_db::models::{MessageRow, UserRow};
use natter_db::queries;
use natter_types::api::{PostMessageRequest, UpdateMessageRequest};

use crate::auth::authorize;
use crate::error::ApiError;
use crate::render::render;

/// How far back an incremental fetch may reach, in seconds.
pub const SYNC_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Clamp a client cursor so that no fetch reaches past the sync window.
pub fn effective_cursor(cursor: i64, now: i64) -> i64 {
    cursor.max(now - SYNC_WINDOW_SECS)
}

/// Messages: posting, lookup, incremental listing and author edits.
pub struct Ledger<'c> {
    conn: &'c Connection,
    now: i64,
}

impl<'c> Ledger<'c> {
    pub fn new(conn: &'c Connection, now: i64) -> Self {
        Self { conn, now }
    }

    /// Append a message by `author`. The author always comes from the
    /// resolved identity, never from the payload.
    pub fn post(&self, req: PostMessageRequest, author: &UserRow) -> Result<MessageRow, ApiError> {
        let source = req
            .source
            .ok_or_else(|| ApiError::Validation("source is required".into()))?;
        validate_source(&source)?;

        let message = MessageRow {
            id: Uuid::new_v4(),
            author_id: author.id,
            rendered: render(&source),
            source,
            created_at: self.now,
            updated_at: self.now,
        };
        queries::insert_message(self.conn, &message)?;

        info!("User {} posted message {}", author.id, message.id);
        Ok(message)
    }

    pub fn get(&self, id: &Uuid) -> Result<MessageRow, ApiError> {
        queries::message_by_id(self.conn, id)?.ok_or(ApiError::NotFound("message"))
    }

    /// Messages changed after `cursor`, oldest change first. The cursor is
    /// clamped to the sync window.
    pub fn list_since(&self, cursor: i64) -> Result<Vec<MessageRow>, ApiError> {
        let since = effective_cursor(cursor, self.now);
        Ok(queries::messages_updated_since(self.conn, since)?)
    }

    /// One author's messages, oldest change first. With a cursor the same
    /// window clamp as [`list_since`](Self::list_since) applies.
    pub fn list_by_author(
        &self,
        author_id: &Uuid,
        cursor: Option<i64>,
    ) -> Result<Vec<MessageRow>, ApiError> {
        if queries::user_by_id(self.conn, author_id)?.is_none() {
            return Err(ApiError::NotFound("user"));
        }
        let since = cursor.map(|c| effective_cursor(c, self.now));
        Ok(queries::messages_by_author(self.conn, author_id, since)?)
    }

    /// Author-only edit of `source`; `rendered` is recomputed with it.
    pub fn update(
        &self,
        id: &Uuid,
        req: UpdateMessageRequest,
        actor: &UserRow,
    ) -> Result<(), ApiError> {
        let message = self.get(id)?;
        authorize(actor, &message.author_id)?;

        if let Some(source) = req.source {
            validate_source(&source)?;
            let rendered = render(&source);
            queries::update_message_source(self.conn, &message.id, &source, &rendered, self.now)?;
            info!("User {} edited message {}", actor.id, message.id);
        }
        Ok(())
    }
}

fn validate_source(source: &str) -> Result<(), ApiError> {
    if source.trim().is_empty() {
        return Err(ApiError::Validation("source must not be blank".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{conn, register};

    const NOW: i64 = 1_000_000;

    fn post(conn: &Connection, author: &UserRow, source: &str, at: i64) -> MessageRow {
        Ledger::new(conn, at)
            .post(
                PostMessageRequest {
                    source: Some(source.to_string()),
                },
                author,
            )
            .unwrap()
    }

    #[test]
    fn cursor_is_clamped_to_window() {
        assert_eq!(effective_cursor(0, NOW), NOW - SYNC_WINDOW_SECS);
        assert_eq!(effective_cursor(NOW - 10, NOW), NOW - 10);
    }

    #[test]
    fn post_renders_and_attributes() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", NOW);
        let message = post(&conn, &alice, "hi", NOW);

        assert_eq!(message.author_id, alice.id);
        assert_eq!(message.rendered, render("hi"));
        assert_eq!(Ledger::new(&conn, NOW).get(&message.id).unwrap().source, "hi");
    }

    #[test]
    fn post_requires_source() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", NOW);
        let ledger = Ledger::new(&conn, NOW);

        assert!(matches!(
            ledger.post(PostMessageRequest { source: None }, &alice),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            ledger.post(PostMessageRequest { source: Some("  ".into()) }, &alice),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn old_cursor_matches_window_start() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", NOW - 3 * SYNC_WINDOW_SECS);
        post(&conn, &alice, "ancient", NOW - 2 * SYNC_WINDOW_SECS);
        post(&conn, &alice, "recent", NOW - 60);
        post(&conn, &alice, "now", NOW);

        let ledger = Ledger::new(&conn, NOW);
        let from_zero = ledger.list_since(0).unwrap();
        let from_window = ledger.list_since(NOW - SYNC_WINDOW_SECS).unwrap();

        let sources: Vec<_> = from_zero.iter().map(|m| m.source.as_str()).collect();
        assert_eq!(sources, ["recent", "now"]);
        let ids: Vec<_> = from_window.iter().map(|m| m.id).collect();
        assert_eq!(from_zero.iter().map(|m| m.id).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn recent_cursor_is_exclusive() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", NOW);
        post(&conn, &alice, "first", NOW - 20);
        post(&conn, &alice, "second", NOW - 10);

        let rows = Ledger::new(&conn, NOW).list_since(NOW - 20).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "second");
    }

    #[test]
    fn non_author_edit_leaves_message_untouched() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", NOW);
        let bob = register(&conn, "bob", "pw2", NOW);
        let message = post(&conn, &alice, "original", NOW);

        let ledger = Ledger::new(&conn, NOW + 50);
        let err = ledger
            .update(
                &message.id,
                UpdateMessageRequest {
                    source: Some("hijacked".into()),
                },
                &bob,
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::Authorization));

        let stored = ledger.get(&message.id).unwrap();
        assert_eq!(stored.source, "original");
        assert_eq!(stored.rendered, message.rendered);
        assert_eq!(stored.updated_at, message.updated_at);
    }

    #[test]
    fn author_edit_rerenders() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", NOW);
        let message = post(&conn, &alice, "draft", NOW);

        let ledger = Ledger::new(&conn, NOW + 50);
        ledger
            .update(
                &message.id,
                UpdateMessageRequest {
                    source: Some("*final*".into()),
                },
                &alice,
            )
            .unwrap();

        let stored = ledger.get(&message.id).unwrap();
        assert_eq!(stored.source, "*final*");
        assert_eq!(stored.rendered, render("*final*"));
        assert_eq!(stored.updated_at, NOW + 50);
        assert_eq!(stored.created_at, NOW);
    }

    #[test]
    fn edit_unknown_message_is_not_found() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", NOW);
        let err = Ledger::new(&conn, NOW)
            .update(&Uuid::new_v4(), UpdateMessageRequest::default(), &alice)
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("message")));
    }

    #[test]
    fn list_by_author_filters_and_checks_author() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", NOW);
        let bob = register(&conn, "bob", "pw2", NOW);
        post(&conn, &alice, "a1", NOW - 2 * SYNC_WINDOW_SECS);
        post(&conn, &bob, "b1", NOW - 5);
        post(&conn, &alice, "a2", NOW - 1);

        let ledger = Ledger::new(&conn, NOW);
        let all = ledger.list_by_author(&alice.id, None).unwrap();
        assert_eq!(all.len(), 2);

        let windowed = ledger.list_by_author(&alice.id, Some(0)).unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].source, "a2");

        assert!(matches!(
            ledger.list_by_author(&Uuid::new_v4(), None),
            Err(ApiError::NotFound("user"))
        ));
    }
}
