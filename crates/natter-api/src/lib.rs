pub mod auth;
pub mod credentials;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod messages;
pub mod registry;
pub mod render;
pub mod tokens;
pub mod users;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use rusqlite::Transaction;
use tracing::error;

use natter_db::Database;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// Seconds without activity after which a user is reported offline.
    pub presence_timeout: i64,
}

/// Seconds since the Unix epoch.
pub fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(users::register).get(users::list_users))
        .route("/users/{id}", get(users::get_user).put(users::update_user))
        .route("/users/{id}/messages", get(messages::list_by_author))
        .route("/tokens", post(tokens::issue_token).delete(tokens::revoke_token))
        .route("/messages", post(messages::post_message).get(messages::list_messages))
        .route("/messages/{id}", get(messages::get_message).put(messages::update_message))
        .with_state(state)
}

/// Run one request's worth of storage work off the async runtime, inside a
/// single transaction stamped with a single `now`.
pub(crate) async fn in_transaction<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Transaction<'_>, i64) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || {
        let now = timestamp();
        state.db.with_tx(|tx| f(tx, now))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}

#[cfg(test)]
pub(crate) mod test_support {
    use rusqlite::Connection;

    use natter_db::models::UserRow;
    use natter_types::api::RegisterRequest;

    use crate::registry::Registry;

    pub fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        natter_db::migrations::run(&conn).unwrap();
        conn
    }

    pub fn register(conn: &Connection, nickname: &str, password: &str, now: i64) -> UserRow {
        Registry::new(conn, now)
            .register(RegisterRequest {
                nickname: Some(nickname.to_string()),
                password: Some(password.to_string()),
            })
            .unwrap()
    }
}
