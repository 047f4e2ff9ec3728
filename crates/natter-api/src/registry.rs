use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use natter_db::models::{UserFilter, UserRow};
use natter_db::{is_unique_violation, queries};
use natter_types::api::{RegisterRequest, UpdateUserRequest};

use crate::auth::authorize;
use crate::credentials::CredentialStore;
use crate::error::ApiError;

pub const MAX_NICKNAME_LEN: usize = 32;

/// User records: registration, lookup, listing and self-edit.
pub struct Registry<'c> {
    conn: &'c Connection,
    now: i64,
}

impl<'c> Registry<'c> {
    pub fn new(conn: &'c Connection, now: i64) -> Self {
        Self { conn, now }
    }

    /// Create a user with no token, offline. Nickname uniqueness is left to
    /// the UNIQUE constraint so that racing registrations cannot both land.
    pub fn register(&self, req: RegisterRequest) -> Result<UserRow, ApiError> {
        let nickname = req
            .nickname
            .ok_or_else(|| ApiError::Validation("nickname is required".into()))?;
        let password = req
            .password
            .ok_or_else(|| ApiError::Validation("password is required".into()))?;
        validate_nickname(&nickname)?;
        validate_password(&password)?;

        let user = UserRow {
            id: Uuid::new_v4(),
            nickname,
            password_hash: CredentialStore::hash(&password)?,
            token: None,
            online: false,
            created_at: self.now,
            updated_at: self.now,
            last_seen_at: self.now,
        };

        queries::insert_user(self.conn, &user)
            .map_err(|e| nickname_conflict(e, &user.nickname))?;

        info!("Registered user {} ({})", user.nickname, user.id);
        Ok(user)
    }

    pub fn get(&self, id: &Uuid) -> Result<UserRow, ApiError> {
        queries::user_by_id(self.conn, id)?.ok_or(ApiError::NotFound("user"))
    }

    /// Users ordered by `updated_at` then `nickname`.
    pub fn list(&self, filter: &UserFilter) -> Result<Vec<UserRow>, ApiError> {
        Ok(queries::list_users(self.conn, filter)?)
    }

    /// Report users idle for longer than `timeout` seconds as offline.
    pub fn sweep_idle(&self, timeout: i64) -> Result<usize, ApiError> {
        let changed = queries::mark_idle_offline(self.conn, self.now - timeout, self.now)?;
        if changed > 0 {
            debug!("Marked {} idle users offline", changed);
        }
        Ok(changed)
    }

    /// Self-only partial update of `nickname` and/or `password`. Every
    /// supplied field is validated before anything is written.
    pub fn update(
        &self,
        id: &Uuid,
        req: UpdateUserRequest,
        actor: &UserRow,
    ) -> Result<(), ApiError> {
        let target = self.get(id)?;
        authorize(actor, &target.id)?;

        if let Some(nickname) = &req.nickname {
            validate_nickname(nickname)?;
        }
        if let Some(password) = &req.password {
            validate_password(password)?;
        }

        if let Some(nickname) = req.nickname.filter(|n| *n != target.nickname) {
            queries::update_nickname(self.conn, &target.id, &nickname, self.now)
                .map_err(|e| nickname_conflict(e, &nickname))?;
            info!("User {} renamed {} -> {}", target.id, target.nickname, nickname);
        }
        if let Some(password) = req.password {
            CredentialStore::new(self.conn, self.now).set_password(&target.id, &password)?;
            info!("User {} changed password", target.id);
        }

        Ok(())
    }
}

fn validate_nickname(nickname: &str) -> Result<(), ApiError> {
    if nickname.trim().is_empty() {
        return Err(ApiError::Validation("nickname must not be blank".into()));
    }
    if nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(ApiError::Validation(format!(
            "nickname must be at most {} characters",
            MAX_NICKNAME_LEN
        )));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::Validation("password must not be empty".into()));
    }
    Ok(())
}

fn nickname_conflict(err: anyhow::Error, nickname: &str) -> ApiError {
    if is_unique_violation(&err) {
        ApiError::Conflict(format!("nickname '{}' is already taken", nickname))
    } else {
        ApiError::Internal(err)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::*;
    use crate::test_support::{conn, register};
    use natter_db::Database;

    fn request(nickname: Option<&str>, password: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            nickname: nickname.map(str::to_string),
            password: password.map(str::to_string),
        }
    }

    #[test]
    fn register_creates_offline_user_without_token() {
        let conn = conn();
        let user = Registry::new(&conn, 100)
            .register(request(Some("alice"), Some("pw1")))
            .unwrap();

        assert_eq!(user.nickname, "alice");
        assert!(user.token.is_none());
        assert!(!user.online);
        assert_eq!(user.created_at, 100);
        assert_ne!(user.password_hash, "pw1");
    }

    #[test]
    fn register_requires_both_fields() {
        let conn = conn();
        let registry = Registry::new(&conn, 100);

        assert!(matches!(
            registry.register(request(None, Some("pw"))),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            registry.register(request(Some("alice"), None)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            registry.register(request(Some("   "), Some("pw"))),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            registry.register(request(Some(&"x".repeat(33)), Some("pw"))),
            Err(ApiError::Validation(_))
        ));
        assert!(registry.list(&UserFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn duplicate_nickname_conflicts() {
        let conn = conn();
        register(&conn, "alice", "pw1", 100);

        let err = Registry::new(&conn, 101)
            .register(request(Some("alice"), Some("other")))
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn concurrent_registrations_yield_one_winner() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = db.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    db.with_tx(|tx| {
                        Registry::new(tx, 100).register(request(Some("alice"), Some("pw")))
                    })
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(ApiError::Conflict(_))))
                .count(),
            3
        );
    }

    #[test]
    fn get_unknown_user_is_not_found() {
        let conn = conn();
        let err = Registry::new(&conn, 100).get(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApiError::NotFound("user")));
    }

    #[test]
    fn update_is_self_only_and_partial() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", 100);
        let bob = register(&conn, "bob", "pw2", 100);
        let registry = Registry::new(&conn, 200);

        let rename = UpdateUserRequest {
            nickname: Some("mallory".into()),
            password: None,
        };
        assert!(matches!(
            registry.update(&alice.id, rename, &bob),
            Err(ApiError::Authorization)
        ));
        assert_eq!(registry.get(&alice.id).unwrap().nickname, "alice");

        let rename = UpdateUserRequest {
            nickname: Some("alicia".into()),
            password: None,
        };
        registry.update(&alice.id, rename, &alice).unwrap();

        let row = registry.get(&alice.id).unwrap();
        assert_eq!(row.nickname, "alicia");
        assert_eq!(row.updated_at, 200);
        assert!(CredentialStore::verify("pw1", &row.password_hash));
    }

    #[test]
    fn rename_to_taken_nickname_conflicts() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", 100);
        register(&conn, "bob", "pw2", 100);

        let req = UpdateUserRequest {
            nickname: Some("bob".into()),
            password: None,
        };
        let err = Registry::new(&conn, 200)
            .update(&alice.id, req, &alice)
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn invalid_field_blocks_whole_update() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", 100);

        let req = UpdateUserRequest {
            nickname: Some("alicia".into()),
            password: Some(String::new()),
        };
        let registry = Registry::new(&conn, 200);
        assert!(matches!(
            registry.update(&alice.id, req, &alice),
            Err(ApiError::Validation(_))
        ));
        assert_eq!(registry.get(&alice.id).unwrap().nickname, "alice");
    }

    #[test]
    fn sweep_marks_idle_users_offline() {
        let conn = conn();
        let alice = register(&conn, "alice", "pw1", 100);
        queries::touch_user(&conn, &alice.id, 100).unwrap();

        assert_eq!(Registry::new(&conn, 150).sweep_idle(60).unwrap(), 0);
        assert_eq!(Registry::new(&conn, 161).sweep_idle(60).unwrap(), 1);
        assert!(!Registry::new(&conn, 161).get(&alice.id).unwrap().online);
    }
}
