use anyhow::anyhow;
use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use natter_crypto::{password, token};
use natter_db::models::UserRow;
use natter_db::{is_unique_violation, queries};

use crate::error::ApiError;

/// Fresh candidates tried when a generated token collides with a live one.
const TOKEN_ATTEMPTS: usize = 3;

/// Password digests and session tokens.
pub struct CredentialStore<'c> {
    conn: &'c Connection,
    now: i64,
}

impl<'c> CredentialStore<'c> {
    pub fn new(conn: &'c Connection, now: i64) -> Self {
        Self { conn, now }
    }

    pub fn hash(plain: &str) -> Result<String, ApiError> {
        Ok(password::hash_password(plain)?)
    }

    pub fn verify(plain: &str, digest: &str) -> bool {
        password::verify_password(plain, digest)
    }

    /// Return the user's live token, creating one if they have none.
    /// Concurrent callers converge on the same token: the write only lands
    /// if the row still has no token, and the stored value is read back.
    pub fn issue_token(&self, user: &UserRow) -> Result<String, ApiError> {
        if let Some(existing) = &user.token {
            return Ok(existing.clone());
        }

        for _ in 0..TOKEN_ATTEMPTS {
            let candidate = token::generate_token();
            match queries::set_token_if_absent(self.conn, &user.id, &candidate, self.now) {
                Ok(Some(live)) => {
                    if live == candidate {
                        info!("Issued token for user {}", user.id);
                    }
                    return Ok(live);
                }
                Ok(None) => return Err(ApiError::NotFound("user")),
                Err(e) if is_unique_violation(&e) => {
                    warn!("Generated token collided for user {}, retrying", user.id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow!("could not generate a unique token").into())
    }

    /// Clear the user's token; bearer requests with the old value stop
    /// resolving. The user is also marked offline.
    pub fn revoke_token(&self, user: &UserRow) -> Result<(), ApiError> {
        queries::clear_token(self.conn, &user.id, self.now)?;
        info!("Revoked token for user {}", user.id);
        Ok(())
    }

    /// Replace the user's password. Any live token is revoked with it.
    pub fn set_password(&self, user_id: &Uuid, plain: &str) -> Result<(), ApiError> {
        let digest = Self::hash(plain)?;
        queries::update_password(self.conn, user_id, &digest, self.now)?;
        Ok(())
    }
}
