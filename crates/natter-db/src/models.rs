use natter_types::models::{Message, User};
use uuid::Uuid;

/// Database row types. These carry credential material and are never
/// serialized directly; `to_public` produces the wire view.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: Uuid,
    pub nickname: String,
    pub password_hash: String,
    pub token: Option<String>,
    pub online: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen_at: i64,
}

impl UserRow {
    pub fn to_public(&self) -> User {
        User {
            id: self.id,
            nickname: self.nickname.clone(),
            online: self.online,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_seen_at: self.last_seen_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: Uuid,
    pub author_id: Uuid,
    pub source: String,
    pub rendered: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl MessageRow {
    pub fn to_public(&self) -> Message {
        Message {
            id: self.id,
            author: self.author_id,
            source: self.source.clone(),
            rendered: self.rendered.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Conjunctive filter for user listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserFilter {
    pub online: Option<bool>,
    pub updated_since: Option<i64>,
}
