use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of a user. Credential material (password digest, session
/// token) has no field here, so it can never be serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub nickname: String,
    pub online: bool,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_seen_at: i64,
}

/// Public view of a chat message. `author` is the author's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub author: Uuid,
    pub source: String,
    pub rendered: String,
    pub created_at: i64,
    pub updated_at: i64,
}
