use serde::{Deserialize, Serialize};

use crate::models::{Message, User};

// -- Users --

/// Fields are optional so that a missing field surfaces as a validation
/// error from the registry rather than a deserialization failure.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub nickname: Option<String>,
    pub password: Option<String>,
}

/// Partial update; omitted fields are left untouched and any other keys
/// (ids, timestamps echoed back by clients) are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub nickname: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserList {
    pub users: Vec<User>,
}

// -- Tokens --

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

// -- Messages --

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostMessageRequest {
    pub source: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMessageRequest {
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageList {
    pub messages: Vec<Message>,
}
