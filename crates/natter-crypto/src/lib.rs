/// Natter credential primitives.
///
/// Passwords are stored as Argon2id PHC strings. Session tokens are opaque
/// random strings; the server never derives anything from their contents.
pub mod password;
pub mod token;
