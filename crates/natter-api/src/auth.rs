use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};
use axum_extra::headers::{
    Authorization, HeaderMapExt,
    authorization::{Basic, Bearer},
};
use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use natter_db::models::UserRow;
use natter_db::queries;

use crate::credentials::CredentialStore;
use crate::error::ApiError;

/// How a request asserts who it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Basic,
    Bearer,
}

impl Scheme {
    /// `WWW-Authenticate` challenge sent with a 401 for this scheme.
    pub fn challenge(self) -> &'static str {
        match self {
            Self::Basic => "Basic realm=\"natter\"",
            Self::Bearer => "Bearer realm=\"natter\"",
        }
    }
}

/// Per-endpoint authentication policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Identity is optional. Whatever credential the request presents is
    /// tried; a bad one is treated as no credential at all.
    Public,
    /// Identity must resolve through the given scheme.
    Required(Scheme),
    /// As `Required`, and the operation must additionally check the caller
    /// owns its target (see [`authorize`]).
    SelfOnly(Scheme),
}

/// Credentials presented on a request, parsed from `Authorization`.
#[derive(Debug, Clone, Default)]
pub enum Credentials {
    #[default]
    None,
    Basic { nickname: String, password: String },
    Bearer(String),
}

impl Credentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        if let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() {
            return Self::Bearer(bearer.token().to_string());
        }
        if let Some(Authorization(basic)) = headers.typed_get::<Authorization<Basic>>() {
            return Self::Basic {
                nickname: basic.username().to_string(),
                password: basic.password().to_string(),
            };
        }
        Self::None
    }

    pub fn scheme(&self) -> Option<Scheme> {
        match self {
            Self::None => None,
            Self::Basic { .. } => Some(Scheme::Basic),
            Self::Bearer(_) => Some(Scheme::Bearer),
        }
    }
}

impl<S> FromRequestParts<S> for Credentials
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

/// Resolves request credentials to a user and applies endpoint policy.
/// A resolved caller is pinged (marked online, last seen now) as part of
/// the same transaction as the rest of the request.
pub struct AuthGate<'c> {
    conn: &'c Connection,
    now: i64,
}

impl<'c> AuthGate<'c> {
    pub fn new(conn: &'c Connection, now: i64) -> Self {
        Self { conn, now }
    }

    /// Evaluate `policy` against `credentials`. Under `Public` the result may
    /// be `None`; under `Required` and `SelfOnly` it is always `Some` or an
    /// authentication error.
    pub fn admit(
        &self,
        policy: Policy,
        credentials: &Credentials,
    ) -> Result<Option<UserRow>, ApiError> {
        let resolved = match policy {
            Policy::Public => self.resolve(credentials)?,
            Policy::Required(scheme) | Policy::SelfOnly(scheme) => {
                if credentials.scheme() != Some(scheme) {
                    debug!("Rejected request: expected {:?} credentials", scheme);
                    return Err(ApiError::Authentication(scheme));
                }
                match self.resolve(credentials)? {
                    Some(user) => Some(user),
                    None => {
                        debug!("Rejected request: {:?} credentials did not resolve", scheme);
                        return Err(ApiError::Authentication(scheme));
                    }
                }
            }
        };

        resolved.map(|user| self.ping(user)).transpose()
    }

    /// [`admit`](Self::admit) for policies that demand an identity.
    pub fn admit_user(
        &self,
        policy: Policy,
        credentials: &Credentials,
    ) -> Result<UserRow, ApiError> {
        let scheme = match policy {
            Policy::Required(scheme) | Policy::SelfOnly(scheme) => scheme,
            Policy::Public => Scheme::Bearer,
        };
        self.admit(policy, credentials)?
            .ok_or(ApiError::Authentication(scheme))
    }

    fn resolve(&self, credentials: &Credentials) -> Result<Option<UserRow>, ApiError> {
        match credentials {
            Credentials::None => Ok(None),
            Credentials::Basic { nickname, password } => {
                let user = queries::user_by_nickname(self.conn, nickname)?;
                Ok(user.filter(|u| CredentialStore::verify(password, &u.password_hash)))
            }
            Credentials::Bearer(token) => Ok(queries::user_by_token(self.conn, token)?),
        }
    }

    fn ping(&self, mut user: UserRow) -> Result<UserRow, ApiError> {
        queries::touch_user(self.conn, &user.id, self.now)?;
        user.online = true;
        user.last_seen_at = self.now;
        user.updated_at = self.now;
        Ok(user)
    }
}

/// Self-only check: the caller must be the owner of the target.
pub fn authorize(actor: &UserRow, owner: &Uuid) -> Result<(), ApiError> {
    if actor.id == *owner {
        Ok(())
    } else {
        debug!("User {} denied access to resource owned by {}", actor.id, owner);
        Err(ApiError::Authorization)
    }
}
