use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Deserializer, de::Error as _};

use natter_db::models::UserFilter;
use natter_types::api::{RegisterRequest, UpdateUserRequest, UserList};

use crate::auth::{AuthGate, Credentials, Policy, Scheme};
use crate::error::ApiError;
use crate::extract::{Params, Payload, ResourceId};
use crate::registry::Registry;
use crate::{AppState, in_transaction};

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    #[serde(default, deserialize_with = "flag")]
    pub online: Option<bool>,
    pub updated_since: Option<i64>,
}

/// Accepts `1`/`0` as well as `true`/`false`. An empty value means no filter.
fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some("1" | "true") => Ok(Some(true)),
        Some("0" | "false") => Ok(Some(false)),
        Some(other) => Err(D::Error::custom(format!("invalid online flag '{}'", other))),
    }
}

/// POST /users
pub async fn register(
    State(state): State<AppState>,
    credentials: Credentials,
    Payload(req): Payload<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = in_transaction(&state, move |tx, now| {
        AuthGate::new(tx, now).admit(Policy::Public, &credentials)?;
        Registry::new(tx, now).register(req)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/users/{}", user.id))],
        Json(user.to_public()),
    ))
}

/// GET /users
pub async fn list_users(
    State(state): State<AppState>,
    credentials: Credentials,
    Params(query): Params<UserQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let timeout = state.presence_timeout;
    let filter = UserFilter {
        online: query.online,
        updated_since: query.updated_since,
    };

    let rows = in_transaction(&state, move |tx, now| {
        AuthGate::new(tx, now).admit(Policy::Public, &credentials)?;
        let registry = Registry::new(tx, now);
        registry.sweep_idle(timeout)?;
        registry.list(&filter)
    })
    .await?;

    Ok(Json(UserList {
        users: rows.iter().map(|row| row.to_public()).collect(),
    }))
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    credentials: Credentials,
) -> Result<impl IntoResponse, ApiError> {
    let user = in_transaction(&state, move |tx, now| {
        AuthGate::new(tx, now).admit(Policy::Public, &credentials)?;
        Registry::new(tx, now).get(&id)
    })
    .await?;

    Ok(Json(user.to_public()))
}

/// PUT /users/{id}
///
/// Id and body rejections are held until the caller is authenticated.
pub async fn update_user(
    State(state): State<AppState>,
    id: Result<ResourceId, ApiError>,
    credentials: Credentials,
    payload: Result<Payload<UpdateUserRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    in_transaction(&state, move |tx, now| {
        let actor = AuthGate::new(tx, now)
            .admit_user(Policy::SelfOnly(Scheme::Bearer), &credentials)?;
        let ResourceId(id) = id?;
        let Payload(req) = payload?;
        Registry::new(tx, now).update(&id, req, &actor)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
