use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use natter_types::api::{MessageList, PostMessageRequest, UpdateMessageRequest};

use crate::auth::{AuthGate, Credentials, Policy, Scheme};
use crate::error::ApiError;
use crate::extract::{Params, Payload, ResourceId};
use crate::ledger::Ledger;
use crate::{AppState, in_transaction};

#[derive(Debug, Default, Deserialize)]
pub struct MessageQuery {
    /// Cursor: only messages changed after this timestamp. Clamped to the
    /// last 24 hours.
    pub updated_since: Option<i64>,
}

/// POST /messages
pub async fn post_message(
    State(state): State<AppState>,
    credentials: Credentials,
    payload: Result<Payload<PostMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let message = in_transaction(&state, move |tx, now| {
        let author = AuthGate::new(tx, now)
            .admit_user(Policy::Required(Scheme::Bearer), &credentials)?;
        let Payload(req) = payload?;
        Ledger::new(tx, now).post(req, &author)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, format!("/messages/{}", message.id))],
        Json(message.to_public()),
    ))
}

/// GET /messages
pub async fn list_messages(
    State(state): State<AppState>,
    credentials: Credentials,
    Params(query): Params<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let cursor = query.updated_since.unwrap_or(0);

    let rows = in_transaction(&state, move |tx, now| {
        AuthGate::new(tx, now).admit(Policy::Public, &credentials)?;
        Ledger::new(tx, now).list_since(cursor)
    })
    .await?;

    Ok(Json(MessageList {
        messages: rows.iter().map(|row| row.to_public()).collect(),
    }))
}

/// GET /users/{id}/messages
pub async fn list_by_author(
    State(state): State<AppState>,
    ResourceId(author_id): ResourceId,
    credentials: Credentials,
    Params(query): Params<MessageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = in_transaction(&state, move |tx, now| {
        AuthGate::new(tx, now).admit(Policy::Public, &credentials)?;
        Ledger::new(tx, now).list_by_author(&author_id, query.updated_since)
    })
    .await?;

    Ok(Json(MessageList {
        messages: rows.iter().map(|row| row.to_public()).collect(),
    }))
}

/// GET /messages/{id}
pub async fn get_message(
    State(state): State<AppState>,
    ResourceId(id): ResourceId,
    credentials: Credentials,
) -> Result<impl IntoResponse, ApiError> {
    let message = in_transaction(&state, move |tx, now| {
        AuthGate::new(tx, now).admit(Policy::Public, &credentials)?;
        Ledger::new(tx, now).get(&id)
    })
    .await?;

    Ok(Json(message.to_public()))
}

/// PUT /messages/{id}
pub async fn update_message(
    State(state): State<AppState>,
    id: Result<ResourceId, ApiError>,
    credentials: Credentials,
    payload: Result<Payload<UpdateMessageRequest>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    in_transaction(&state, move |tx, now| {
        let actor = AuthGate::new(tx, now)
            .admit_user(Policy::SelfOnly(Scheme::Bearer), &credentials)?;
        let ResourceId(id) = id?;
        let Payload(req) = payload?;
        Ledger::new(tx, now).update(&id, req, &actor)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
