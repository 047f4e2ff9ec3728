use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use natter_types::api::TokenResponse;

use crate::auth::{AuthGate, Credentials, Policy, Scheme};
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::{AppState, in_transaction};

/// POST /tokens: exchange basic credentials for a bearer token. Repeated
/// calls return the same token until it is revoked.
pub async fn issue_token(
    State(state): State<AppState>,
    credentials: Credentials,
) -> Result<impl IntoResponse, ApiError> {
    let token = in_transaction(&state, move |tx, now| {
        let actor = AuthGate::new(tx, now)
            .admit_user(Policy::Required(Scheme::Basic), &credentials)?;
        CredentialStore::new(tx, now).issue_token(&actor)
    })
    .await?;

    Ok(Json(TokenResponse { token }))
}

/// DELETE /tokens
pub async fn revoke_token(
    State(state): State<AppState>,
    credentials: Credentials,
) -> Result<impl IntoResponse, ApiError> {
    in_transaction(&state, move |tx, now| {
        let actor = AuthGate::new(tx, now)
            .admit_user(Policy::Required(Scheme::Bearer), &credentials)?;
        CredentialStore::new(tx, now).revoke_token(&actor)
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
