//! Authenticated self-service endpoints.
//!
//! Flow Overview:
//! 1) Authenticate via bearer token or session cookie (`Principal`).
//! 2) Resolve the current account from the store.
//! 3) Apply allow-listed updates (username only).

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{auth::types::UserResponse, auth::Principal, valid_username, ApiError};
use crate::store::{DynStore, StoreError};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct MeUpdateRequest {
    pub username: String,
}

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Return the authenticated account profile.", body = UserResponse),
        (status = 401, description = "Missing or invalid token.", body = super::error::ErrorBody),
    ),
    tag = "me"
)]
pub async fn get_me(
    principal: Principal,
    Extension(store): Extension<DynStore>,
) -> Result<impl IntoResponse, ApiError> {
    let account = store
        .find_by_id(principal.account_id)
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok((StatusCode::OK, Json(UserResponse::from(&account))))
}

#[utoipa::path(
    put,
    path = "/me",
    request_body = MeUpdateRequest,
    responses(
        (status = 200, description = "Profile updated.", body = UserResponse),
        (status = 400, description = "Invalid update payload.", body = super::error::ErrorBody),
        (status = 401, description = "Missing or invalid token.", body = super::error::ErrorBody),
        (status = 409, description = "Username already taken.", body = super::error::ErrorBody),
    ),
    tag = "me"
)]
#[instrument(skip_all, fields(account_id = %principal.account_id))]
pub async fn put_me(
    principal: Principal,
    Extension(store): Extension<DynStore>,
    payload: Option<Json<MeUpdateRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_payload());
    };
    let username = request.username.trim();
    if !valid_username(username) {
        return Err(ApiError::Validation(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".to_string(),
        ));
    }

    let account = match store.update_username(principal.account_id, username).await {
        Ok(account) => account,
        Err(StoreError::Conflict) => return Err(ApiError::Conflict("Username already taken")),
        Err(StoreError::NotFound) => return Err(ApiError::Unauthorized),
        Err(err) => return Err(err.into()),
    };
    if account.username != principal.username {
        info!(from = %principal.username, to = %account.username, "username changed");
    }
    Ok((StatusCode::OK, Json(UserResponse::from(&account))))
}
