//! Authenticated principal extraction.
//!
//! Flow Overview: read the bearer token (header or cookie), validate it, load
//! the account it names and hand handlers a typed principal. Any failure is a
//! 401; tokens for accounts that no longer exist are rejected too.

use axum::{
    extract::FromRequestParts,
    http::request::Parts,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{session::extract_session_token, state::AuthState};
use crate::{api::handlers::ApiError, store::DynStore};

/// Authenticated account context derived from the bearer token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub account_id: Uuid,
    pub username: String,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = parts
            .extensions
            .get::<Arc<AuthState>>()
            .cloned()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("auth state layer missing")))?;
        let store = parts
            .extensions
            .get::<DynStore>()
            .cloned()
            .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("store layer missing")))?;

        let token = extract_session_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let identity = auth_state.tokens().validate(&token).map_err(|err| {
            debug!("Rejected bearer token: {err}");
            ApiError::Unauthorized
        })?;

        let account = store
            .find_by_id(identity.account_id)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(Self {
            account_id: account.id,
            username: account.username,
        })
    }
}
