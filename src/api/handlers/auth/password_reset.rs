//! Password recovery: request a reset link, then redeem it once.
//!
//! The request endpoint answers identically whether or not the email is
//! registered. Redeeming is a conditional update keyed on the token digest,
//! so a replayed or concurrently reused token fails.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::{
    password::hash_off_thread,
    rate_limit::{RateLimitAction, RateLimitDecision},
    recovery::{build_link, check_reset_token, generate_token, TokenUseError},
    state::AuthState,
    types::{ForgotPasswordRequest, MessageResponse, ResetPasswordRequest},
    utils::{hash_token, ClientIp},
};
use crate::{
    api::{
        email::reset_email,
        handlers::{valid_email, valid_password, ApiError},
    },
    store::{normalize_email, DynStore},
};

const FORGOT_PASSWORD_MESSAGE: &str =
    "If an account exists for that email, a password reset link has been sent.";

impl From<TokenUseError> for ApiError {
    fn from(err: TokenUseError) -> Self {
        match err {
            TokenUseError::NotFound => Self::InvalidToken,
            TokenUseError::Expired => Self::TokenExpired,
        }
    }
}

async fn issue_reset_link(
    store: &DynStore,
    auth_state: &AuthState,
    email: &str,
) -> anyhow::Result<()> {
    let Some(account) = store.find_by_email(email).await? else {
        return Ok(());
    };
    let token = generate_token()?;
    store
        .set_reset_token(
            account.id,
            &token.digest,
            Utc::now() + auth_state.config().reset_token_ttl(),
        )
        .await?;
    let link = build_link(
        auth_state.config().frontend_base_url(),
        "reset-password",
        &token.raw,
    );
    auth_state
        .email()
        .send(&reset_email(
            &account.email,
            &account.username,
            &link,
            auth_state.config().reset_token_ttl(),
        ))
        .await?;
    info!(account_id = %account.id, "password reset link issued");
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Same response whether or not the email is registered", body = MessageResponse),
        (status = 400, description = "Missing or malformed email", body = crate::api::handlers::error::ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn forgot_password(
    client_ip: ClientIp,
    Extension(store): Extension<DynStore>,
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_payload());
    };
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }

    let response = (
        StatusCode::OK,
        Json(MessageResponse::new(FORGOT_PASSWORD_MESSAGE)),
    );

    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ForgotPassword)
        == RateLimitDecision::Limited
    {
        warn!("forgot-password rate limited");
        return Ok(response);
    }

    if let Err(err) = issue_reset_link(&store, &auth_state, &email).await {
        error!("Failed to issue password reset link: {err:#}");
    }
    Ok(response)
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Invalid or expired token, or weak password", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Too many requests from this address", body = crate::api::handlers::error::ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    client_ip: ClientIp,
    Extension(store): Extension<DynStore>,
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ResetPassword)
        == RateLimitDecision::Limited
    {
        return Err(ApiError::RateLimited);
    }

    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_payload());
    };
    let token = request.token.trim();
    if token.is_empty() {
        return Err(ApiError::Validation("Token is required".to_string()));
    }
    if !valid_password(&request.password) {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters and include uppercase, lowercase, a digit and a symbol"
                .to_string(),
        ));
    }
    if request
        .confirm_password
        .as_deref()
        .is_some_and(|confirm| confirm != request.password)
    {
        return Err(ApiError::Validation("Passwords do not match".to_string()));
    }

    let digest = hash_token(token);
    let account = store.find_by_reset_token(&digest).await?;
    check_reset_token(account.as_ref(), Utc::now())?;
    let Some(account) = account else {
        return Err(ApiError::InvalidToken);
    };

    let password_hash = hash_off_thread(auth_state.hasher(), &request.password).await?;
    if !store
        .complete_password_reset(account.id, &digest, &password_hash)
        .await?
    {
        return Err(ApiError::InvalidToken);
    }

    info!(account_id = %account.id, "password reset completed");
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Password has been reset")),
    ))
}
