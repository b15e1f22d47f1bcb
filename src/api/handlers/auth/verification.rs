//! Email verification and verification resend.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::{
    rate_limit::{RateLimitAction, RateLimitDecision},
    recovery::{build_link, check_verify_token, generate_token},
    state::AuthState,
    types::{MessageResponse, ResendVerificationRequest, VerifyEmailRequest},
    utils::{hash_token, ClientIp},
};
use crate::{
    api::{
        email::verification_email,
        handlers::{valid_email, ApiError},
    },
    store::{normalize_email, DynStore},
};

const RESEND_MESSAGE: &str =
    "If an unverified account exists for that email, a new verification link has been sent.";

#[utoipa::path(
    post,
    path = "/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Too many requests from this address", body = crate::api::handlers::error::ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn verify_email(
    client_ip: ClientIp,
    Extension(store): Extension<DynStore>,
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyEmail)
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

    let digest = hash_token(token);
    let account = store.find_by_verify_token(&digest).await?;
    check_verify_token(account.as_ref(), Utc::now())?;
    let Some(account) = account else {
        return Err(ApiError::InvalidToken);
    };
    if !store.consume_verify_token(account.id, &digest).await? {
        return Err(ApiError::InvalidToken);
    }

    info!(account_id = %account.id, "email verified");
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Email verified successfully")),
    ))
}

async fn reissue_verification(
    store: &DynStore,
    auth_state: &AuthState,
    email: &str,
) -> anyhow::Result<()> {
    let Some(account) = store.find_by_email(email).await? else {
        return Ok(());
    };
    if account.is_verified {
        return Ok(());
    }
    let token = generate_token()?;
    store
        .set_verify_token(
            account.id,
            &token.digest,
            Utc::now() + auth_state.config().verify_token_ttl(),
        )
        .await?;
    let link = build_link(
        auth_state.config().frontend_base_url(),
        "verify-email",
        &token.raw,
    );
    auth_state
        .email()
        .send(&verification_email(&account.email, &account.username, &link))
        .await?;
    info!(account_id = %account.id, "verification link reissued");
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Same response whether or not the email is registered", body = MessageResponse),
        (status = 400, description = "Missing or malformed email", body = crate::api::handlers::error::ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn resend_verification(
    client_ip: ClientIp,
    Extension(store): Extension<DynStore>,
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_payload());
    };
    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }

    let response = (StatusCode::OK, Json(MessageResponse::new(RESEND_MESSAGE)));

    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ResendVerification)
        == RateLimitDecision::Limited
    {
        warn!("resend-verification rate limited");
        return Ok(response);
    }

    if let Err(err) = reissue_verification(&store, &auth_state, &email).await {
        error!("Failed to reissue verification link: {err:#}");
    }
    Ok(response)
}
