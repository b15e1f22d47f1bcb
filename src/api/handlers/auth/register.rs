//! Account registration.
//!
//! Creates an unverified account and emails a verification link. The raw
//! verification token only leaves the server inside that email.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::{
    password::hash_off_thread,
    rate_limit::{RateLimitAction, RateLimitDecision},
    recovery::{build_link, generate_token},
    state::AuthState,
    types::{RegisterRequest, RegisterResponse},
    utils::ClientIp,
};
use crate::{
    api::{
        email::verification_email,
        handlers::{valid_email, valid_password, valid_username, ApiError},
        images::AvatarStorage,
    },
    store::{normalize_email, DynStore, NewAccount, StoreError},
};

fn validate(request: &RegisterRequest, email: &str) -> Result<(), ApiError> {
    if !valid_username(request.username.trim()) {
        return Err(ApiError::Validation(
            "Username must be 3-32 characters of letters, digits, '_', '.' or '-'".to_string(),
        ));
    }
    if !valid_email(email) {
        return Err(ApiError::Validation("Invalid email format".to_string()));
    }
    if !valid_password(&request.password) {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters and include uppercase, lowercase, a digit and a symbol"
                .to_string(),
        ));
    }
    if request.password != request.confirm_password {
        return Err(ApiError::Validation("Passwords do not match".to_string()));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created; verification email sent", body = RegisterResponse),
        (status = 400, description = "Invalid input", body = crate::api::handlers::error::ErrorBody),
        (status = 409, description = "Username or email already taken", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Too many requests from this address", body = crate::api::handlers::error::ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn register(
    client_ip: ClientIp,
    Extension(store): Extension<DynStore>,
    Extension(auth_state): Extension<Arc<AuthState>>,
    Extension(avatars): Extension<AvatarStorage>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Register)
        == RateLimitDecision::Limited
    {
        return Err(ApiError::RateLimited);
    }

    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_payload());
    };
    let email = normalize_email(&request.email);
    validate(&request, &email)?;

    let password_hash = hash_off_thread(auth_state.hasher(), &request.password).await?;
    let token = generate_token()?;
    let new_account = NewAccount {
        username: request.username.trim().to_string(),
        email,
        password_hash,
        verify_token_hash: token.digest,
        verify_token_expires_at: Utc::now() + auth_state.config().verify_token_ttl(),
        avatar_url: avatars.default_url().to_string(),
    };

    let account = match store.create_account(new_account).await {
        Ok(account) => account,
        Err(StoreError::Conflict) => {
            return Err(ApiError::Conflict("Username or email already taken"));
        }
        Err(err) => return Err(err.into()),
    };
    info!(account_id = %account.id, "account registered");

    let link = build_link(
        auth_state.config().frontend_base_url(),
        "verify-email",
        &token.raw,
    );
    let message = verification_email(&account.email, &account.username, &link);
    let email_sent = match auth_state.email().send(&message).await {
        Ok(()) => true,
        Err(err) => {
            error!("Failed to send verification email: {err:#}");
            false
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Check your email to verify your account."
                .to_string(),
            email_sent,
        }),
    ))
}
