//! Password login guarded by the lockout policy.
//!
//! Flow Overview, evaluated in order at every attempt:
//! 1) An active lock rejects immediately; no attempt is counted and the
//!    password is not checked.
//! 2) Past the CAPTCHA threshold a CAPTCHA response is mandatory. Without one
//!    the attempt is rejected without counting; a verified one clears the
//!    counter and the lock.
//! 3) The store admits the attempt and counts it as a failure in the same
//!    conditional step that re-checks 1) and 2), so concurrent attempts can
//!    never check more passwords than the counter allows. Reaching the limit
//!    locks the account and restarts the counter.
//! 4) A right password clears the counter unless another attempt locked the
//!    account meanwhile, then unverified accounts are rejected and verified
//!    ones get a token.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{
    lockout::LockoutState,
    password::HashError,
    rate_limit::{RateLimitAction, RateLimitDecision},
    session::session_cookie,
    state::AuthState,
    types::{LoginRequest, LoginResponse, UserResponse},
    utils::ClientIp,
};
use crate::{
    api::handlers::ApiError,
    store::{Account, AttemptAdmission, Store},
};

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("invalid credentials")]
    InvalidCredentials { captcha_required: bool },
    #[error("account locked until {until}")]
    Locked { until: DateTime<Utc> },
    #[error("captcha required")]
    CaptchaRequired,
    #[error("invalid captcha")]
    InvalidCaptcha,
    #[error("email not verified")]
    EmailNotVerified,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<crate::store::StoreError> for LoginError {
    fn from(err: crate::store::StoreError) -> Self {
        Self::Internal(err.into())
    }
}

impl From<LoginError> for ApiError {
    fn from(err: LoginError) -> Self {
        match err {
            LoginError::InvalidCredentials { captcha_required } => {
                Self::InvalidCredentials { captcha_required }
            }
            LoginError::Locked { .. } => Self::AccountLocked,
            LoginError::CaptchaRequired => Self::CaptchaRequired,
            LoginError::InvalidCaptcha => Self::InvalidCaptcha,
            LoginError::EmailNotVerified => Self::EmailNotVerified,
            LoginError::Internal(err) => Self::Internal(err),
        }
    }
}

async fn verify_password(
    auth: &AuthState,
    digest: &str,
    password: &str,
) -> Result<bool, LoginError> {
    let hasher = auth.hasher().clone();
    let digest = digest.to_string();
    let password = password.to_string();
    let outcome = tokio::task::spawn_blocking(move || hasher.verify(&digest, &password))
        .await
        .map_err(|err| LoginError::Internal(err.into()))?;
    match outcome {
        Ok(matches) => Ok(matches),
        Err(HashError::Malformed) => Err(LoginError::Internal(anyhow::anyhow!(
            "stored password digest is malformed"
        ))),
        Err(err) => Err(LoginError::Internal(err.into())),
    }
}

/// Run one login attempt through the lockout policy.
///
/// # Errors
/// One `LoginError` per rejection; store and hashing failures are `Internal`.
pub async fn authenticate(
    store: &dyn Store,
    auth: &AuthState,
    request: &LoginRequest,
    client_ip: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Account, LoginError> {
    let policy = auth.lockout();
    let Some(mut account) = store.find_by_identifier(&request.identifier).await? else {
        return Err(LoginError::InvalidCredentials {
            captcha_required: false,
        });
    };

    let captcha_verified = match policy.state(account.login_attempts, account.lock_until, now) {
        LockoutState::Locked { until } => return Err(LoginError::Locked { until }),
        LockoutState::CaptchaRequired => {
            let response = request
                .captcha_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .ok_or(LoginError::CaptchaRequired)?;
            if !auth.captcha().verify(response, client_ip).await? {
                return Err(LoginError::InvalidCaptcha);
            }
            true
        }
        LockoutState::Open => false,
    };

    let attempt = match store
        .admit_login_attempt(account.id, policy.gate(now, captcha_verified))
        .await?
    {
        AttemptAdmission::Admitted(attempt) => attempt,
        AttemptAdmission::Locked { until } => return Err(LoginError::Locked { until }),
        AttemptAdmission::CaptchaRequired => return Err(LoginError::CaptchaRequired),
    };

    if !verify_password(auth, &account.password_hash, &request.password).await? {
        if attempt.engaged_lock().is_some() {
            warn!(account_id = %account.id, "account locked after repeated failures");
        }
        return Err(LoginError::InvalidCredentials {
            captcha_required: policy.captcha_required(attempt.attempts),
        });
    }

    if !store
        .clear_login_attempts(account.id, now, attempt.engaged_lock())
        .await?
    {
        let until = store
            .find_by_id(account.id)
            .await?
            .and_then(|current| current.lock_until)
            .unwrap_or(now);
        return Err(LoginError::Locked { until });
    }
    account.login_attempts = 0;
    account.lock_until = None;

    if !account.is_verified {
        return Err(LoginError::EmailNotVerified);
    }
    Ok(account)
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in; token also set as cookie", body = LoginResponse),
        (status = 400, description = "Missing or invalid payload", body = crate::api::handlers::error::ErrorBody),
        (status = 401, description = "Invalid credentials or CAPTCHA", body = crate::api::handlers::error::ErrorBody),
        (status = 403, description = "Locked, CAPTCHA required or email not verified", body = crate::api::handlers::error::ErrorBody),
        (status = 429, description = "Too many requests from this address", body = crate::api::handlers::error::ErrorBody),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn login(
    client_ip: ClientIp,
    Extension(store): Extension<Arc<dyn Store>>,
    Extension(auth_state): Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    if auth_state
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
    {
        return Err(ApiError::RateLimited);
    }

    let Some(Json(request)) = payload else {
        return Err(ApiError::missing_payload());
    };
    if request.identifier.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::Validation(
            "Identifier and password are required".to_string(),
        ));
    }

    let account = authenticate(
        store.as_ref(),
        &auth_state,
        &request,
        client_ip.as_deref(),
        Utc::now(),
    )
    .await?;

    let token = auth_state
        .tokens()
        .issue(account.id, &account.username)
        .map_err(|err| ApiError::Internal(err.into()))?;

    let mut headers = HeaderMap::new();
    match session_cookie(&auth_state, &token) {
        Ok(cookie) => {
            headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => warn!("Failed to build session cookie: {err}"),
    }

    info!(account_id = %account.id, "login succeeded");
    Ok((
        StatusCode::OK,
        headers,
        Json(LoginResponse {
            token,
            user: UserResponse::from(&account),
        }),
    ))
}
