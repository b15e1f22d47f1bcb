//! Error responses shared by all handlers.
//!
//! Every failure renders as `{"error": <safe message>, "code": <machine code>}`.
//! Internal details are logged, never returned.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::store::StoreError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[schema(value_type = String)]
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha_required: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid credentials")]
    InvalidCredentials { captcha_required: bool },
    #[error("authentication required")]
    Unauthorized,
    #[error("invalid captcha")]
    InvalidCaptcha,
    #[error("captcha required")]
    CaptchaRequired,
    #[error("account locked")]
    AccountLocked,
    #[error("email not verified")]
    EmailNotVerified,
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    TokenExpired,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("too many requests")]
    RateLimited,
    #[error("{0} is not configured")]
    Unavailable(&'static str),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub(crate) fn missing_payload() -> Self {
        Self::Validation("Missing payload".to_string())
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidToken | Self::TokenExpired => {
                StatusCode::BAD_REQUEST
            }
            Self::InvalidCredentials { .. } | Self::Unauthorized | Self::InvalidCaptcha => {
                StatusCode::UNAUTHORIZED
            }
            Self::CaptchaRequired | Self::AccountLocked | Self::EmailNotVerified => {
                StatusCode::FORBIDDEN
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidCaptcha => "INVALID_CAPTCHA",
            Self::CaptchaRequired => "CAPTCHA_REQUIRED",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::EmailNotVerified => "EMAIL_NOT_VERIFIED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::RateLimited => "RATE_LIMITED",
            Self::Unavailable(_) => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn body(&self) -> ErrorBody {
        let error = match self {
            Self::Validation(message) => message.clone(),
            Self::InvalidCredentials { .. } => "Invalid credentials".to_string(),
            Self::Unauthorized => "Authentication required".to_string(),
            Self::InvalidCaptcha => "Invalid CAPTCHA".to_string(),
            Self::CaptchaRequired => "CAPTCHA verification required".to_string(),
            Self::AccountLocked => {
                "Account is temporarily locked. Try again later.".to_string()
            }
            Self::EmailNotVerified => "Email is not verified".to_string(),
            Self::InvalidToken => "Invalid token".to_string(),
            Self::TokenExpired => "Token has expired".to_string(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Conflict(message) => (*message).to_string(),
            Self::RateLimited => "Too many requests".to_string(),
            Self::Unavailable(what) => format!("{what} is not available"),
            Self::Internal(_) => "Internal server error".to_string(),
        };
        let captcha_required = match self {
            Self::InvalidCredentials { captcha_required } => Some(*captcha_required),
            Self::CaptchaRequired | Self::InvalidCaptcha => Some(true),
            _ => None,
        };
        ErrorBody {
            error,
            code: self.code(),
            captcha_required,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::Conflict("Already exists"),
            StoreError::NotFound => Self::NotFound("Record"),
            StoreError::Database(err) => Self::Internal(err.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("request failed: {err:#}");
        }
        (self.status(), Json(self.body())).into_response()
    }
}
