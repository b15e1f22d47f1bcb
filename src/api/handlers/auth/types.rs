//! Request/response types for auth endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::Account;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterResponse {
    pub message: String,
    pub email_sent: bool,
}

/// `identifier` is a username or an email; `username` is accepted as an alias.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    #[serde(alias = "username")]
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub captcha_token: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub avatar_url: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Account> for UserResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            avatar_url: account.avatar_url.clone(),
            is_verified: account.is_verified,
            created_at: account.created_at,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
    #[serde(rename = "confirmPassword", default)]
    pub confirm_password: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_request_accepts_username_alias() -> anyhow::Result<()> {
        let request: LoginRequest =
            serde_json::from_str(r#"{"username": "alice", "password": "x"}"#)?;
        assert_eq!(request.identifier, "alice");
        assert!(request.captcha_token.is_none());

        let request: LoginRequest = serde_json::from_str(
            r#"{"identifier": "a@b.com", "password": "x", "captcha_token": "t"}"#,
        )?;
        assert_eq!(request.identifier, "a@b.com");
        assert_eq!(request.captcha_token.as_deref(), Some("t"));
        Ok(())
    }

    #[test]
    fn register_request_uses_camel_case_confirmation() -> anyhow::Result<()> {
        let request: RegisterRequest = serde_json::from_str(
            r#"{"username": "alice", "email": "a@b.com", "password": "p", "confirmPassword": "p"}"#,
        )?;
        assert_eq!(request.confirm_password, "p");
        Ok(())
    }
}
