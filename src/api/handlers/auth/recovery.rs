//! Single-use opaque tokens for email verification and password reset.
//!
//! The raw token only goes out in an email link; accounts store its SHA-256
//! digest and look it up by digest.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};

use super::utils::hash_token;
use crate::store::Account;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenUseError {
    #[error("invalid token")]
    NotFound,
    #[error("token has expired")]
    Expired,
}

/// A freshly minted token: `raw` goes to the user, `digest` to the store.
pub struct IssuedToken {
    pub raw: String,
    pub digest: Vec<u8>,
}

/// 32 random bytes from the OS, hex-encoded.
pub(crate) fn generate_token() -> Result<IssuedToken> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    let raw = hex::encode(bytes);
    let digest = hash_token(&raw);
    Ok(IssuedToken { raw, digest })
}

/// Accept a token looked up by digest only while it is unexpired.
/// A missing expiry means the token never expires.
pub(crate) fn check_expiry(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), TokenUseError> {
    match expires_at {
        Some(expires_at) if expires_at <= now => Err(TokenUseError::Expired),
        _ => Ok(()),
    }
}

pub(crate) fn check_reset_token(
    account: Option<&Account>,
    now: DateTime<Utc>,
) -> Result<(), TokenUseError> {
    let account = account.ok_or(TokenUseError::NotFound)?;
    check_expiry(account.reset_token_expires_at, now)
}

pub(crate) fn check_verify_token(
    account: Option<&Account>,
    now: DateTime<Utc>,
) -> Result<(), TokenUseError> {
    let account = account.ok_or(TokenUseError::NotFound)?;
    check_expiry(account.verify_token_expires_at, now)
}

/// Frontend link embedded in outbound emails.
pub(crate) fn build_link(frontend_base_url: &str, path: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/{path}?token={token}")
}
