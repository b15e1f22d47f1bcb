//! Auth configuration and the shared state handed to auth handlers.

use std::sync::Arc;

use super::{
    captcha::CaptchaVerifier, lockout::LockoutPolicy, password::Hasher, rate_limit::RateLimiter,
    token::TokenIssuer,
};
use crate::api::email::EmailSender;

const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 60 * 60;
const DEFAULT_VERIFY_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    reset_token_ttl_seconds: i64,
    verify_token_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            verify_token_ttl_seconds: DEFAULT_VERIFY_TOKEN_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verify_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verify_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(crate) fn reset_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reset_token_ttl_seconds)
    }

    pub(crate) fn verify_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.verify_token_ttl_seconds)
    }

    /// Cross-site cookies need `Secure`, which browsers only honor over HTTPS.
    pub(crate) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    tokens: TokenIssuer,
    hasher: Hasher,
    lockout: LockoutPolicy,
    captcha: Arc<dyn CaptchaVerifier>,
    rate_limiter: Arc<dyn RateLimiter>,
    email: Arc<dyn EmailSender>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        tokens: TokenIssuer,
        captcha: Arc<dyn CaptchaVerifier>,
        rate_limiter: Arc<dyn RateLimiter>,
        email: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            config,
            tokens,
            hasher: Hasher::default(),
            lockout: LockoutPolicy::default(),
            captcha,
            rate_limiter,
            email,
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: Hasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn with_lockout(mut self, lockout: LockoutPolicy) -> Self {
        self.lockout = lockout;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    #[must_use]
    pub fn hasher(&self) -> &Hasher {
        &self.hasher
    }

    #[must_use]
    pub fn lockout(&self) -> &LockoutPolicy {
        &self.lockout
    }

    pub(crate) fn captcha(&self) -> &dyn CaptchaVerifier {
        self.captcha.as_ref()
    }

    pub(crate) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    pub(crate) fn email(&self) -> &dyn EmailSender {
        self.email.as_ref()
    }
}
