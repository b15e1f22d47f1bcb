//! Auth handlers and supporting modules.
//!
//! This module coordinates registration, password login with account lockout,
//! bearer tokens and the email token lifecycles (verification and reset).
//!
//! ## Lockout
//!
//! Failed logins are counted per account in the store.
//!
//! - **CAPTCHA:** from 3 consecutive failures on, a verified CAPTCHA response
//!   is required before the password is even checked.
//! - **Lock:** the 5th consecutive failure locks the account for 15 minutes and
//!   restarts the counter.
//! - **Reset:** a successful login or a completed password reset clears both.
//!
//! An in-process token bucket per client address sits in front of all of
//! this and answers 429 before the store is touched.

pub mod captcha;
pub mod lockout;
pub mod login;
pub mod password;
pub(crate) mod password_reset;
pub(crate) mod principal;
pub mod rate_limit;
pub(crate) mod recovery;
pub(crate) mod register;
pub(crate) mod session;
mod state;
pub mod token;
pub(crate) mod types;
mod utils;
pub(crate) mod verification;

pub use captcha::{CaptchaVerifier, RecaptchaVerifier};
pub use lockout::{LockoutPolicy, LockoutState};
pub use password::Hasher;
pub use principal::Principal;
pub use rate_limit::{NoopRateLimiter, RateLimiter, TokenBucketRateLimiter};
pub use state::{AuthConfig, AuthState};
pub use token::TokenIssuer;
