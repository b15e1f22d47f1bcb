//! Persistence for accounts, quizzes and quiz results.
//!
//! Handlers only see the [`Store`] trait object. `PostgreSQL` backs it in
//! production ([`postgres::PgStore`]); [`memory::MemoryStore`] keeps the same
//! semantics in-process for tests and local experiments.
//!
//! Lockout counters are only touched through two conditional operations:
//! [`AccountStore::admit_login_attempt`] checks the lock and the CAPTCHA
//! threshold and counts the attempt in the same step, and
//! [`AccountStore::clear_login_attempts`] refuses to lift a lock it did not
//! engage. Callers never read, modify and write the counter themselves.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Shared handle injected into the router.
pub type DynStore = Arc<dyn Store>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique column (username, email) already holds this value.
    #[error("unique constraint violated")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Full account row, including credential and lockout state.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub verify_token_hash: Option<Vec<u8>>,
    pub verify_token_expires_at: Option<DateTime<Utc>>,
    pub reset_token_hash: Option<Vec<u8>>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub login_attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
    pub avatar_url: String,
    pub created_at: DateTime<Utc>,
}

/// Values needed to create an account at registration.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub verify_token_hash: Vec<u8>,
    pub verify_token_expires_at: DateTime<Utc>,
    pub avatar_url: String,
}

/// Inputs for admitting one login attempt.
#[derive(Clone, Copy, Debug)]
pub struct AttemptGate {
    pub captcha_threshold: i32,
    /// A verified CAPTCHA restarts the counter before this attempt is counted.
    pub captcha_verified: bool,
    pub max_attempts: i32,
    pub now: DateTime<Utc>,
    /// Lock expiry stored if this attempt reaches `max_attempts`.
    pub lock_until: DateTime<Utc>,
}

/// Lockout counters as they stand right after an attempt was admitted and
/// counted as a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoginAttempt {
    pub attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
}

impl LoginAttempt {
    /// The attempt that reaches the limit resets the counter and sets the lock,
    /// so a zero counter after an increment means this attempt engaged it.
    #[must_use]
    pub fn engaged_lock(&self) -> Option<DateTime<Utc>> {
        self.lock_until.filter(|_| self.attempts == 0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptAdmission {
    /// The password may be checked; the attempt is already counted.
    Admitted(LoginAttempt),
    Locked { until: DateTime<Utc> },
    CaptchaRequired,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct Quiz {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub category: String,
    #[schema(value_type = Object)]
    pub questions: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewQuizResult {
    pub account_id: Uuid,
    pub test_id: Uuid,
    pub test_name: String,
    pub score: i32,
    pub result_text: String,
    pub answers: serde_json::Value,
    pub category: String,
}

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct QuizResult {
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub account_id: Uuid,
    pub test_id: Uuid,
    pub test_name: String,
    pub score: i32,
    pub result_text: String,
    #[schema(value_type = Object)]
    pub answers: serde_json::Value,
    pub category: String,
    pub completed_at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a new unverified account.
    ///
    /// # Errors
    /// `StoreError::Conflict` when the username or email is taken.
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Match either the username or the (normalized) email.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// In one atomic step: reject while a lock is active, reject past the
    /// CAPTCHA threshold unless `gate.captcha_verified`, otherwise count the
    /// attempt as a failure. The attempt that reaches `gate.max_attempts`
    /// resets the counter and sets `lock_until`.
    async fn admit_login_attempt(
        &self,
        id: Uuid,
        gate: AttemptGate,
    ) -> Result<AttemptAdmission, StoreError>;

    /// Clear the counter and any lock after a correct password. A lock that
    /// is still active at `now` is only cleared when it equals `own_lock`.
    /// Returns `false`, leaving the row untouched, when another attempt locked
    /// the account in the meantime.
    async fn clear_login_attempts(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        own_lock: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError>;

    /// Replace the outstanding verification token, superseding the old one.
    async fn set_verify_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_by_verify_token(&self, token_hash: &[u8]) -> Result<Option<Account>, StoreError>;

    /// Mark the account verified if `token_hash` is still its current token.
    /// Returns `false` when the token was already consumed or replaced.
    async fn consume_verify_token(&self, id: Uuid, token_hash: &[u8]) -> Result<bool, StoreError>;

    /// Replace the outstanding reset token, superseding the old one.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_by_reset_token(&self, token_hash: &[u8]) -> Result<Option<Account>, StoreError>;

    /// Store the new password, clear the reset token and the lockout state, in
    /// one step conditioned on `token_hash`. Returns `false` on replay.
    async fn complete_password_reset(
        &self,
        id: Uuid,
        token_hash: &[u8],
        password_hash: &str,
    ) -> Result<bool, StoreError>;

    /// # Errors
    /// `StoreError::Conflict` when another account owns `username`,
    /// `StoreError::NotFound` when the account does not exist.
    async fn update_username(&self, id: Uuid, username: &str) -> Result<Account, StoreError>;

    /// # Errors
    /// `StoreError::NotFound` when the account does not exist.
    async fn set_avatar_url(&self, id: Uuid, avatar_url: &str) -> Result<Account, StoreError>;
}

#[async_trait]
pub trait QuizStore: Send + Sync {
    async fn list_active_quizzes(&self) -> Result<Vec<Quiz>, StoreError>;

    /// Inactive quizzes are reported as missing.
    async fn find_active_quiz(&self, slug: &str) -> Result<Option<Quiz>, StoreError>;

    async fn insert_result(&self, result: NewQuizResult) -> Result<QuizResult, StoreError>;

    /// Results for one account, newest first.
    async fn list_results(&self, account_id: Uuid) -> Result<Vec<QuizResult>, StoreError>;
}

#[async_trait]
pub trait Store: AccountStore + QuizStore {
    /// Cheap liveness probe for `/health`.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Lookup key for emails: trimmed and lowercased.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
