//! In-process store with the same semantics as the `PostgreSQL` one.
//!
//! Every operation runs inside one critical section, which gives the same
//! atomicity the SQL statements get from row locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    normalize_email, Account, AccountStore, AttemptAdmission, AttemptGate, LoginAttempt, NewAccount,
    NewQuizResult, Quiz, QuizResult, QuizStore, Store, StoreError,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    quizzes: Vec<Quiz>,
    results: Vec<QuizResult>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a quiz definition. Quizzes are read-only through the API.
    pub async fn insert_quiz(
        &self,
        slug: &str,
        title: &str,
        category: &str,
        questions: serde_json::Value,
        is_active: bool,
    ) -> Quiz {
        let quiz = Quiz {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: title.to_string(),
            description: String::new(),
            category: category.to_string(),
            questions,
            is_active,
            created_at: Utc::now(),
        };
        self.inner.lock().await.quizzes.push(quiz.clone());
        quiz
    }

    /// Snapshot of an account row, for assertions.
    pub async fn account(&self, id: Uuid) -> Option<Account> {
        self.inner.lock().await.accounts.get(&id).cloned()
    }
}

impl Inner {
    fn account_mut(&mut self, id: Uuid) -> Result<&mut Account, StoreError> {
        self.accounts.get_mut(&id).ok_or(StoreError::NotFound)
    }

    fn find(&self, predicate: impl Fn(&Account) -> bool) -> Option<Account> {
        self.accounts.values().find(|a| predicate(a)).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut inner = self.inner.lock().await;
        let email = normalize_email(&account.email);
        if inner
            .accounts
            .values()
            .any(|a| a.username == account.username || a.email == email)
        {
            return Err(StoreError::Conflict);
        }
        let created = Account {
            id: Uuid::new_v4(),
            username: account.username,
            email,
            password_hash: account.password_hash,
            is_verified: false,
            verify_token_hash: Some(account.verify_token_hash),
            verify_token_expires_at: Some(account.verify_token_expires_at),
            reset_token_hash: None,
            reset_token_expires_at: None,
            login_attempts: 0,
            lock_until: None,
            avatar_url: account.avatar_url,
            created_at: Utc::now(),
        };
        inner.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.inner.lock().await.accounts.get(&id).cloned())
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        let username = identifier.trim();
        let email = normalize_email(identifier);
        Ok(self
            .inner
            .lock()
            .await
            .find(|a| a.username == username || a.email == email))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let email = normalize_email(email);
        Ok(self.inner.lock().await.find(|a| a.email == email))
    }

    async fn admit_login_attempt(
        &self,
        id: Uuid,
        gate: AttemptGate,
    ) -> Result<AttemptAdmission, StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.account_mut(id)?;
        if let Some(until) = account.lock_until.filter(|until| *until > gate.now) {
            return Ok(AttemptAdmission::Locked { until });
        }
        if account.login_attempts >= gate.captcha_threshold && !gate.captcha_verified {
            return Ok(AttemptAdmission::CaptchaRequired);
        }
        let attempts = if gate.captcha_verified {
            1
        } else {
            account.login_attempts + 1
        };
        if attempts >= gate.max_attempts {
            account.login_attempts = 0;
            account.lock_until = Some(gate.lock_until);
        } else {
            account.login_attempts = attempts;
            account.lock_until = None;
        }
        Ok(AttemptAdmission::Admitted(LoginAttempt {
            attempts: account.login_attempts,
            lock_until: account.lock_until,
        }))
    }

    async fn clear_login_attempts(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        own_lock: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.account_mut(id)?;
        let foreign_lock = account
            .lock_until
            .is_some_and(|until| until > now && Some(until) != own_lock);
        if foreign_lock {
            return Ok(false);
        }
        account.login_attempts = 0;
        account.lock_until = None;
        Ok(true)
    }

    async fn set_verify_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.account_mut(id)?;
        account.verify_token_hash = Some(token_hash.to_vec());
        account.verify_token_expires_at = Some(expires_at);
        Ok(())
    }

    async fn find_by_verify_token(&self, token_hash: &[u8]) -> Result<Option<Account>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .find(|a| a.verify_token_hash.as_deref() == Some(token_hash)))
    }

    async fn consume_verify_token(&self, id: Uuid, token_hash: &[u8]) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.account_mut(id)?;
        if account.verify_token_hash.as_deref() != Some(token_hash) {
            return Ok(false);
        }
        account.is_verified = true;
        account.verify_token_hash = None;
        account.verify_token_expires_at = None;
        Ok(true)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.account_mut(id)?;
        account.reset_token_hash = Some(token_hash.to_vec());
        account.reset_token_expires_at = Some(expires_at);
        Ok(())
    }

    async fn find_by_reset_token(&self, token_hash: &[u8]) -> Result<Option<Account>, StoreError> {
        Ok(self
            .inner
            .lock()
            .await
            .find(|a| a.reset_token_hash.as_deref() == Some(token_hash)))
    }

    async fn complete_password_reset(
        &self,
        id: Uuid,
        token_hash: &[u8],
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.account_mut(id)?;
        if account.reset_token_hash.as_deref() != Some(token_hash) {
            return Ok(false);
        }
        account.password_hash = password_hash.to_string();
        account.reset_token_hash = None;
        account.reset_token_expires_at = None;
        account.login_attempts = 0;
        account.lock_until = None;
        Ok(true)
    }

    async fn update_username(&self, id: Uuid, username: &str) -> Result<Account, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner
            .accounts
            .values()
            .any(|a| a.id != id && a.username == username)
        {
            return Err(StoreError::Conflict);
        }
        let account = inner.account_mut(id)?;
        account.username = username.to_string();
        Ok(account.clone())
    }

    async fn set_avatar_url(&self, id: Uuid, avatar_url: &str) -> Result<Account, StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.account_mut(id)?;
        account.avatar_url = avatar_url.to_string();
        Ok(account.clone())
    }
}

#[async_trait]
impl QuizStore for MemoryStore {
    async fn list_active_quizzes(&self) -> Result<Vec<Quiz>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.quizzes.iter().filter(|q| q.is_active).cloned().collect())
    }

    async fn find_active_quiz(&self, slug: &str) -> Result<Option<Quiz>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .quizzes
            .iter()
            .find(|q| q.is_active && q.slug == slug)
            .cloned())
    }

    async fn insert_result(&self, result: NewQuizResult) -> Result<QuizResult, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.accounts.contains_key(&result.account_id) {
            return Err(StoreError::NotFound);
        }
        let stored = QuizResult {
            id: Uuid::new_v4(),
            account_id: result.account_id,
            test_id: result.test_id,
            test_name: result.test_name,
            score: result.score,
            result_text: result.result_text,
            answers: result.answers,
            category: result.category,
            completed_at: Utc::now(),
        };
        inner.results.push(stored.clone());
        Ok(stored)
    }

    async fn list_results(&self, account_id: Uuid) -> Result<Vec<QuizResult>, StoreError> {
        let inner = self.inner.lock().await;
        // Insertion order breaks ties between equal timestamps.
        let mut results: Vec<QuizResult> = inner
            .results
            .iter()
            .rev()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        Ok(results)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
