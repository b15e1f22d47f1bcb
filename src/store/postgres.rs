//! `PostgreSQL` implementation of the store traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgArguments, PgRow},
    query::Query,
    PgPool, Postgres, Row,
};
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::{
    Account, AccountStore, AttemptAdmission, AttemptGate, LoginAttempt, NewAccount, NewQuizResult,
    Quiz, QuizResult, QuizStore, Store, StoreError,
};

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, is_verified, \
    verify_token_hash, verify_token_expires_at, reset_token_hash, reset_token_expires_at, \
    login_attempts, lock_until, avatar_url, created_at";

const QUIZ_COLUMNS: &str =
    "id, slug, title, description, category, questions, is_active, created_at";

const RESULT_COLUMNS: &str =
    "id, account_id, test_id, test_name, score, result_text, answers, category, completed_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict
    } else {
        StoreError::Database(err)
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        is_verified: row.try_get("is_verified")?,
        verify_token_hash: row.try_get("verify_token_hash")?,
        verify_token_expires_at: row.try_get("verify_token_expires_at")?,
        reset_token_hash: row.try_get("reset_token_hash")?,
        reset_token_expires_at: row.try_get("reset_token_expires_at")?,
        login_attempts: row.try_get("login_attempts")?,
        lock_until: row.try_get("lock_until")?,
        avatar_url: row.try_get("avatar_url")?,
        created_at: row.try_get("created_at")?,
    })
}

fn quiz_from_row(row: &PgRow) -> Result<Quiz, sqlx::Error> {
    Ok(Quiz {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        questions: row.try_get("questions")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn result_from_row(row: &PgRow) -> Result<QuizResult, sqlx::Error> {
    Ok(QuizResult {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        test_id: row.try_get("test_id")?,
        test_name: row.try_get("test_name")?,
        score: row.try_get("score")?,
        result_text: row.try_get("result_text")?,
        answers: row.try_get("answers")?,
        category: row.try_get("category")?,
        completed_at: row.try_get("completed_at")?,
    })
}

impl PgStore {
    async fn fetch_account(
        &self,
        statement: &str,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<Option<Account>, StoreError> {
        let row = query
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", statement))
            .await?;
        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn update_account(
        &self,
        query: &str,
        id: Uuid,
        value: &str,
    ) -> Result<Account, StoreError> {
        let row = sqlx::query(query)
            .bind(id)
            .bind(value)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await
            .map_err(map_write_error)?;
        match row {
            Some(row) => Ok(account_from_row(&row)?),
            None => Err(StoreError::NotFound),
        }
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        let query = format!(
            "INSERT INTO accounts \
                (username, email, password_hash, verify_token_hash, verify_token_expires_at, avatar_url) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.verify_token_hash)
            .bind(account.verify_token_expires_at)
            .bind(&account.avatar_url)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .map_err(map_write_error)?;
        Ok(account_from_row(&row)?)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        self.fetch_account(&query, sqlx::query(&query).bind(id))
            .await
    }

    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, StoreError> {
        let query = format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1 OR email = $2 LIMIT 1"
        );
        let email = super::normalize_email(identifier);
        self.fetch_account(
            &query,
            sqlx::query(&query).bind(identifier.trim()).bind(email),
        )
        .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let email = super::normalize_email(email);
        self.fetch_account(&query, sqlx::query(&query).bind(email))
            .await
    }

    async fn admit_login_attempt(
        &self,
        id: Uuid,
        gate: AttemptGate,
    ) -> Result<AttemptAdmission, StoreError> {
        // The WHERE clause is the gate. Concurrent attempts serialize on the
        // row lock and each re-checks it against the latest counter.
        let query = r"
            UPDATE accounts SET
                login_attempts = CASE
                    WHEN (CASE WHEN $3 THEN 0 ELSE login_attempts END) + 1 >= $4 THEN 0
                    ELSE (CASE WHEN $3 THEN 0 ELSE login_attempts END) + 1
                END,
                lock_until = CASE
                    WHEN (CASE WHEN $3 THEN 0 ELSE login_attempts END) + 1 >= $4 THEN $5
                    ELSE NULL
                END,
                updated_at = NOW()
            WHERE id = $1
              AND (lock_until IS NULL OR lock_until <= $6)
              AND (login_attempts < $2 OR $3)
            RETURNING login_attempts, lock_until
        ";
        let row = sqlx::query(query)
            .bind(id)
            .bind(gate.captcha_threshold)
            .bind(gate.captcha_verified)
            .bind(gate.max_attempts)
            .bind(gate.lock_until)
            .bind(gate.now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        if let Some(row) = row {
            return Ok(AttemptAdmission::Admitted(LoginAttempt {
                attempts: row.try_get("login_attempts")?,
                lock_until: row.try_get("lock_until")?,
            }));
        }

        let query = "SELECT lock_until FROM accounts WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?
            .ok_or(StoreError::NotFound)?;
        let lock_until: Option<DateTime<Utc>> = row.try_get("lock_until")?;
        Ok(match lock_until {
            Some(until) if until > gate.now => AttemptAdmission::Locked { until },
            _ => AttemptAdmission::CaptchaRequired,
        })
    }

    async fn clear_login_attempts(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        own_lock: Option<DateTime<Utc>>,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE accounts
            SET login_attempts = 0, lock_until = NULL, updated_at = NOW()
            WHERE id = $1
              AND (lock_until IS NULL OR lock_until <= $2 OR lock_until = $3)
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(now)
            .bind(own_lock)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_verify_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET verify_token_hash = $2, verify_token_expires_at = $3, updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(())
    }

    async fn find_by_verify_token(&self, token_hash: &[u8]) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE verify_token_hash = $1");
        self.fetch_account(&query, sqlx::query(&query).bind(token_hash))
            .await
    }

    async fn consume_verify_token(&self, id: Uuid, token_hash: &[u8]) -> Result<bool, StoreError> {
        let query = r"
            UPDATE accounts
            SET is_verified = TRUE,
                verify_token_hash = NULL,
                verify_token_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND verify_token_hash = $2
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET reset_token_hash = $2, reset_token_expires_at = $3, updated_at = NOW()
            WHERE id = $1
        ";
        sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(())
    }

    async fn find_by_reset_token(&self, token_hash: &[u8]) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE reset_token_hash = $1");
        self.fetch_account(&query, sqlx::query(&query).bind(token_hash))
            .await
    }

    async fn complete_password_reset(
        &self,
        id: Uuid,
        token_hash: &[u8],
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE accounts
            SET password_hash = $3,
                reset_token_hash = NULL,
                reset_token_expires_at = NULL,
                login_attempts = 0,
                lock_until = NULL,
                updated_at = NOW()
            WHERE id = $1 AND reset_token_hash = $2
        ";
        let result = sqlx::query(query)
            .bind(id)
            .bind(token_hash)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(db_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn update_username(&self, id: Uuid, username: &str) -> Result<Account, StoreError> {
        let query = format!(
            "UPDATE accounts SET username = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        self.update_account(&query, id, username).await
    }

    async fn set_avatar_url(&self, id: Uuid, avatar_url: &str) -> Result<Account, StoreError> {
        let query = format!(
            "UPDATE accounts SET avatar_url = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        self.update_account(&query, id, avatar_url).await
    }
}

#[async_trait]
impl QuizStore for PgStore {
    async fn list_active_quizzes(&self) -> Result<Vec<Quiz>, StoreError> {
        let query =
            format!("SELECT {QUIZ_COLUMNS} FROM tests WHERE is_active = TRUE ORDER BY created_at");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(rows
            .iter()
            .map(quiz_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_active_quiz(&self, slug: &str) -> Result<Option<Quiz>, StoreError> {
        let query =
            format!("SELECT {QUIZ_COLUMNS} FROM tests WHERE slug = $1 AND is_active = TRUE");
        let row = sqlx::query(&query)
            .bind(slug)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(quiz_from_row).transpose()?)
    }

    async fn insert_result(&self, result: NewQuizResult) -> Result<QuizResult, StoreError> {
        let query = format!(
            "INSERT INTO test_results \
                (account_id, test_id, test_name, score, result_text, answers, category) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {RESULT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(result.account_id)
            .bind(result.test_id)
            .bind(&result.test_name)
            .bind(result.score)
            .bind(&result.result_text)
            .bind(&result.answers)
            .bind(&result.category)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await?;
        Ok(result_from_row(&row)?)
    }

    async fn list_results(&self, account_id: Uuid) -> Result<Vec<QuizResult>, StoreError> {
        let query = format!(
            "SELECT {RESULT_COLUMNS} FROM test_results WHERE account_id = $1 \
             ORDER BY completed_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(account_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(rows
            .iter()
            .map(result_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct FakeDbError {
        code: &'static str,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake database error")
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "fake database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = sqlx::Error::Database(Box::new(FakeDbError { code: "23505" }));
        assert!(is_unique_violation(&err));
        assert!(matches!(map_write_error(err), StoreError::Conflict));
    }

    #[test]
    fn other_database_errors_pass_through() {
        let err = sqlx::Error::Database(Box::new(FakeDbError { code: "40001" }));
        assert!(!is_unique_violation(&err));
        assert!(matches!(map_write_error(err), StoreError::Database(_)));
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
