//! Per-account lockout policy: open, CAPTCHA required, locked.

use chrono::{DateTime, Duration, Utc};

use crate::store::AttemptGate;

pub const DEFAULT_CAPTCHA_THRESHOLD: i32 = 3;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;
pub const DEFAULT_LOCK_SECONDS: i64 = 15 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockoutState {
    Open,
    CaptchaRequired,
    Locked { until: DateTime<Utc> },
}

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    captcha_threshold: i32,
    max_attempts: i32,
    lock_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            captcha_threshold: DEFAULT_CAPTCHA_THRESHOLD,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lock_duration: Duration::seconds(DEFAULT_LOCK_SECONDS),
        }
    }
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(captcha_threshold: i32, max_attempts: i32, lock_duration: Duration) -> Self {
        Self {
            captcha_threshold,
            max_attempts,
            lock_duration,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> i32 {
        self.max_attempts
    }

    #[must_use]
    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    /// Where the account stands before this attempt. An expired lock counts as open.
    #[must_use]
    pub fn state(
        &self,
        attempts: i32,
        lock_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> LockoutState {
        match lock_until {
            Some(until) if until > now => LockoutState::Locked { until },
            _ if self.captcha_required(attempts) => LockoutState::CaptchaRequired,
            _ => LockoutState::Open,
        }
    }

    #[must_use]
    pub fn captcha_required(&self, attempts: i32) -> bool {
        attempts >= self.captcha_threshold
    }

    /// Lock expiry to store if this failure reaches the limit.
    #[must_use]
    pub fn lock_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.lock_duration
    }

    /// Store-side gate for one attempt made at `now`.
    #[must_use]
    pub fn gate(&self, now: DateTime<Utc>, captcha_verified: bool) -> AttemptGate {
        AttemptGate {
            captcha_threshold: self.captcha_threshold,
            captcha_verified,
            max_attempts: self.max_attempts,
            now,
            lock_until: self.lock_until(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_account_is_open() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.state(0, None, Utc::now()), LockoutState::Open);
        assert_eq!(policy.state(2, None, Utc::now()), LockoutState::Open);
    }

    #[test]
    fn three_failures_require_captcha() {
        let policy = LockoutPolicy::default();
        assert_eq!(
            policy.state(3, None, Utc::now()),
            LockoutState::CaptchaRequired
        );
        assert_eq!(
            policy.state(4, None, Utc::now()),
            LockoutState::CaptchaRequired
        );
    }

    #[test]
    fn future_lock_wins_over_counter() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        let until = now + Duration::minutes(15);
        assert_eq!(
            policy.state(0, Some(until), now),
            LockoutState::Locked { until }
        );
    }

    #[test]
    fn elapsed_lock_is_ignored() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        assert_eq!(
            policy.state(0, Some(now - Duration::seconds(1)), now),
            LockoutState::Open
        );
        assert_eq!(policy.state(0, Some(now), now), LockoutState::Open);
    }

    #[test]
    fn lock_until_is_strictly_in_the_future() {
        let policy = LockoutPolicy::default();
        let now = Utc::now();
        assert_eq!(policy.lock_until(now), now + Duration::minutes(15));
        assert!(policy.lock_until(now) > now);
    }

    #[test]
    fn custom_thresholds_apply() {
        let policy = LockoutPolicy::new(1, 2, Duration::seconds(30));
        assert!(policy.captcha_required(1));
        assert_eq!(policy.max_attempts(), 2);
        assert_eq!(policy.lock_duration(), Duration::seconds(30));

        let now = Utc::now();
        let gate = policy.gate(now, true);
        assert_eq!(gate.captcha_threshold, 1);
        assert_eq!(gate.max_attempts, 2);
        assert!(gate.captcha_verified);
        assert_eq!(gate.lock_until, now + Duration::seconds(30));
    }
}
