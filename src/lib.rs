//! # Testiki (quiz platform backend)
//!
//! `testiki` serves the accounts, sessions and stored quiz results behind the
//! quiz frontend.
//!
//! ## Accounts
//!
//! Accounts register with a username, email and password. Passwords are stored
//! as Argon2id digests, and usernames and emails are unique (emails compared
//! case-insensitively). A verification email is sent on registration and login
//! is refused until the address is verified.
//!
//! ## Sessions
//!
//! Login issues an HS256 bearer token that is returned in the body and set as
//! an `HttpOnly` cookie. Protected endpoints accept either.
//!
//! ## Lockout
//!
//! Consecutive failed logins escalate from a plain retry to a required CAPTCHA
//! and finally a temporary lock. See [`api::handlers::auth`] for the thresholds.
//!
//! ## Quizzes
//!
//! Quiz definitions are read-only content addressed by slug; authenticated
//! accounts store one result row per submission.

pub mod api;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with("testiki/"));
        assert!(APP_USER_AGENT.ends_with(env!("CARGO_PKG_VERSION")));
    }
}
