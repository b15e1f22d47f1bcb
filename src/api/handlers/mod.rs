//! API handlers and shared input validation.

pub mod auth;
pub mod avatar;
pub mod error;
pub mod health;
pub mod me;
pub mod quizzes;

use regex::Regex;

pub use error::ApiError;

const MAX_EMAIL_LEN: usize = 254;
const MAX_EMAIL_LOCAL_LEN: usize = 64;
const MIN_PASSWORD_LEN: usize = 8;

/// Email format check on already-normalized input.
pub fn valid_email(email: &str) -> bool {
    if email.len() > MAX_EMAIL_LEN {
        return false;
    }
    let Some((local, _)) = email.split_once('@') else {
        return false;
    };
    if local.len() > MAX_EMAIL_LOCAL_LEN {
        return false;
    }
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .is_ok_and(|re| re.is_match(email))
}

/// At least 8 characters with an uppercase letter, a lowercase letter, a digit
/// and a punctuation or symbol character.
pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(char::is_uppercase)
        && password.chars().any(char::is_lowercase)
        && password.chars().any(|c| c.is_ascii_digit())
        && password
            .chars()
            .any(|c| c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace()))
}

/// 3 to 32 characters of letters, digits, `_`, `.` or `-`.
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_.-]{3,32}$").is_ok_and(|re| re.is_match(username))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_email_accepts_common_formats() {
        assert!(valid_email("a@b.com"));
        assert!(valid_email("name.surname+tag@example.co"));
    }

    #[test]
    fn valid_email_rejects_bad_shapes() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
        assert!(!valid_email("a@b.c"));
        assert!(!valid_email("a b@example.com"));
    }

    #[test]
    fn valid_email_enforces_lengths() {
        let long_local = format!("{}@example.com", "a".repeat(65));
        assert!(!valid_email(&long_local));
        let long_total = format!("a@{}.com", "b".repeat(250));
        assert!(!valid_email(&long_total));
        let max_local = format!("{}@example.com", "a".repeat(64));
        assert!(valid_email(&max_local));
    }

    #[test]
    fn valid_password_requires_all_classes() {
        assert!(valid_password("Str0ng!Pass"));
        assert!(!valid_password("Sh0rt!"));
        assert!(!valid_password("str0ng!pass"));
        assert!(!valid_password("STR0NG!PASS"));
        assert!(!valid_password("Strong!Pass"));
        assert!(!valid_password("Str0ngPass1"));
    }

    #[test]
    fn valid_username_bounds() {
        assert!(valid_username("alice"));
        assert!(valid_username("a.b-c_d"));
        assert!(!valid_username("al"));
        assert!(!valid_username(&"a".repeat(33)));
        assert!(!valid_username("alice smith"));
    }
}
