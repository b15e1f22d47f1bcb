use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_VERIFY_TOKEN_TTL_SECONDS: &str = "verify-token-ttl-seconds";
pub const ARG_CAPTCHA_THRESHOLD: &str = "captcha-threshold";
pub const ARG_MAX_LOGIN_ATTEMPTS: &str = "max-login-attempts";
pub const ARG_LOCK_SECONDS: &str = "lock-seconds";
pub const ARG_RATE_LIMIT_BURST: &str = "rate-limit-burst";
pub const ARG_RATE_LIMIT_PER_MINUTE: &str = "rate-limit-per-minute";

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub reset_token_ttl_seconds: i64,
    pub verify_token_ttl_seconds: i64,
    pub lockout: LockoutOptions,
    pub rate_limit: RateLimitOptions,
}

#[derive(Debug, Clone, Copy)]
pub struct LockoutOptions {
    pub captcha_threshold: i32,
    pub max_attempts: i32,
    pub lock_seconds: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitOptions {
    pub burst: u32,
    pub per_minute: u32,
}

impl Options {
    /// Read the auth options from validated matches.
    ///
    /// # Errors
    /// Returns an error if a required option is missing or the lockout
    /// thresholds are inconsistent.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --jwt-secret")?;
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .context("missing required argument: --frontend-base-url")?;

        let lockout = LockoutOptions {
            captcha_threshold: get_copied(matches, ARG_CAPTCHA_THRESHOLD)?,
            max_attempts: get_copied(matches, ARG_MAX_LOGIN_ATTEMPTS)?,
            lock_seconds: get_copied(matches, ARG_LOCK_SECONDS)?,
        };
        if lockout.captcha_threshold >= lockout.max_attempts {
            anyhow::bail!(
                "--{ARG_CAPTCHA_THRESHOLD} ({}) must be lower than --{ARG_MAX_LOGIN_ATTEMPTS} ({})",
                lockout.captcha_threshold,
                lockout.max_attempts
            );
        }

        Ok(Self {
            jwt_secret,
            token_ttl_seconds: get_copied(matches, ARG_TOKEN_TTL_SECONDS)?,
            frontend_base_url,
            reset_token_ttl_seconds: get_copied(matches, ARG_RESET_TOKEN_TTL_SECONDS)?,
            verify_token_ttl_seconds: get_copied(matches, ARG_VERIFY_TOKEN_TTL_SECONDS)?,
            lockout,
            rate_limit: RateLimitOptions {
                burst: get_copied(matches, ARG_RATE_LIMIT_BURST)?,
                per_minute: get_copied(matches, ARG_RATE_LIMIT_PER_MINUTE)?,
            },
        })
    }
}

fn get_copied<T: Copy + Send + Sync + 'static>(matches: &ArgMatches, id: &str) -> Result<T> {
    matches
        .get_one::<T>(id)
        .copied()
        .with_context(|| format!("missing required argument: --{id}"))
}

pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_email_token_args(command);
    let command = with_lockout_args(command);
    with_rate_limit_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign bearer tokens")
                .env("TESTIKI_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Bearer token and session cookie TTL in seconds")
                .env("TESTIKI_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for CORS, cookies and email links")
                .env("TESTIKI_FRONTEND_BASE_URL")
                .default_value("http://localhost:5173"),
        )
}

fn with_email_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password reset token TTL in seconds")
                .env("TESTIKI_RESET_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
        .arg(
            Arg::new(ARG_VERIFY_TOKEN_TTL_SECONDS)
                .long(ARG_VERIFY_TOKEN_TTL_SECONDS)
                .help("Email verification token TTL in seconds")
                .env("TESTIKI_VERIFY_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(60..)),
        )
}

fn with_lockout_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CAPTCHA_THRESHOLD)
                .long(ARG_CAPTCHA_THRESHOLD)
                .help("Consecutive failed logins before a CAPTCHA is required")
                .env("TESTIKI_CAPTCHA_THRESHOLD")
                .default_value("3")
                .value_parser(clap::value_parser!(i32).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAX_LOGIN_ATTEMPTS)
                .long(ARG_MAX_LOGIN_ATTEMPTS)
                .help("Consecutive failed logins that lock the account")
                .env("TESTIKI_MAX_LOGIN_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32).range(2..)),
        )
        .arg(
            Arg::new(ARG_LOCK_SECONDS)
                .long(ARG_LOCK_SECONDS)
                .help("Lock duration in seconds")
                .env("TESTIKI_LOCK_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RATE_LIMIT_BURST)
                .long(ARG_RATE_LIMIT_BURST)
                .help("Requests per client address allowed in a burst on auth endpoints")
                .env("TESTIKI_RATE_LIMIT_BURST")
                .default_value("10")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_PER_MINUTE)
                .long(ARG_RATE_LIMIT_PER_MINUTE)
                .help("Sustained requests per minute per client address on auth endpoints")
                .env("TESTIKI_RATE_LIMIT_PER_MINUTE")
                .default_value("30")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}
