//! Third-party services: reCAPTCHA, Cloudinary and Brevo.

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::{handlers::auth::captcha::DEFAULT_RECAPTCHA_VERIFY_URL, images::DEFAULT_AVATAR_URL};

pub const ARG_RECAPTCHA_SECRET: &str = "recaptcha-secret";
pub const ARG_RECAPTCHA_VERIFY_URL: &str = "recaptcha-verify-url";
pub const ARG_CLOUDINARY_CLOUD_NAME: &str = "cloudinary-cloud-name";
pub const ARG_CLOUDINARY_API_KEY: &str = "cloudinary-api-key";
pub const ARG_CLOUDINARY_API_SECRET: &str = "cloudinary-api-secret";
pub const ARG_DEFAULT_AVATAR_URL: &str = "default-avatar-url";
pub const ARG_BREVO_API_KEY: &str = "brevo-api-key";
pub const ARG_EMAIL_SENDER: &str = "email-sender";
pub const ARG_EMAIL_SENDER_NAME: &str = "email-sender-name";

#[derive(Debug)]
pub struct Options {
    pub recaptcha_secret: SecretString,
    pub recaptcha_verify_url: String,
    pub cloudinary: Option<CloudinaryOptions>,
    pub default_avatar_url: String,
    pub brevo: Option<BrevoOptions>,
}

#[derive(Debug)]
pub struct CloudinaryOptions {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: SecretString,
}

#[derive(Debug)]
pub struct BrevoOptions {
    pub api_key: SecretString,
    pub sender_email: String,
    pub sender_name: Option<String>,
}

impl Options {
    /// Read integration options from validated matches.
    ///
    /// # Errors
    /// Returns an error if the reCAPTCHA secret is missing, Cloudinary is
    /// only partially configured, or Brevo has no sender address.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let recaptcha_secret = matches
            .get_one::<String>(ARG_RECAPTCHA_SECRET)
            .cloned()
            .map(SecretString::from)
            .context("missing required argument: --recaptcha-secret")?;
        let recaptcha_verify_url = matches
            .get_one::<String>(ARG_RECAPTCHA_VERIFY_URL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_RECAPTCHA_VERIFY_URL.to_string());
        let default_avatar_url = matches
            .get_one::<String>(ARG_DEFAULT_AVATAR_URL)
            .cloned()
            .unwrap_or_else(|| DEFAULT_AVATAR_URL.to_string());

        let cloudinary = match (
            matches.get_one::<String>(ARG_CLOUDINARY_CLOUD_NAME),
            matches.get_one::<String>(ARG_CLOUDINARY_API_KEY),
            matches.get_one::<String>(ARG_CLOUDINARY_API_SECRET),
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryOptions {
                cloud_name: cloud_name.clone(),
                api_key: api_key.clone(),
                api_secret: SecretString::from(api_secret.clone()),
            }),
            (None, None, None) => None,
            _ => bail!(
                "Cloudinary needs --{ARG_CLOUDINARY_CLOUD_NAME}, --{ARG_CLOUDINARY_API_KEY} and --{ARG_CLOUDINARY_API_SECRET} together"
            ),
        };

        let brevo = match matches.get_one::<String>(ARG_BREVO_API_KEY) {
            Some(api_key) => Some(BrevoOptions {
                api_key: SecretString::from(api_key.clone()),
                sender_email: matches
                    .get_one::<String>(ARG_EMAIL_SENDER)
                    .cloned()
                    .context("missing required argument: --email-sender (required with --brevo-api-key)")?,
                sender_name: matches.get_one::<String>(ARG_EMAIL_SENDER_NAME).cloned(),
            }),
            None => None,
        };

        Ok(Self {
            recaptcha_secret,
            recaptcha_verify_url,
            cloudinary,
            default_avatar_url,
            brevo,
        })
    }
}

pub fn with_args(command: Command) -> Command {
    let command = with_recaptcha_args(command);
    let command = with_cloudinary_args(command);
    with_brevo_args(command)
}

fn with_recaptcha_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_RECAPTCHA_SECRET)
                .long(ARG_RECAPTCHA_SECRET)
                .help("reCAPTCHA secret key used to verify login challenges")
                .env("TESTIKI_RECAPTCHA_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_RECAPTCHA_VERIFY_URL)
                .long(ARG_RECAPTCHA_VERIFY_URL)
                .help("reCAPTCHA siteverify endpoint")
                .env("TESTIKI_RECAPTCHA_VERIFY_URL")
                .default_value(DEFAULT_RECAPTCHA_VERIFY_URL),
        )
}

fn with_cloudinary_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLOUDINARY_CLOUD_NAME)
                .long(ARG_CLOUDINARY_CLOUD_NAME)
                .help("Cloudinary cloud name (avatar upload is disabled without it)")
                .env("TESTIKI_CLOUDINARY_CLOUD_NAME"),
        )
        .arg(
            Arg::new(ARG_CLOUDINARY_API_KEY)
                .long(ARG_CLOUDINARY_API_KEY)
                .help("Cloudinary API key")
                .env("TESTIKI_CLOUDINARY_API_KEY"),
        )
        .arg(
            Arg::new(ARG_CLOUDINARY_API_SECRET)
                .long(ARG_CLOUDINARY_API_SECRET)
                .help("Cloudinary API secret")
                .env("TESTIKI_CLOUDINARY_API_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_DEFAULT_AVATAR_URL)
                .long(ARG_DEFAULT_AVATAR_URL)
                .help("Avatar URL assigned to new accounts and after removal")
                .env("TESTIKI_DEFAULT_AVATAR_URL")
                .default_value(DEFAULT_AVATAR_URL),
        )
}

fn with_brevo_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_BREVO_API_KEY)
                .long(ARG_BREVO_API_KEY)
                .help("Brevo API key (emails are only logged without it)")
                .env("TESTIKI_BREVO_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL_SENDER)
                .long(ARG_EMAIL_SENDER)
                .help("Sender address for outgoing email")
                .env("TESTIKI_EMAIL_SENDER"),
        )
        .arg(
            Arg::new(ARG_EMAIL_SENDER_NAME)
                .long(ARG_EMAIL_SENDER_NAME)
                .help("Sender display name for outgoing email")
                .env("TESTIKI_EMAIL_SENDER_NAME")
                .default_value("Testiki"),
        )
}
