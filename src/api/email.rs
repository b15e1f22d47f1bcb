//! Email delivery abstractions.
//!
//! Handlers build an [`EmailMessage`] from one of the templates below and hand
//! it to an [`EmailSender`]. Delivery errors are logged by the caller and never
//! change the HTTP outcome, so an unreachable provider cannot be used to probe
//! which emails are registered.
//!
//! The default sender is [`LogEmailSender`], which logs and returns `Ok(())`.
//! [`BrevoEmailSender`] talks to the Brevo transactional email API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

pub const BREVO_SEND_URL: &str = "https://api.brevo.com/v3/smtp/email";

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Email delivery abstraction.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message.
    ///
    /// # Errors
    /// Any transport or provider failure.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the message instead of sending real email.
/// Bodies carry live token links, so they only appear at debug level.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "email send stub"
        );
        debug!(body = %message.text, "email send stub body");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoEmailAddress<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoSendEmailBody<'a> {
    sender: BrevoEmailAddress<'a>,
    to: Vec<BrevoEmailAddress<'a>>,
    subject: &'a str,
    html_content: &'a str,
    text_content: &'a str,
}

pub struct BrevoEmailSender {
    client: reqwest::Client,
    api_key: SecretString,
    sender_email: String,
    sender_name: Option<String>,
    endpoint: String,
}

impl BrevoEmailSender {
    #[must_use]
    pub fn new(
        client: reqwest::Client,
        api_key: SecretString,
        sender_email: String,
        sender_name: Option<String>,
    ) -> Self {
        Self {
            client,
            api_key,
            sender_email,
            sender_name,
            endpoint: BREVO_SEND_URL.to_string(),
        }
    }

    fn body<'a>(&'a self, message: &'a EmailMessage) -> BrevoSendEmailBody<'a> {
        BrevoSendEmailBody {
            sender: BrevoEmailAddress {
                email: &self.sender_email,
                name: self.sender_name.as_deref(),
            },
            to: vec![BrevoEmailAddress {
                email: &message.to_email,
                name: message.to_name.as_deref(),
            }],
            subject: &message.subject,
            html_content: &message.html,
            text_content: &message.text,
        }
    }
}

#[async_trait]
impl EmailSender for BrevoEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("api-key", self.api_key.expose_secret())
            .header("accept", "application/json")
            .json(&self.body(message))
            .send()
            .await
            .context("failed to reach Brevo")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(anyhow::anyhow!(
            "Brevo send failed (status={status}): {body}"
        ))
    }
}

/// Verification email with a link back to the frontend.
#[must_use]
pub fn verification_email(to_email: &str, username: &str, link: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        to_name: Some(username.to_string()),
        subject: "Confirm your email".to_string(),
        html: format!(
            "<p>Hi {username},</p>\
             <p>Confirm your email address to finish signing up:</p>\
             <p><a href=\"{link}\">Verify email</a></p>"
        ),
        text: format!("Hi {username},\n\nConfirm your email address: {link}\n"),
    }
}

fn describe_validity(valid_for: chrono::Duration) -> String {
    let minutes = valid_for.num_minutes().max(1);
    match (minutes / 60, minutes % 60) {
        (1, 0) => "1 hour".to_string(),
        (hours, 0) => format!("{hours} hours"),
        (0, 1) => "1 minute".to_string(),
        _ => format!("{minutes} minutes"),
    }
}

/// Password reset email stating how long the link stays valid.
#[must_use]
pub fn reset_email(
    to_email: &str,
    username: &str,
    link: &str,
    valid_for: chrono::Duration,
) -> EmailMessage {
    let validity = describe_validity(valid_for);
    EmailMessage {
        to_email: to_email.to_string(),
        to_name: Some(username.to_string()),
        subject: "Reset your password".to_string(),
        html: format!(
            "<p>Hi {username},</p>\
             <p>Use the link below to choose a new password. It expires in {validity}.</p>\
             <p><a href=\"{link}\">Reset password</a></p>\
             <p>If you did not ask for this, you can ignore this email.</p>"
        ),
        text: format!(
            "Hi {username},\n\nReset your password (valid for {validity}): {link}\n\n\
             If you did not ask for this, you can ignore this email.\n"
        ),
    }
}
