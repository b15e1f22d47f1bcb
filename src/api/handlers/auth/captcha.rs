//! CAPTCHA verification against Google reCAPTCHA `siteverify`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// `Ok(false)` means the provider rejected the response token.
    ///
    /// # Errors
    /// Transport or decoding failures talking to the provider.
    async fn verify(&self, response: &str, remote_ip: Option<&str>) -> Result<bool>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: SecretString,
    verify_url: String,
}

impl RecaptchaVerifier {
    #[must_use]
    pub fn new(client: reqwest::Client, secret: SecretString, verify_url: String) -> Self {
        Self {
            client,
            secret,
            verify_url,
        }
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn verify(&self, response: &str, remote_ip: Option<&str>) -> Result<bool> {
        let mut form = vec![
            ("secret", self.secret.expose_secret()),
            ("response", response),
        ];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }
        let body: SiteVerifyResponse = self
            .client
            .post(&self.verify_url)
            .form(&form)
            .send()
            .await
            .context("failed to reach captcha provider")?
            .error_for_status()
            .context("captcha provider returned an error status")?
            .json()
            .await
            .context("failed to decode captcha provider response")?;
        if !body.success {
            debug!("captcha rejected: {:?}", body.error_codes);
        }
        Ok(body.success)
    }
}
