//! Shared fixtures for the router-level tests.
//!
//! The app runs against the in-memory store with fake CAPTCHA, email and
//! image-host collaborators, so no network or database is needed.

#![allow(dead_code)]

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        Method, Request, StatusCode,
    },
    Router,
};
use chrono::Duration;
use secrecy::SecretString;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use testiki::{
    api::{
        self,
        email::{EmailMessage, EmailSender},
        handlers::auth::{
            AuthConfig, AuthState, CaptchaVerifier, Hasher, NoopRateLimiter, RateLimiter,
            TokenIssuer,
        },
        images::{AvatarStorage, ImageHost, DEFAULT_AVATAR_URL},
    },
    store::{DynStore, MemoryStore},
};
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "router-test-secret";
pub const VALID_CAPTCHA: &str = "valid";
pub const PASSWORD: &str = "Str0ng!Pass";
pub const FRONTEND_URL: &str = "http://localhost:5173";

/// Accepts exactly one CAPTCHA response.
pub struct FakeCaptcha;

#[async_trait]
impl CaptchaVerifier for FakeCaptcha {
    async fn verify(&self, response: &str, _remote_ip: Option<&str>) -> Result<bool> {
        Ok(response == VALID_CAPTCHA)
    }
}

/// Keeps every message so tests can follow the links.
#[derive(Default)]
pub struct RecordingEmail {
    sent: Mutex<Vec<EmailMessage>>,
}

impl RecordingEmail {
    pub fn count_for(&self, to: &str) -> usize {
        self.sent
            .lock()
            .map(|sent| sent.iter().filter(|m| m.to_email == to).count())
            .unwrap_or(0)
    }

    /// Token from the newest message to `to` whose link contains `path`.
    pub fn last_token(&self, to: &str, path: &str) -> Result<String> {
        let sent = self
            .sent
            .lock()
            .map_err(|_| anyhow!("email log poisoned"))?;
        let message = sent
            .iter()
            .rev()
            .find(|m| m.to_email == to && m.text.contains(path))
            .with_context(|| format!("no {path} email for {to}"))?;
        let start = message
            .text
            .find("token=")
            .context("email without token link")?
            + "token=".len();
        Ok(message.text[start..]
            .chars()
            .take_while(char::is_ascii_hexdigit)
            .collect())
    }
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow!("email log poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

/// In-memory image host returning Cloudinary-shaped URLs.
#[derive(Default)]
pub struct FakeImageHost {
    pub deleted: Mutex<Vec<String>>,
    uploads: Mutex<u32>,
}

impl FakeImageHost {
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ImageHost for FakeImageHost {
    async fn upload_avatar(
        &self,
        account_id: Uuid,
        _bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String> {
        let mut uploads = self.uploads.lock().map_err(|_| anyhow!("poisoned"))?;
        *uploads += 1;
        Ok(format!(
            "https://res.cloudinary.com/demo/image/upload/v{}/user_avatars/user_{account_id}.png",
            *uploads
        ))
    }

    async fn delete(&self, public_id: &str) -> Result<()> {
        self.deleted
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .push(public_id.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub email: Arc<RecordingEmail>,
    pub images: Arc<FakeImageHost>,
}

pub struct TestAppBuilder {
    rate_limiter: Arc<dyn RateLimiter>,
    with_image_host: bool,
    config: AuthConfig,
}

impl TestAppBuilder {
    pub fn rate_limiter(mut self, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn auth_config(mut self, config: AuthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn without_image_host(mut self) -> Self {
        self.with_image_host = false;
        self
    }

    pub fn build(self) -> Result<TestApp> {
        let store = Arc::new(MemoryStore::new());
        let email = Arc::new(RecordingEmail::default());
        let images = Arc::new(FakeImageHost::default());

        let tokens = TokenIssuer::new(&SecretString::from(JWT_SECRET), Duration::hours(24))?;
        let auth_state = AuthState::new(
            self.config,
            tokens,
            Arc::new(FakeCaptcha),
            self.rate_limiter,
            email.clone(),
        )
        .with_hasher(Hasher::with_cost(1024, 1, 1)?);

        let host = self
            .with_image_host
            .then(|| images.clone() as Arc<dyn ImageHost>);
        let avatars = AvatarStorage::new(host, DEFAULT_AVATAR_URL.to_string());

        let dyn_store: DynStore = store.clone();
        let router = api::app(dyn_store, Arc::new(auth_state), avatars);
        Ok(TestApp {
            router,
            store,
            email,
            images,
        })
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            rate_limiter: Arc::new(NoopRateLimiter),
            with_image_host: true,
            config: AuthConfig::new(FRONTEND_URL.to_string()),
        }
    }

    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    pub async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok((status, body))
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::from(body.to_string()))?).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(Method::GET).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        self.send(builder.body(Body::empty())?).await
    }

    pub async fn register(&self, username: &str, email: &str) -> Result<(StatusCode, Value)> {
        self.json(
            Method::POST,
            "/register",
            None,
            serde_json::json!({
                "username": username,
                "email": email,
                "password": PASSWORD,
                "confirmPassword": PASSWORD,
            }),
        )
        .await
    }

    pub async fn verify(&self, email: &str) -> Result<()> {
        let token = self.email.last_token(email, "verify-email")?;
        let (status, body) = self
            .json(
                Method::POST,
                "/auth/verify-email",
                None,
                serde_json::json!({ "token": token }),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "verify failed: {body}");
        Ok(())
    }

    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        captcha: Option<&str>,
    ) -> Result<(StatusCode, Value)> {
        let mut body = serde_json::json!({ "identifier": identifier, "password": password });
        if let Some(captcha) = captcha {
            body["captcha_token"] = Value::from(captcha);
        }
        self.json(Method::POST, "/login", None, body).await
    }

    /// Register, verify and log in; returns the bearer token.
    pub async fn signed_in(&self, username: &str, email: &str) -> Result<String> {
        let (status, body) = self.register(username, email).await?;
        anyhow::ensure!(status == StatusCode::CREATED, "register failed: {body}");
        self.verify(email).await?;
        let (status, body) = self.login(username, PASSWORD, None).await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed: {body}");
        body["token"]
            .as_str()
            .map(str::to_string)
            .context("login response without token")
    }
}
