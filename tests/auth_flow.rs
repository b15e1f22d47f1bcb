//! Registration, verification, login lockout and password reset driven
//! through the full router.

mod common;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{
        header::{COOKIE, SET_COOKIE},
        Method, Request, StatusCode,
    },
};
use chrono::{Duration, Utc};
use common::{TestApp, FRONTEND_URL, PASSWORD, VALID_CAPTCHA};
use serde_json::json;
use std::sync::Arc;
use testiki::{
    api::handlers::auth::{AuthConfig, TokenBucketRateLimiter},
    store::{AccountStore, AttemptGate},
};
use tower::ServiceExt;

#[tokio::test]
async fn register_verify_login_and_fetch_profile() -> Result<()> {
    let app = TestApp::new()?;

    let (status, body) = app.register("alice", "A@B.com").await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email_sent"], true);
    assert_eq!(app.email.count_for("a@b.com"), 1);

    let (status, body) = app.login("alice", PASSWORD, None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "EMAIL_NOT_VERIFIED");

    app.verify("a@b.com").await?;

    let (status, body) = app.login("a@b.com", PASSWORD, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["username"], "alice");
    assert_eq!(body["user"]["is_verified"], true);
    assert!(body["user"].get("password_hash").is_none());
    let token = body["token"].as_str().context("token")?;

    let (status, body) = app.get("/me", Some(token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["email"], "a@b.com");
    Ok(())
}

#[tokio::test]
async fn login_sets_session_cookie_accepted_by_protected_routes() -> Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "a@b.com").await?;
    app.verify("a@b.com").await?;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/login")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"username": "alice", "password": PASSWORD}).to_string(),
        ))?;
    let response = app.router.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .context("session cookie")?
        .to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));

    let pair = cookie.split(';').next().context("cookie pair")?;
    let request = Request::builder()
        .uri("/me")
        .header(COOKIE, pair)
        .body(Body::empty())?;
    let (status, body) = app.send(request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "alice");

    let request = Request::builder()
        .method(Method::POST)
        .uri("/logout")
        .body(Body::empty())?;
    let response = app.router.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .context("cleared cookie")?;
    assert!(cleared.contains("Max-Age=0"));
    Ok(())
}

#[tokio::test]
async fn duplicate_username_or_email_conflicts() -> Result<()> {
    let app = TestApp::new()?;
    assert_eq!(app.register("alice", "a@b.com").await?.0, StatusCode::CREATED);

    let (status, body) = app.register("alice", "other@b.com").await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, _) = app.register("bob", "A@b.COM").await?;
    assert_eq!(status, StatusCode::CONFLICT);
    Ok(())
}

#[tokio::test]
async fn register_validation_errors() -> Result<()> {
    let app = TestApp::new()?;

    let (status, body) = app
        .json(
            Method::POST,
            "/register",
            None,
            json!({"username": "alice", "email": "a@b.com", "password": "weak", "confirmPassword": "weak"}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, _) = app
        .json(
            Method::POST,
            "/register",
            None,
            json!({"username": "alice", "email": "a@b.com", "password": PASSWORD, "confirmPassword": "Other!Pass1"}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/register")
        .body(Body::empty())?;
    let (status, body) = app.send(request).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Missing payload");
    Ok(())
}

#[tokio::test]
async fn three_failures_require_captcha_then_valid_captcha_logs_in() -> Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "a@b.com").await?;
    app.verify("a@b.com").await?;

    for attempt in 1..=3 {
        let (status, body) = app.login("alice", "wrong", None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_CREDENTIALS");
        assert_eq!(body["captcha_required"], attempt == 3);
    }

    let (status, body) = app.login("alice", PASSWORD, None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "CAPTCHA_REQUIRED");

    let (status, body) = app.login("alice", PASSWORD, Some("bogus")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CAPTCHA");

    let (status, body) = app.login("alice", PASSWORD, Some(VALID_CAPTCHA)).await?;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some());

    let (status, _) = app.login("alice", PASSWORD, None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn locked_account_rejects_correct_password() -> Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "a@b.com").await?;
    app.verify("a@b.com").await?;
    let account = app
        .store
        .find_by_identifier("alice")
        .await?
        .context("account")?;

    let now = Utc::now();
    let gate = AttemptGate {
        captcha_threshold: 5,
        captcha_verified: false,
        max_attempts: 5,
        now,
        lock_until: now + Duration::minutes(15),
    };
    let lock_until = gate.lock_until;
    for _ in 0..5 {
        app.store.admit_login_attempt(account.id, gate).await?;
    }

    let (status, body) = app.login("alice", PASSWORD, Some(VALID_CAPTCHA)).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "ACCOUNT_LOCKED");

    let stored = app.store.account(account.id).await.context("account")?;
    assert_eq!(stored.login_attempts, 0);
    assert_eq!(stored.lock_until, Some(lock_until));
    Ok(())
}

#[tokio::test]
async fn unknown_identifier_is_plain_invalid_credentials() -> Result<()> {
    let app = TestApp::new()?;
    let (status, body) = app.login("nobody", PASSWORD, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
    assert_eq!(body["captcha_required"], false);
    Ok(())
}

#[tokio::test]
async fn forgot_password_is_identical_for_unknown_email() -> Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "a@b.com").await?;

    let known = app
        .json(Method::POST, "/auth/forgot-password", None, json!({"email": "a@b.com"}))
        .await?;
    let unknown = app
        .json(Method::POST, "/auth/forgot-password", None, json!({"email": "ghost@b.com"}))
        .await?;
    assert_eq!(known, unknown);
    assert_eq!(known.0, StatusCode::OK);
    assert_eq!(app.email.count_for("ghost@b.com"), 0);
    Ok(())
}

#[tokio::test]
async fn reset_token_is_single_use_and_clears_lockout() -> Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "a@b.com").await?;
    app.verify("a@b.com").await?;
    for _ in 0..3 {
        app.login("alice", "wrong", None).await?;
    }

    app.json(Method::POST, "/auth/forgot-password", None, json!({"email": "a@b.com"}))
        .await?;
    let token = app.email.last_token("a@b.com", "reset-password")?;
    let new_password = "N3w!Password";
    let body = json!({"token": token, "password": new_password, "confirmPassword": new_password});

    let (status, _) = app
        .json(Method::POST, "/auth/reset-password", None, body.clone())
        .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, reply) = app
        .json(Method::POST, "/auth/reset-password", None, body)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["code"], "INVALID_TOKEN");

    let (status, _) = app.login("alice", PASSWORD, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("alice", new_password, None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn verification_token_cannot_be_replayed() -> Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "a@b.com").await?;
    let token = app.email.last_token("a@b.com", "verify-email")?;

    let body = json!({"token": token});
    let (status, _) = app
        .json(Method::POST, "/auth/verify-email", None, body.clone())
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, reply) = app
        .json(Method::POST, "/auth/verify-email", None, body)
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(reply["code"], "INVALID_TOKEN");
    Ok(())
}

#[tokio::test]
async fn resend_verification_supersedes_previous_token() -> Result<()> {
    let app = TestApp::new()?;
    app.register("alice", "a@b.com").await?;
    let first = app.email.last_token("a@b.com", "verify-email")?;

    let (status, _) = app
        .json(
            Method::POST,
            "/auth/resend-verification",
            None,
            json!({"email": "a@b.com"}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    let second = app.email.last_token("a@b.com", "verify-email")?;
    assert_ne!(first, second);

    let (status, _) = app
        .json(Method::POST, "/auth/verify-email", None, json!({"token": first}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    app.verify("a@b.com").await?;

    let (status, _) = app
        .json(
            Method::POST,
            "/auth/resend-verification",
            None,
            json!({"email": "a@b.com"}),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.email.count_for("a@b.com"), 2);
    Ok(())
}

#[tokio::test]
async fn edge_rate_limit_answers_429() -> Result<()> {
    let app = TestApp::builder()
        .rate_limiter(Arc::new(TokenBucketRateLimiter::new(2, 1)))
        .build()?;

    for _ in 0..2 {
        let (status, _) = app.login("nobody", "wrong", None).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    let (status, body) = app.login("nobody", "wrong", None).await?;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "RATE_LIMITED");

    let (status, _) = app
        .json(Method::POST, "/auth/forgot-password", None, json!({"email": "a@b.com"}))
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn bad_bearer_tokens_are_unauthorized() -> Result<()> {
    let app = TestApp::new()?;
    let token = app.signed_in("alice", "a@b.com").await?;

    let (status, body) = app.get("/me", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let mut chars: Vec<char> = token.chars().collect();
    let index = chars.len() - 10;
    chars[index] = if chars[index] == 'A' { 'B' } else { 'A' };
    let tampered: String = chars.into_iter().collect();
    let (status, _) = app.get("/me", Some(&tampered)).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get("/me", Some("not-a-jwt")).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn expired_verification_link_fails_distinctly() -> Result<()> {
    let app = TestApp::builder()
        .auth_config(AuthConfig::new(FRONTEND_URL.to_string()).with_verify_token_ttl_seconds(-1))
        .build()?;
    app.register("alice", "a@b.com").await?;
    let token = app.email.last_token("a@b.com", "verify-email")?;

    let (status, body) = app
        .json(Method::POST, "/auth/verify-email", None, json!({"token": token}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TOKEN_EXPIRED");

    let (status, body) = app
        .json(Method::POST, "/auth/verify-email", None, json!({"token": "0".repeat(64)}))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TOKEN");

    let account = app.store.find_by_email("a@b.com").await?.context("account")?;
    assert!(!account.is_verified);
    Ok(())
}

#[tokio::test]
async fn expired_reset_link_fails_distinctly() -> Result<()> {
    let app = TestApp::builder()
        .auth_config(AuthConfig::new(FRONTEND_URL.to_string()).with_reset_token_ttl_seconds(-1))
        .build()?;
    app.register("alice", "a@b.com").await?;
    app.verify("a@b.com").await?;
    app.json(Method::POST, "/auth/forgot-password", None, json!({"email": "a@b.com"}))
        .await?;
    let token = app.email.last_token("a@b.com", "reset-password")?;
    let new_password = "N3w!Password";

    let (status, body) = app
        .json(
            Method::POST,
            "/auth/reset-password",
            None,
            json!({"token": token, "password": new_password, "confirmPassword": new_password}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "TOKEN_EXPIRED");

    let (status, body) = app
        .json(
            Method::POST,
            "/auth/reset-password",
            None,
            json!({"token": "f".repeat(64), "password": new_password, "confirmPassword": new_password}),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_TOKEN");

    let (status, _) = app.login("alice", PASSWORD, None).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}
