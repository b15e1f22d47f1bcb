use crate::{
    api::{
        self,
        email::{BrevoEmailSender, EmailSender, LogEmailSender},
        handlers::auth::{
            AuthConfig, AuthState, LockoutPolicy, RecaptchaVerifier, TokenBucketRateLimiter,
            TokenIssuer,
        },
        images::{AvatarStorage, CloudinaryImageHost, ImageHost},
    },
    cli::{
        commands::{auth, integrations},
        telemetry,
    },
    store::{DynStore, PgStore},
    APP_USER_AGENT,
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub auth: auth::Options,
    pub integrations: integrations::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, migrations fail, or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(args.dsn.expose_secret())
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    info!("Database migrations applied");

    let store: DynStore = Arc::new(PgStore::new(pool));

    let client = reqwest::Client::builder()
        .user_agent(APP_USER_AGENT)
        .timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    let auth_state = Arc::new(build_auth_state(&args, client.clone())?);
    let avatars = build_avatar_storage(args.integrations, client);

    let result = api::new(args.port, store, auth_state, avatars).await;
    telemetry::shutdown_tracer();
    result
}

fn build_auth_state(args: &Args, client: reqwest::Client) -> Result<AuthState> {
    let options = &args.auth;
    let tokens = TokenIssuer::new(
        &options.jwt_secret,
        chrono::Duration::seconds(options.token_ttl_seconds),
    )
    .context("Invalid JWT secret")?;

    let captcha = Arc::new(RecaptchaVerifier::new(
        client.clone(),
        args.integrations.recaptcha_secret.clone(),
        args.integrations.recaptcha_verify_url.clone(),
    ));
    let rate_limiter = Arc::new(TokenBucketRateLimiter::new(
        options.rate_limit.burst,
        options.rate_limit.per_minute,
    ));
    let email: Arc<dyn EmailSender> = match &args.integrations.brevo {
        Some(brevo) => {
            info!("Sending email through Brevo as {}", brevo.sender_email);
            Arc::new(BrevoEmailSender::new(
                client,
                brevo.api_key.clone(),
                brevo.sender_email.clone(),
                brevo.sender_name.clone(),
            ))
        }
        None => {
            info!("No Brevo API key configured, outgoing email is only logged");
            Arc::new(LogEmailSender)
        }
    };

    let config = AuthConfig::new(options.frontend_base_url.clone())
        .with_reset_token_ttl_seconds(options.reset_token_ttl_seconds)
        .with_verify_token_ttl_seconds(options.verify_token_ttl_seconds);
    let lockout = LockoutPolicy::new(
        options.lockout.captcha_threshold,
        options.lockout.max_attempts,
        chrono::Duration::seconds(options.lockout.lock_seconds),
    );

    Ok(AuthState::new(config, tokens, captcha, rate_limiter, email).with_lockout(lockout))
}

fn build_avatar_storage(options: integrations::Options, client: reqwest::Client) -> AvatarStorage {
    let host = options.cloudinary.map(|cloudinary| {
        info!("Avatar uploads go to Cloudinary cloud {}", cloudinary.cloud_name);
        Arc::new(CloudinaryImageHost::new(
            client,
            cloudinary.cloud_name,
            cloudinary.api_key,
            cloudinary.api_secret,
        )) as Arc<dyn ImageHost>
    });
    if host.is_none() {
        info!("No Cloudinary credentials configured, avatar upload is disabled");
    }
    AvatarStorage::new(host, options.default_avatar_url)
}
