//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, integrations, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --dsn")?;

    let auth = auth::Options::parse(matches)?;
    let integrations = integrations::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        auth,
        integrations,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                ("TESTIKI_PORT", Some("3000")),
                ("TESTIKI_DSN", Some("postgres://quiz@localhost:5432/testiki")),
                ("TESTIKI_JWT_SECRET", Some("jwt")),
                ("TESTIKI_RECAPTCHA_SECRET", Some("captcha")),
                ("TESTIKI_CLOUDINARY_CLOUD_NAME", None),
                ("TESTIKI_CLOUDINARY_API_KEY", None),
                ("TESTIKI_CLOUDINARY_API_SECRET", None),
                ("TESTIKI_BREVO_API_KEY", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["testiki"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 3000);
                    assert_eq!(
                        args.dsn.expose_secret(),
                        "postgres://quiz@localhost:5432/testiki"
                    );
                    assert!(args.integrations.cloudinary.is_none());
                }
            },
        );
    }

    #[test]
    fn partial_cloudinary_fails_dispatch() {
        temp_env::with_vars(
            [
                ("TESTIKI_DSN", Some("postgres://quiz@localhost:5432/testiki")),
                ("TESTIKI_JWT_SECRET", Some("jwt")),
                ("TESTIKI_RECAPTCHA_SECRET", Some("captcha")),
                ("TESTIKI_CLOUDINARY_CLOUD_NAME", Some("demo")),
                ("TESTIKI_CLOUDINARY_API_KEY", None),
                ("TESTIKI_CLOUDINARY_API_SECRET", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["testiki"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err.to_string().contains("Cloudinary"));
                }
            },
        );
    }
}
