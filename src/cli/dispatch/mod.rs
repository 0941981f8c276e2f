//! Map parsed command-line arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, mail};
use anyhow::{Context, Result};
use secrecy::ExposeSecret;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches)?;

    if auth_opts.jwt.secret_key.expose_secret().is_empty() {
        anyhow::bail!("--jwt-secret-key must not be empty");
    }

    Ok(Action::Server(Args {
        port,
        dsn,
        frontend_base_url: auth_opts.frontend_base_url,
        jwt_secret_key: auth_opts.jwt.secret_key,
        jwt_algorithm: auth_opts.jwt.algorithm,
        jwt_subject: auth_opts.jwt.subject,
        jwt_access_minutes: auth_opts.jwt.access_minutes,
        password_hash_algorithm: auth_opts.hash.password_algorithm,
        salt_hash_algorithm: auth_opts.hash.salt_algorithm,
        hash_salt: auth_opts.hash.salt,
        hash_cost: auth_opts.hash.cost,
        validation_key_minutes: auth_opts.validation_key_minutes,
        forgot_password_policy: auth_opts.forgot_password_policy,
        cache_ttl_seconds: auth_opts.cache_ttl_seconds,
        mail_from: mail_opts.from,
        mail_webhook_url: mail_opts.webhook_url,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV: [(&str, Option<&str>); 6] = [
        ("SESAME_DSN", Some("postgres://sesame@localhost:5432/sesame")),
        ("SESAME_JWT_SECRET_KEY", Some("jwt-secret")),
        ("SESAME_HASH_SALT", Some("seed")),
        ("SESAME_FRONTEND_BASE_URL", Some("https://app.example.com")),
        ("SESAME_MAIL_WEBHOOK_URL", None),
        ("SESAME_PORT", None),
    ];

    #[test]
    fn builds_server_action_from_env() {
        temp_env::with_vars(ENV, || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["sesame"]);
            let result = handler(&matches);
            assert!(result.is_ok());
            if let Ok(Action::Server(args)) = result {
                assert_eq!(args.port, 8080);
                assert_eq!(args.dsn, "postgres://sesame@localhost:5432/sesame");
                assert_eq!(args.frontend_base_url, "https://app.example.com");
                assert_eq!(args.jwt_secret_key.expose_secret(), "jwt-secret");
                assert!(args.mail_webhook_url.is_none());
            }
        });
    }

    #[test]
    fn rejects_invalid_webhook_url() {
        temp_env::with_vars(ENV, || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "sesame",
                "--mail-webhook-url",
                "not a url",
            ]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(err.to_string().contains("invalid --mail-webhook-url"));
            }
        });
    }

    #[test]
    fn rejects_empty_jwt_secret() {
        temp_env::with_vars(ENV, || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "sesame",
                "--jwt-secret-key",
                "",
            ]);
            assert!(handler(&matches).is_err());
        });
    }
}
