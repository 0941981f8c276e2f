use crate::sesame::{
    self,
    config::{AuthConfig, ForgotPasswordPolicy},
    email::MailConfig,
    security::{CredentialHasher, TokenIssuer},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::debug;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub frontend_base_url: String,
    pub jwt_secret_key: SecretString,
    pub jwt_algorithm: String,
    pub jwt_subject: String,
    pub jwt_access_minutes: i64,
    pub password_hash_algorithm: String,
    pub salt_hash_algorithm: String,
    pub hash_salt: SecretString,
    pub hash_cost: u32,
    pub validation_key_minutes: i64,
    pub forgot_password_policy: String,
    pub cache_ttl_seconds: u64,
    pub mail_from: String,
    pub mail_webhook_url: Option<Url>,
}

/// Settings the account service is built from.
#[derive(Debug)]
pub struct Components {
    pub auth_config: AuthConfig,
    pub hasher: CredentialHasher,
    pub tokens: TokenIssuer,
    pub mail_config: MailConfig,
}

impl Args {
    /// # Errors
    /// Returns an error if any setting is rejected by the component it configures.
    pub fn components(self) -> Result<Components> {
        let policy: ForgotPasswordPolicy = self
            .forgot_password_policy
            .parse()
            .context("invalid forgot password policy")?;

        let auth_config = AuthConfig::new(self.frontend_base_url)
            .with_validation_key_minutes(self.validation_key_minutes)
            .with_forgot_password_policy(policy)
            .with_cache_ttl_seconds(self.cache_ttl_seconds)
            .validate()
            .context("invalid account settings")?;

        let hasher = CredentialHasher::from_names(
            &self.password_hash_algorithm,
            &self.salt_hash_algorithm,
            self.hash_salt,
            self.hash_cost,
        )
        .context("invalid password hashing settings")?;

        let tokens = TokenIssuer::new(
            &self.jwt_secret_key,
            &self.jwt_algorithm,
            self.jwt_subject,
            self.jwt_access_minutes,
        )
        .context("invalid access token settings")?;

        let mail_config = MailConfig::new(self.mail_from).with_webhook_url(self.mail_webhook_url);

        Ok(Components {
            auth_config,
            hasher,
            tokens,
            mail_config,
        })
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the settings are invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let port = args.port;
    let dsn = args.dsn.clone();

    let components = args.components()?;

    debug!("Server components: {:?}", components);

    sesame::new(
        port,
        dsn,
        components.auth_config,
        components.hasher,
        components.tokens,
        components.mail_config,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sesame::security::HashAlgorithm;

    fn args() -> Args {
        Args {
            port: 8080,
            dsn: "postgres://sesame@localhost/sesame".to_string(),
            frontend_base_url: "https://app.example.com".to_string(),
            jwt_secret_key: SecretString::from("jwt-secret".to_string()),
            jwt_algorithm: "HS384".to_string(),
            jwt_subject: "access".to_string(),
            jwt_access_minutes: 15,
            password_hash_algorithm: "argon2".to_string(),
            salt_hash_algorithm: "bcrypt".to_string(),
            hash_salt: SecretString::from("seed".to_string()),
            hash_cost: 4,
            validation_key_minutes: 30,
            forgot_password_policy: "reveal".to_string(),
            cache_ttl_seconds: 10,
            mail_from: "no-reply@example.com".to_string(),
            mail_webhook_url: None,
        }
    }

    #[test]
    fn builds_components() -> Result<()> {
        let components = args().components()?;
        assert_eq!(
            components.auth_config.validation_window(),
            chrono::Duration::minutes(30)
        );
        assert_eq!(
            components.auth_config.forgot_password_policy(),
            ForgotPasswordPolicy::Reveal
        );
        assert_eq!(components.hasher.password_algorithm(), HashAlgorithm::Argon2);
        assert_eq!(components.tokens.lifetime(), chrono::Duration::minutes(15));
        assert_eq!(components.mail_config.from(), "no-reply@example.com");
        Ok(())
    }

    #[test]
    fn rejects_bad_settings() {
        let mut bad = args();
        bad.jwt_algorithm = "RS256".to_string();
        assert!(bad.components().is_err());

        let mut bad = args();
        bad.validation_key_minutes = 0;
        assert!(bad.components().is_err());

        let mut bad = args();
        bad.password_hash_algorithm = "md5".to_string();
        assert!(bad.components().is_err());
    }

    #[test]
    fn debug_hides_secrets() {
        let rendered = format!("{:?}", args());
        assert!(!rendered.contains("jwt-secret"));
        assert!(!rendered.contains("\"seed\""));
    }
}
