use std::{fmt, str::FromStr, time::Duration};
use thiserror::Error;

const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_VALIDATION_KEY_MINUTES: i64 = 5;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 30;

/// Longest accepted validation key window (one year).
pub const MAX_VALIDATION_KEY_MINUTES: i64 = 525_600;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown forgot password policy: {0} (expected conceal or reveal)")]
    ForgotPasswordPolicy(String),
    #[error("validation key window must be between 1 minute and one year")]
    ValidationWindow,
}

/// What forgot-password answers for an email with no account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ForgotPasswordPolicy {
    /// Same outcome as for a real account, no mail sent.
    #[default]
    Conceal,
    /// Report the account as missing.
    Reveal,
}

impl FromStr for ForgotPasswordPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conceal" => Ok(Self::Conceal),
            "reveal" => Ok(Self::Reveal),
            _ => Err(ConfigError::ForgotPasswordPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for ForgotPasswordPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conceal => f.write_str("conceal"),
            Self::Reveal => f.write_str("reveal"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    validation_key_minutes: i64,
    forgot_password_policy: ForgotPasswordPolicy,
    cache_ttl_seconds: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            validation_key_minutes: DEFAULT_VALIDATION_KEY_MINUTES,
            forgot_password_policy: ForgotPasswordPolicy::default(),
            cache_ttl_seconds: DEFAULT_CACHE_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_validation_key_minutes(mut self, minutes: i64) -> Self {
        self.validation_key_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_forgot_password_policy(mut self, policy: ForgotPasswordPolicy) -> Self {
        self.forgot_password_policy = policy;
        self
    }

    #[must_use]
    pub fn with_cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.cache_ttl_seconds = seconds;
        self
    }

    /// # Errors
    /// Returns an error if the validation key window is outside
    /// `1..=MAX_VALIDATION_KEY_MINUTES`.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !(1..=MAX_VALIDATION_KEY_MINUTES).contains(&self.validation_key_minutes) {
            return Err(ConfigError::ValidationWindow);
        }
        Ok(self)
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    /// Key window, clamped into the range `validate` accepts.
    #[must_use]
    pub fn validation_window(&self) -> chrono::Duration {
        let minutes = self
            .validation_key_minutes
            .clamp(1, MAX_VALIDATION_KEY_MINUTES);
        chrono::TimeDelta::try_minutes(minutes).unwrap_or(chrono::TimeDelta::MAX)
    }

    #[must_use]
    pub fn forgot_password_policy(&self) -> ForgotPasswordPolicy {
        self.forgot_password_policy
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_FRONTEND_BASE_URL.to_string())
    }
}
