//! Bearer access tokens (HMAC-signed JWT).

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::sesame::store::Account;

/// Longest accepted access token lifetime (one year).
pub const MAX_ACCESS_MINUTES: i64 = 525_600;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("cannot issue a token without an account")]
    MissingAccount,
    #[error("unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("token secret must not be empty")]
    EmptySecret,
    #[error("token lifetime must be between 1 minute and one year")]
    InvalidLifetime,
    #[error("unable to encode token")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error("unable to decode token")]
    Decode(#[source] jsonwebtoken::errors::Error),
    #[error("invalid claims in token")]
    InvalidClaims(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub exp: i64,
    pub sub: String,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    subject: String,
    lifetime: Duration,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &self.algorithm)
            .field("subject", &self.subject)
            .field("lifetime", &self.lifetime)
            .field("secret", &"***")
            .finish()
    }
}

impl TokenIssuer {
    /// Build an issuer for a symmetric (HS256/HS384/HS512) algorithm.
    ///
    /// # Errors
    /// Returns an error if the algorithm is not HMAC-based, the secret is empty,
    /// or the lifetime is outside `1..=MAX_ACCESS_MINUTES`.
    pub fn new(
        secret: &SecretString,
        algorithm: &str,
        subject: impl Into<String>,
        access_minutes: i64,
    ) -> Result<Self, TokenError> {
        let algorithm: Algorithm = algorithm
            .trim()
            .to_uppercase()
            .parse()
            .map_err(|_| TokenError::UnsupportedAlgorithm(algorithm.to_string()))?;

        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(TokenError::UnsupportedAlgorithm(format!("{algorithm:?}")));
        }

        let secret = secret.expose_secret();
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        if !(1..=MAX_ACCESS_MINUTES).contains(&access_minutes) {
            return Err(TokenError::InvalidLifetime);
        }
        let lifetime = Duration::try_minutes(access_minutes).ok_or(TokenError::InvalidLifetime)?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            subject: subject.into(),
            lifetime,
        })
    }

    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Mint an access token for `account`, expiring `lifetime` from now.
    ///
    /// # Errors
    /// Returns an error if the account is empty or encoding fails.
    pub fn issue(&self, account: &Account) -> Result<String, TokenError> {
        self.issue_at(account, Utc::now())
    }

    /// Mint an access token as if issued at `now`.
    ///
    /// # Errors
    /// Returns an error if the account is empty or encoding fails.
    pub fn issue_at(&self, account: &Account, now: DateTime<Utc>) -> Result<String, TokenError> {
        if account.username.is_empty() || account.email.is_empty() {
            return Err(TokenError::MissingAccount);
        }

        let expires_at = now
            .checked_add_signed(self.lifetime)
            .ok_or(TokenError::InvalidLifetime)?;

        let claims = AccessClaims {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            phone_number: account.phone_number.clone(),
            exp: expires_at.timestamp(),
            sub: self.subject.clone(),
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key).map_err(TokenError::Encode)
    }

    /// Check signature, subject and expiry and return the claims.
    ///
    /// # Errors
    /// Returns `Decode` when the token fails signature/expiry validation and
    /// `InvalidClaims` when its payload does not have the expected shape.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.sub = Some(self.subject.clone());

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::Json(_) | ErrorKind::MissingRequiredClaim(_) => {
                    TokenError::InvalidClaims(err)
                }
                _ => TokenError::Decode(err),
            })
    }
}
