//! Salted password hashing.
//!
//! Each account gets its own salt: fresh OS randomness mixed with the deployment
//! seed and passed once through the salt algorithm. The stored password hash is
//! computed over `salt + password` with the password algorithm.

use argon2::{
    password_hash::{
        rand_core::OsRng as PhcOsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
    },
    Argon2,
};
use base64ct::{Base64, Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Upper bound of the stored hash/salt columns.
pub const MAX_HASH_LEN: usize = 1024;

/// Cost range accepted by bcrypt.
pub const BCRYPT_MIN_COST: u32 = 4;
pub const BCRYPT_MAX_COST: u32 = 31;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("invalid bcrypt cost: {0}")]
    InvalidCost(u32),
    #[error("failed to gather randomness")]
    Random(#[from] rand::Error),
    #[error("bcrypt error: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
    #[error("argon2 error: {0}")]
    Argon2(String),
    #[error("hash exceeds the maximum stored length")]
    TooLong,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Bcrypt,
    Argon2,
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bcrypt" => Ok(Self::Bcrypt),
            "argon2" | "argon2id" => Ok(Self::Argon2),
            other => Err(HashError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bcrypt => write!(f, "bcrypt"),
            Self::Argon2 => write!(f, "argon2"),
        }
    }
}

/// Salt and hash always travel together.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub salt: String,
    pub hash: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("salt", &"***")
            .field("hash", &"***")
            .finish()
    }
}

#[derive(Clone)]
pub struct CredentialHasher {
    password_algorithm: HashAlgorithm,
    salt_algorithm: HashAlgorithm,
    seed: SecretString,
    cost: u32,
}

impl fmt::Debug for CredentialHasher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialHasher")
            .field("password_algorithm", &self.password_algorithm)
            .field("salt_algorithm", &self.salt_algorithm)
            .field("seed", &"***")
            .field("cost", &self.cost)
            .finish()
    }
}

impl CredentialHasher {
    /// Build a hasher; `cost` only applies to bcrypt.
    ///
    /// # Errors
    /// Returns an error if the bcrypt cost is outside the supported range.
    pub fn new(
        password_algorithm: HashAlgorithm,
        salt_algorithm: HashAlgorithm,
        seed: SecretString,
        cost: u32,
    ) -> Result<Self, HashError> {
        let uses_bcrypt = password_algorithm == HashAlgorithm::Bcrypt
            || salt_algorithm == HashAlgorithm::Bcrypt;
        if uses_bcrypt && !(BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&cost) {
            return Err(HashError::InvalidCost(cost));
        }

        Ok(Self {
            password_algorithm,
            salt_algorithm,
            seed,
            cost,
        })
    }

    /// Parse algorithm names as they appear in configuration.
    ///
    /// # Errors
    /// Returns an error for unknown algorithm names or an invalid cost.
    pub fn from_names(
        password_algorithm: &str,
        salt_algorithm: &str,
        seed: SecretString,
        cost: u32,
    ) -> Result<Self, HashError> {
        Self::new(
            password_algorithm.parse()?,
            salt_algorithm.parse()?,
            seed,
            cost,
        )
    }

    #[must_use]
    pub fn password_algorithm(&self) -> HashAlgorithm {
        self.password_algorithm
    }

    /// Produce a new per-account salt.
    ///
    /// # Errors
    /// Returns an error if the OS RNG fails or hashing fails.
    pub fn generate_salt(&self) -> Result<String, HashError> {
        let mut nonce = [0u8; 32];
        OsRng.try_fill_bytes(&mut nonce)?;

        let input = hash_input(
            self.salt_algorithm,
            &Base64UrlUnpadded::encode_string(&nonce),
            self.seed.expose_secret(),
        );

        self.hash_with(self.salt_algorithm, input.as_bytes())
    }

    /// Hash `salt + plaintext` with the password algorithm.
    ///
    /// # Errors
    /// Returns an error if the underlying algorithm fails.
    pub fn hash_password(&self, salt: &str, plaintext: &str) -> Result<String, HashError> {
        let input = hash_input(self.password_algorithm, salt, plaintext);
        self.hash_with(self.password_algorithm, input.as_bytes())
    }

    /// Check `plaintext` against a stored hash. Malformed hashes never verify.
    #[must_use]
    pub fn verify(&self, salt: &str, plaintext: &str, stored_hash: &str) -> bool {
        // The stored hash names its own scheme, so hashes written under an older
        // configuration keep verifying.
        let Some(algorithm) = detect_algorithm(stored_hash) else {
            return false;
        };
        let input = hash_input(algorithm, salt, plaintext);

        match algorithm {
            HashAlgorithm::Bcrypt => bcrypt::verify(input.as_bytes(), stored_hash).unwrap_or(false),
            HashAlgorithm::Argon2 => PasswordHash::new(stored_hash).is_ok_and(|parsed| {
                Argon2::default()
                    .verify_password(input.as_bytes(), &parsed)
                    .is_ok()
            }),
        }
    }

    /// Fresh salt plus the matching hash for `plaintext`.
    ///
    /// # Errors
    /// Returns an error if salt generation or hashing fails.
    pub fn new_credential(&self, plaintext: &str) -> Result<Credential, HashError> {
        let salt = self.generate_salt()?;
        let hash = self.hash_password(&salt, plaintext)?;
        Ok(Credential { salt, hash })
    }

    fn hash_with(&self, algorithm: HashAlgorithm, input: &[u8]) -> Result<String, HashError> {
        let hash = match algorithm {
            HashAlgorithm::Bcrypt => bcrypt::hash(input, self.cost)?,
            HashAlgorithm::Argon2 => {
                let salt = SaltString::generate(&mut PhcOsRng);
                Argon2::default()
                    .hash_password(input, &salt)
                    .map_err(|e| HashError::Argon2(e.to_string()))?
                    .to_string()
            }
        };

        if hash.len() > MAX_HASH_LEN {
            return Err(HashError::TooLong);
        }

        Ok(hash)
    }
}

fn detect_algorithm(stored_hash: &str) -> Option<HashAlgorithm> {
    if stored_hash.starts_with("$argon2") {
        Some(HashAlgorithm::Argon2)
    } else if stored_hash.starts_with("$2") {
        Some(HashAlgorithm::Bcrypt)
    } else {
        None
    }
}

/// bcrypt ignores input past 72 bytes and a bcrypt salt alone is 60, so the
/// combined value is reduced to a fixed-size digest first.
fn hash_input(algorithm: HashAlgorithm, salt: &str, plaintext: &str) -> String {
    match algorithm {
        HashAlgorithm::Bcrypt => {
            let mut hasher = Sha256::new();
            hasher.update(salt.as_bytes());
            hasher.update(plaintext.as_bytes());
            Base64::encode_string(&hasher.finalize())
        }
        HashAlgorithm::Argon2 => format!("{salt}{plaintext}"),
    }
}
