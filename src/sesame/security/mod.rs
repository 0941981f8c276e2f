pub mod hash;
pub mod token;

pub use self::hash::{Credential, CredentialHasher, HashAlgorithm, HashError};
pub use self::token::{AccessClaims, TokenError, TokenIssuer};
