//! Persistence for accounts, validation keys and user profiles.
//!
//! The workflow only sees the traits below. `PgStore` backs them with
//! PostgreSQL, `MemoryStore` keeps everything in process.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use utoipa::ToSchema;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Column protected by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    PhoneNumber,
    ValidationAccount,
    ValidationKey,
    ProfileAccount,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::PhoneNumber => "phone number",
            Self::ValidationAccount => "validation account",
            Self::ValidationKey => "validation key",
            Self::ProfileAccount => "profile account",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{0} already exists")]
    UniqueViolation(UniqueField),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Clone, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub hashed_password: String,
    pub hash_salt: String,
    pub is_active: bool,
    pub is_verified: bool,
    pub is_logged_in: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("phone_number", &self.phone_number)
            .field("hashed_password", &"***")
            .field("hash_salt", &"***")
            .field("is_active", &self.is_active)
            .field("is_verified", &self.is_verified)
            .field("is_logged_in", &self.is_logged_in)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountInfo {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Account> for AccountInfo {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            phone_number: account.phone_number.clone(),
            is_active: account.is_active,
            is_verified: account.is_verified,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub hashed_password: String,
    pub hash_salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ValidationRecord {
    pub id: i64,
    pub account_id: i64,
    pub validation_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Profile {
    pub id: i64,
    pub account_id: i64,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct NewProfile {
    pub first_name: String,
    pub middle_name: Option<String>,
    pub last_name: String,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Account, StoreError>;

    async fn find_by_username(&self, username: &str) -> Result<Account, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError>;

    async fn find_by_phone_number(&self, phone_number: &str) -> Result<Account, StoreError>;

    /// Insert an inactive account. Fails with `UniqueViolation` on a taken
    /// username, email or phone number.
    async fn insert_account(
        &self,
        account: NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    /// Set `is_active` and `updated_at` together.
    async fn activate(&self, id: i64, now: DateTime<Utc>) -> Result<Account, StoreError>;

    /// Replace salt and hash together with `updated_at`.
    async fn update_credential(
        &self,
        id: i64,
        hash_salt: &str,
        hashed_password: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    async fn set_logged_in(&self, id: i64, logged_in: bool) -> Result<Account, StoreError>;
}

#[async_trait]
pub trait ValidationKeyStore: Send + Sync {
    /// Fails with `UniqueViolation(ValidationAccount)` if the account already
    /// holds a record.
    async fn insert_key(
        &self,
        account_id: i64,
        validation_key: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ValidationRecord, StoreError>;

    async fn find_key_by_account(&self, account_id: i64) -> Result<ValidationRecord, StoreError>;

    /// Delete the account's record if it was created at or before `cutoff`.
    async fn purge_expired(&self, account_id: i64, cutoff: DateTime<Utc>)
        -> Result<bool, StoreError>;

    /// Atomically delete and return the record matching `validation_key`
    /// created after `cutoff`.
    async fn take_key(
        &self,
        validation_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<ValidationRecord, StoreError>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn insert_profile(
        &self,
        account_id: i64,
        profile: NewProfile,
    ) -> Result<Profile, StoreError>;

    async fn find_profile(&self, account_id: i64) -> Result<Profile, StoreError>;
}
