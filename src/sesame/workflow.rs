//! Account lifecycle: signup, activation, signin and credential changes.
//!
//! ```text
//! created (inactive) --activation key--> active --password change/reset--> active
//! ```

use anyhow::{anyhow, Context};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::sesame::{
    cache::AccountCache,
    config::{AuthConfig, ForgotPasswordPolicy},
    email::{activation_url, reset_url, Mailer},
    error::{AuthError, Entity},
    keys::ValidationKeys,
    security::{CredentialHasher, TokenIssuer},
    store::{
        Account, AccountInfo, AccountStore, NewAccount, NewProfile, Profile, ProfileStore,
        StoreError, UniqueField, ValidationKeyStore,
    },
};

#[derive(Clone)]
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub validations: Arc<dyn ValidationKeyStore>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl Stores {
    /// Use one backend for every table.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: AccountStore + ValidationKeyStore + ProfileStore + 'static,
    {
        Self {
            accounts: store.clone(),
            validations: store.clone(),
            profiles: store,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Signup {
    pub username: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub password: String,
}

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
    profiles: Arc<dyn ProfileStore>,
    keys: ValidationKeys,
    hasher: Arc<CredentialHasher>,
    tokens: TokenIssuer,
    mailer: Mailer,
    cache: AccountCache,
    config: AuthConfig,
}

fn internal(err: StoreError) -> AuthError {
    match err {
        StoreError::Backend(err) => AuthError::Internal(err),
        other => AuthError::Internal(anyhow!(other)),
    }
}

impl AccountService {
    #[must_use]
    pub fn new(
        stores: Stores,
        hasher: CredentialHasher,
        tokens: TokenIssuer,
        mailer: Mailer,
        config: AuthConfig,
    ) -> Self {
        Self {
            accounts: stores.accounts,
            profiles: stores.profiles,
            keys: ValidationKeys::new(stores.validations, config.validation_window()),
            hasher: Arc::new(hasher),
            tokens,
            mailer,
            cache: AccountCache::new(config.cache_ttl()),
            config,
        }
    }

    #[must_use]
    pub fn keys(&self) -> &ValidationKeys {
        &self.keys
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Fails with `AlreadyExists` naming the first taken field, checked in
    /// the order username, email, phone number.
    ///
    /// # Errors
    /// `AlreadyExists` or `Internal`.
    pub async fn ensure_available(
        &self,
        username: &str,
        email: &str,
        phone_number: Option<&str>,
    ) -> Result<(), AuthError> {
        Self::ensure_absent(
            self.accounts.find_by_username(username).await,
            UniqueField::Username,
            username,
        )?;
        Self::ensure_absent(
            self.accounts.find_by_email(email).await,
            UniqueField::Email,
            email,
        )?;
        if let Some(phone_number) = phone_number {
            Self::ensure_absent(
                self.accounts.find_by_phone_number(phone_number).await,
                UniqueField::PhoneNumber,
                phone_number,
            )?;
        }
        Ok(())
    }

    fn ensure_absent(
        lookup: Result<Account, StoreError>,
        field: UniqueField,
        value: &str,
    ) -> Result<(), AuthError> {
        match lookup {
            Ok(_) => Err(AuthError::AlreadyExists {
                field,
                value: value.to_string(),
            }),
            Err(StoreError::NotFound) => Ok(()),
            Err(err) => Err(internal(err)),
        }
    }

    /// Create an inactive account and queue its activation mail.
    ///
    /// # Errors
    /// `AlreadyExists` if username, email or phone number is taken.
    #[instrument(skip(self, signup), fields(username = %signup.username))]
    pub async fn signup(&self, signup: Signup) -> Result<Account, AuthError> {
        let Signup {
            username,
            email,
            phone_number,
            password,
        } = signup;

        self.ensure_available(&username, &email, phone_number.as_deref())
            .await?;

        let hasher = self.hasher.clone();
        let credential = tokio::task::spawn_blocking(move || hasher.new_credential(&password))
            .await
            .context("password hashing task failed")?
            .context("failed to hash password")?;

        let new_account = NewAccount {
            username,
            email,
            phone_number,
            hashed_password: credential.hash,
            hash_salt: credential.salt,
        };

        let account = match self
            .accounts
            .insert_account(new_account.clone(), Utc::now())
            .await
        {
            Ok(account) => account,
            Err(StoreError::UniqueViolation(field)) => {
                let value = match field {
                    UniqueField::Username => new_account.username,
                    UniqueField::Email => new_account.email,
                    UniqueField::PhoneNumber => new_account.phone_number.unwrap_or_default(),
                    _ => String::new(),
                };
                return Err(AuthError::AlreadyExists { field, value });
            }
            Err(err) => return Err(internal(err)),
        };

        let record = self.keys.create(account.id).await.map_err(internal)?;
        let url = activation_url(self.config.frontend_base_url(), &record.validation_key);
        self.mailer
            .enqueue_activation(&account.email, &account.username, &url);

        info!(account_id = account.id, "account created");

        Ok(account)
    }

    /// Check credentials and return a bearer token.
    ///
    /// # Errors
    /// `NotFound`, `NotActive` or `CredentialMismatch`.
    #[instrument(skip(self, password))]
    pub async fn signin(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let account = match self.accounts.find_by_username(username).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => return Err(AuthError::NotFound(Entity::Account)),
            Err(err) => return Err(internal(err)),
        };

        if !account.is_active {
            return Err(AuthError::NotActive);
        }

        if !self.verify_password(&account, password).await? {
            debug!(account_id = account.id, "password mismatch");
            return Err(AuthError::CredentialMismatch);
        }

        let token = self
            .tokens
            .issue(&account)
            .context("failed to issue access token")?;

        match self.accounts.set_logged_in(account.id, true).await {
            Ok(account) => self.cache.put(AccountInfo::from(&account)).await,
            Err(err) => warn!("failed to record signin: {err}"),
        }

        Ok(token)
    }

    /// Redeem an activation key and mark the account active.
    ///
    /// # Errors
    /// `NotFound(ValidationKey)` for unknown, used or expired keys.
    #[instrument(skip(self, key))]
    pub async fn activate(&self, key: &str) -> Result<Account, AuthError> {
        let record = match self.keys.redeem(key).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(AuthError::NotFound(Entity::ValidationKey)),
            Err(err) => return Err(internal(err)),
        };

        let account = match self.accounts.activate(record.account_id, Utc::now()).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => return Err(AuthError::NotFound(Entity::ValidationKey)),
            Err(err) => return Err(internal(err)),
        };
        self.cache.invalidate(account.id).await;

        info!(account_id = account.id, "account activated");

        Ok(account)
    }

    /// Resolve the account behind a bearer token.
    ///
    /// # Errors
    /// `InvalidToken` if the token fails verification or its account is gone.
    pub async fn current_account(&self, token: &str) -> Result<Account, AuthError> {
        let claims = self.tokens.verify(token).map_err(|err| {
            debug!("token rejected: {err}");
            AuthError::InvalidToken
        })?;

        match self.accounts.find_by_username(&claims.username).await {
            Ok(account) if account.id == claims.id => Ok(account),
            Ok(_) | Err(StoreError::NotFound) => Err(AuthError::InvalidToken),
            Err(err) => Err(internal(err)),
        }
    }

    /// Public account data for the token holder, served from cache when fresh.
    ///
    /// # Errors
    /// `InvalidToken` if the token fails verification or its account is gone.
    pub async fn account_info(&self, token: &str) -> Result<AccountInfo, AuthError> {
        let claims = self
            .tokens
            .verify(token)
            .map_err(|_| AuthError::InvalidToken)?;

        if let Some(info) = self.cache.get(claims.id).await {
            return Ok(info);
        }

        let account = match self.accounts.find_by_id(claims.id).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => return Err(AuthError::InvalidToken),
            Err(err) => return Err(internal(err)),
        };
        let info = AccountInfo::from(&account);
        self.cache.put(info.clone()).await;

        Ok(info)
    }

    /// # Errors
    /// `InvalidToken`, `NotActive` or `CredentialMismatch`.
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<Account, AuthError> {
        let account = self.current_account(token).await?;

        if !account.is_active {
            return Err(AuthError::NotActive);
        }

        if !self.verify_password(&account, current_password).await? {
            return Err(AuthError::CredentialMismatch);
        }

        let account = self.rotate_credential(account.id, new_password).await?;

        info!(account_id = account.id, "password changed");

        Ok(account)
    }

    /// Queue a password reset mail for `email`.
    ///
    /// # Errors
    /// `NotFound(Account)` for an unknown email under the `reveal` policy.
    #[instrument(skip(self))]
    pub async fn forgot_password(&self, email: &str) -> Result<(), AuthError> {
        let account = match self.accounts.find_by_email(email).await {
            Ok(account) => account,
            Err(StoreError::NotFound) => {
                return match self.config.forgot_password_policy() {
                    ForgotPasswordPolicy::Conceal => {
                        debug!("password reset requested for unknown email");
                        Ok(())
                    }
                    ForgotPasswordPolicy::Reveal => Err(AuthError::NotFound(Entity::Account)),
                };
            }
            Err(err) => return Err(internal(err)),
        };

        let record = self.keys.create(account.id).await.map_err(internal)?;
        let url = reset_url(self.config.frontend_base_url(), &record.validation_key);
        self.mailer
            .enqueue_password_reset(&account.email, &account.username, &url);

        Ok(())
    }

    /// Redeem a reset key and set a new password.
    ///
    /// Activation and reset share the account's single key, so redeeming it
    /// here also activates an inactive account.
    ///
    /// # Errors
    /// `NotFound(ValidationKey)` for unknown, used or expired keys.
    #[instrument(skip_all)]
    pub async fn reset_password(&self, key: &str, new_password: &str) -> Result<Account, AuthError> {
        let record = match self.keys.redeem(key).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(AuthError::NotFound(Entity::ValidationKey)),
            Err(err) => return Err(internal(err)),
        };

        let mut account = self.rotate_credential(record.account_id, new_password).await?;

        if !account.is_active {
            account = match self.accounts.activate(account.id, Utc::now()).await {
                Ok(account) => account,
                Err(StoreError::NotFound) => return Err(AuthError::NotFound(Entity::Account)),
                Err(err) => return Err(internal(err)),
            };
            self.cache.invalidate(account.id).await;
            info!(account_id = account.id, "account activated by password reset");
        }

        info!(account_id = account.id, "password reset");

        Ok(account)
    }

    /// # Errors
    /// `InvalidToken`, `NotActive`, or `Conflict` if a profile already exists.
    #[instrument(skip(self, token, profile))]
    pub async fn create_profile(
        &self,
        token: &str,
        profile: NewProfile,
    ) -> Result<Profile, AuthError> {
        let account = self.current_account(token).await?;

        if !account.is_active {
            return Err(AuthError::NotActive);
        }

        match self.profiles.insert_profile(account.id, profile).await {
            Ok(profile) => Ok(profile),
            Err(StoreError::UniqueViolation(UniqueField::ProfileAccount)) => {
                Err(AuthError::Conflict(Entity::Profile))
            }
            Err(err) => Err(internal(err)),
        }
    }

    /// # Errors
    /// `InvalidToken`, or `NotFound` if the account has no profile yet.
    #[instrument(skip_all)]
    pub async fn profile(&self, token: &str) -> Result<Profile, AuthError> {
        let account = self.current_account(token).await?;

        match self.profiles.find_profile(account.id).await {
            Ok(profile) => Ok(profile),
            Err(StoreError::NotFound) => Err(AuthError::NotFound(Entity::Profile)),
            Err(err) => Err(internal(err)),
        }
    }

    async fn verify_password(&self, account: &Account, password: &str) -> Result<bool, AuthError> {
        let hasher = self.hasher.clone();
        let salt = account.hash_salt.clone();
        let stored = account.hashed_password.clone();
        let password = password.to_string();

        let matches =
            tokio::task::spawn_blocking(move || hasher.verify(&salt, &password, &stored))
                .await
                .context("password verification task failed")?;

        Ok(matches)
    }

    async fn rotate_credential(
        &self,
        account_id: i64,
        new_password: &str,
    ) -> Result<Account, AuthError> {
        let hasher = self.hasher.clone();
        let password = new_password.to_string();
        let credential = tokio::task::spawn_blocking(move || hasher.new_credential(&password))
            .await
            .context("password hashing task failed")?
            .context("failed to hash password")?;

        let account = match self
            .accounts
            .update_credential(account_id, &credential.salt, &credential.hash, Utc::now())
            .await
        {
            Ok(account) => account,
            Err(StoreError::NotFound) => return Err(AuthError::NotFound(Entity::Account)),
            Err(err) => return Err(internal(err)),
        };
        self.cache.invalidate(account_id).await;

        Ok(account)
    }
}
