//! One-time validation keys for account activation and password reset.
//!
//! An account holds at most one outstanding key. Keys live for a fixed window
//! and are deleted on redemption; expired records stay in the table but are
//! treated as absent.

use anyhow::{anyhow, Context};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::sesame::store::{StoreError, UniqueField, ValidationKeyStore, ValidationRecord};

const KEY_BYTES: usize = 32;

#[derive(Clone)]
pub struct ValidationKeys {
    store: Arc<dyn ValidationKeyStore>,
    window: Duration,
}

impl std::fmt::Debug for ValidationKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationKeys")
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

/// Random opaque key, base64url without padding.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_key() -> anyhow::Result<String> {
    let mut bytes = [0u8; KEY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate validation key")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

impl ValidationKeys {
    #[must_use]
    pub fn new(store: Arc<dyn ValidationKeyStore>, window: Duration) -> Self {
        Self { store, window }
    }

    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Oldest creation time still inside the window at `now`.
    fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, StoreError> {
        now.checked_sub_signed(self.window)
            .ok_or_else(|| StoreError::Backend(anyhow!("validation window out of range")))
    }

    /// Issue a key for `account_id`, or return the one already outstanding.
    ///
    /// # Errors
    /// Returns `StoreError::Backend` on storage failure.
    pub async fn create(&self, account_id: i64) -> Result<ValidationRecord, StoreError> {
        self.create_at(account_id, Utc::now()).await
    }

    #[instrument(skip(self))]
    pub async fn create_at(
        &self,
        account_id: i64,
        now: DateTime<Utc>,
    ) -> Result<ValidationRecord, StoreError> {
        let cutoff = self.cutoff(now)?;

        // one retry after purging a dead record
        for _ in 0..2 {
            let key = generate_key()?;
            match self.store.insert_key(account_id, &key, now).await {
                Ok(record) => return Ok(record),
                Err(StoreError::UniqueViolation(UniqueField::ValidationAccount)) => {}
                Err(err) => return Err(err),
            }

            match self.store.find_key_by_account(account_id).await {
                Ok(existing) if existing.created_at > cutoff => {
                    debug!("returning outstanding validation key");
                    return Ok(existing);
                }
                // redeemed between the insert and the lookup
                Ok(_) | Err(StoreError::NotFound) => {}
                Err(err) => return Err(err),
            }

            if self.store.purge_expired(account_id, cutoff).await? {
                debug!("purged expired validation key");
            }
        }

        // A concurrent caller won the race; whatever it stored is the answer.
        self.store.find_key_by_account(account_id).await
    }

    /// Consume `key`. Expired and unknown keys both yield `NotFound`.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if no live record matches.
    pub async fn redeem(&self, key: &str) -> Result<ValidationRecord, StoreError> {
        self.redeem_at(key, Utc::now()).await
    }

    #[instrument(skip(self, key))]
    pub async fn redeem_at(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidationRecord, StoreError> {
        if key.is_empty() {
            return Err(StoreError::NotFound);
        }
        self.store.take_key(key, self.cutoff(now)?).await
    }

    /// Outstanding record for `account_id`, expired or not.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the account has no record.
    pub async fn fetch(&self, account_id: i64) -> Result<ValidationRecord, StoreError> {
        self.store.find_key_by_account(account_id).await
    }
}
