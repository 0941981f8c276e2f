use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{
    Account, AccountStore, NewAccount, NewProfile, Profile, ProfileStore, StoreError, UniqueField,
    ValidationKeyStore, ValidationRecord,
};

#[derive(Default)]
struct Tables {
    accounts: HashMap<i64, Account>,
    validations: HashMap<i64, ValidationRecord>,
    profiles: HashMap<i64, Profile>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn account_where(&self, predicate: impl Fn(&Account) -> bool) -> Result<Account, StoreError> {
        self.accounts
            .values()
            .find(|account| predicate(account))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update_account(
        &mut self,
        id: i64,
        update: impl FnOnce(&mut Account),
    ) -> Result<Account, StoreError> {
        let account = self.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        update(account);
        Ok(account.clone())
    }
}

/// Process-local store. Every operation runs under one lock, so constraint
/// checks and the write they guard are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account_count(&self) -> usize {
        self.tables.lock().await.accounts.len()
    }

    pub async fn validation_count(&self) -> usize {
        self.tables.lock().await.validations.len()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Account, StoreError> {
        let tables = self.tables.lock().await;
        tables.accounts.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn find_by_username(&self, username: &str) -> Result<Account, StoreError> {
        self.tables
            .lock()
            .await
            .account_where(|account| account.username == username)
    }

    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.tables
            .lock()
            .await
            .account_where(|account| account.email == email)
    }

    async fn find_by_phone_number(&self, phone_number: &str) -> Result<Account, StoreError> {
        self.tables
            .lock()
            .await
            .account_where(|account| account.phone_number.as_deref() == Some(phone_number))
    }

    async fn insert_account(
        &self,
        account: NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut tables = self.tables.lock().await;

        // Username, then email, then phone number, whatever the row order.
        let accounts = &tables.accounts;
        if accounts.values().any(|existing| existing.username == account.username) {
            return Err(StoreError::UniqueViolation(UniqueField::Username));
        }
        if accounts.values().any(|existing| existing.email == account.email) {
            return Err(StoreError::UniqueViolation(UniqueField::Email));
        }
        if account.phone_number.is_some()
            && accounts.values().any(|existing| existing.phone_number == account.phone_number)
        {
            return Err(StoreError::UniqueViolation(UniqueField::PhoneNumber));
        }

        let id = tables.next_id();
        let stored = Account {
            id,
            username: account.username,
            email: account.email,
            phone_number: account.phone_number,
            hashed_password: account.hashed_password,
            hash_salt: account.hash_salt,
            is_active: false,
            is_verified: false,
            is_logged_in: false,
            created_at: now,
            updated_at: None,
        };
        tables.accounts.insert(id, stored.clone());

        Ok(stored)
    }

    async fn activate(&self, id: i64, now: DateTime<Utc>) -> Result<Account, StoreError> {
        self.tables.lock().await.update_account(id, |account| {
            account.is_active = true;
            account.updated_at = Some(now);
        })
    }

    async fn update_credential(
        &self,
        id: i64,
        hash_salt: &str,
        hashed_password: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        self.tables.lock().await.update_account(id, |account| {
            account.hash_salt = hash_salt.to_string();
            account.hashed_password = hashed_password.to_string();
            account.updated_at = Some(now);
        })
    }

    async fn set_logged_in(&self, id: i64, logged_in: bool) -> Result<Account, StoreError> {
        self.tables
            .lock()
            .await
            .update_account(id, |account| account.is_logged_in = logged_in)
    }
}

#[async_trait]
impl ValidationKeyStore for MemoryStore {
    async fn insert_key(
        &self,
        account_id: i64,
        validation_key: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ValidationRecord, StoreError> {
        let mut tables = self.tables.lock().await;

        if tables.validations.contains_key(&account_id) {
            return Err(StoreError::UniqueViolation(UniqueField::ValidationAccount));
        }
        if tables
            .validations
            .values()
            .any(|record| record.validation_key == validation_key)
        {
            return Err(StoreError::UniqueViolation(UniqueField::ValidationKey));
        }

        let record = ValidationRecord {
            id: tables.next_id(),
            account_id,
            validation_key: validation_key.to_string(),
            created_at,
        };
        tables.validations.insert(account_id, record.clone());

        Ok(record)
    }

    async fn find_key_by_account(&self, account_id: i64) -> Result<ValidationRecord, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .validations
            .get(&account_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn purge_expired(
        &self,
        account_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        let expired = tables
            .validations
            .get(&account_id)
            .is_some_and(|record| record.created_at <= cutoff);
        if expired {
            tables.validations.remove(&account_id);
        }
        Ok(expired)
    }

    async fn take_key(
        &self,
        validation_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<ValidationRecord, StoreError> {
        let mut tables = self.tables.lock().await;
        let account_id = tables
            .validations
            .values()
            .find(|record| record.validation_key == validation_key && record.created_at > cutoff)
            .map(|record| record.account_id)
            .ok_or(StoreError::NotFound)?;

        tables
            .validations
            .remove(&account_id)
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn insert_profile(
        &self,
        account_id: i64,
        profile: NewProfile,
    ) -> Result<Profile, StoreError> {
        let mut tables = self.tables.lock().await;

        if tables.profiles.contains_key(&account_id) {
            return Err(StoreError::UniqueViolation(UniqueField::ProfileAccount));
        }

        let stored = Profile {
            id: tables.next_id(),
            account_id,
            first_name: profile.first_name,
            middle_name: profile.middle_name,
            last_name: profile.last_name,
            gender: profile.gender,
            birthday: profile.birthday,
        };
        tables.profiles.insert(account_id, stored.clone());

        Ok(stored)
    }

    async fn find_profile(&self, account_id: i64) -> Result<Profile, StoreError> {
        let tables = self.tables.lock().await;
        tables
            .profiles
            .get(&account_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}
