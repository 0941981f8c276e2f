use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info_span, Instrument, Span};

use super::{
    Account, AccountStore, NewAccount, NewProfile, Profile, ProfileStore, StoreError, UniqueField,
    ValidationKeyStore, ValidationRecord,
};

const ACCOUNT_COLUMNS: &str = "id, username, email, phone_number, hashed_password, hash_salt, \
    is_active, is_verified, is_logged_in, created_at, updated_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_account(
        &self,
        query: &str,
        operation: &str,
        bind: Bind<'_>,
    ) -> Result<Account, StoreError> {
        let q = sqlx::query_as::<_, Account>(query);
        let q = match bind {
            Bind::Id(id) => q.bind(id),
            Bind::Text(value) => q.bind(value),
        };
        q.fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .with_context(|| format!("failed to {operation}"))?
            .ok_or(StoreError::NotFound)
    }
}

enum Bind<'a> {
    Id(i64),
    Text(&'a str),
}

fn db_span(operation: &str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

/// Map a violated constraint name onto the column it protects.
fn unique_field(constraint: &str) -> Option<UniqueField> {
    match constraint {
        "accounts_username_key" => Some(UniqueField::Username),
        "accounts_email_key" => Some(UniqueField::Email),
        "accounts_phone_number_key" => Some(UniqueField::PhoneNumber),
        "account_validations_account_id_key" => Some(UniqueField::ValidationAccount),
        "account_validations_validation_key_key" => Some(UniqueField::ValidationKey),
        "users_account_id_key" => Some(UniqueField::ProfileAccount),
        _ => None,
    }
}

fn write_error(err: sqlx::Error, context: &'static str) -> StoreError {
    let field = match &err {
        sqlx::Error::Database(db_err) if is_unique_violation(&err) => {
            db_err.constraint().and_then(unique_field)
        }
        _ => None,
    };

    match field {
        Some(field) => StoreError::UniqueViolation(field),
        None => StoreError::Backend(anyhow!(err).context(context)),
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_id(&self, id: i64) -> Result<Account, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        self.fetch_account(&query, "lookup account by id", Bind::Id(id))
            .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Account, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE username = $1");
        self.fetch_account(&query, "lookup account by username", Bind::Text(username))
            .await
    }

    async fn find_by_email(&self, email: &str) -> Result<Account, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        self.fetch_account(&query, "lookup account by email", Bind::Text(email))
            .await
    }

    async fn find_by_phone_number(&self, phone_number: &str) -> Result<Account, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE phone_number = $1");
        self.fetch_account(
            &query,
            "lookup account by phone number",
            Bind::Text(phone_number),
        )
        .await
    }

    async fn insert_account(
        &self,
        account: NewAccount,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            "INSERT INTO accounts \
                (username, email, phone_number, hashed_password, hash_salt, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.phone_number)
            .bind(&account.hashed_password)
            .bind(&account.hash_salt)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await
            .map_err(|err| write_error(err, "failed to insert account"))
    }

    async fn activate(&self, id: i64, now: DateTime<Utc>) -> Result<Account, StoreError> {
        let query = format!(
            "UPDATE accounts SET is_active = TRUE, updated_at = $2 WHERE id = $1 \
             RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to activate account")?
            .ok_or(StoreError::NotFound)
    }

    async fn update_credential(
        &self,
        id: i64,
        hash_salt: &str,
        hashed_password: &str,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let query = format!(
            "UPDATE accounts SET hash_salt = $2, hashed_password = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(hash_salt)
            .bind(hashed_password)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to update account credential")?
            .ok_or(StoreError::NotFound)
    }

    async fn set_logged_in(&self, id: i64, logged_in: bool) -> Result<Account, StoreError> {
        let query = format!(
            "UPDATE accounts SET is_logged_in = $2 WHERE id = $1 RETURNING {ACCOUNT_COLUMNS}"
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(logged_in)
            .fetch_optional(&self.pool)
            .instrument(db_span("UPDATE", &query))
            .await
            .context("failed to update signin state")?
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ValidationKeyStore for PgStore {
    async fn insert_key(
        &self,
        account_id: i64,
        validation_key: &str,
        created_at: DateTime<Utc>,
    ) -> Result<ValidationRecord, StoreError> {
        let query = r"
            INSERT INTO account_validations (account_id, validation_key, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, account_id, validation_key, created_at
        ";
        sqlx::query_as::<_, ValidationRecord>(query)
            .bind(account_id)
            .bind(validation_key)
            .bind(created_at)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| write_error(err, "failed to insert validation key"))
    }

    async fn find_key_by_account(&self, account_id: i64) -> Result<ValidationRecord, StoreError> {
        let query = r"
            SELECT id, account_id, validation_key, created_at
            FROM account_validations
            WHERE account_id = $1
        ";
        sqlx::query_as::<_, ValidationRecord>(query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup validation key")?
            .ok_or(StoreError::NotFound)
    }

    async fn purge_expired(
        &self,
        account_id: i64,
        cutoff: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let query = r"
            DELETE FROM account_validations
            WHERE account_id = $1 AND created_at <= $2
        ";
        let result = sqlx::query(query)
            .bind(account_id)
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to purge expired validation key")?;

        Ok(result.rows_affected() > 0)
    }

    async fn take_key(
        &self,
        validation_key: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<ValidationRecord, StoreError> {
        // Single statement: two concurrent redemptions cannot both succeed.
        let query = r"
            DELETE FROM account_validations
            WHERE validation_key = $1 AND created_at > $2
            RETURNING id, account_id, validation_key, created_at
        ";
        sqlx::query_as::<_, ValidationRecord>(query)
            .bind(validation_key)
            .bind(cutoff)
            .fetch_optional(&self.pool)
            .instrument(db_span("DELETE", query))
            .await
            .context("failed to redeem validation key")?
            .ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn insert_profile(
        &self,
        account_id: i64,
        profile: NewProfile,
    ) -> Result<Profile, StoreError> {
        let query = r"
            INSERT INTO users (account_id, first_name, middle_name, last_name, gender, birthday)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, account_id, first_name, middle_name, last_name, gender, birthday
        ";
        sqlx::query_as::<_, Profile>(query)
            .bind(account_id)
            .bind(&profile.first_name)
            .bind(&profile.middle_name)
            .bind(&profile.last_name)
            .bind(&profile.gender)
            .bind(profile.birthday)
            .fetch_one(&self.pool)
            .instrument(db_span("INSERT", query))
            .await
            .map_err(|err| write_error(err, "failed to insert profile"))
    }

    async fn find_profile(&self, account_id: i64) -> Result<Profile, StoreError> {
        let query = r"
            SELECT id, account_id, first_name, middle_name, last_name, gender, birthday
            FROM users
            WHERE account_id = $1
        ";
        sqlx::query_as::<_, Profile>(query)
            .bind(account_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", query))
            .await
            .context("failed to lookup profile")?
            .ok_or(StoreError::NotFound)
    }
}
