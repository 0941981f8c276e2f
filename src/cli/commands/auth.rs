use anyhow::{Context, Result};
use clap::{builder::PossibleValuesParser, Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_JWT_SECRET_KEY: &str = "jwt-secret-key";
pub const ARG_JWT_ALGORITHM: &str = "jwt-algorithm";
pub const ARG_JWT_SUBJECT: &str = "jwt-subject";
pub const ARG_JWT_ACCESS_MINUTES: &str = "jwt-access-minutes";
pub const ARG_PASSWORD_HASH_ALGORITHM: &str = "password-hash-algorithm";
pub const ARG_SALT_HASH_ALGORITHM: &str = "salt-hash-algorithm";
pub const ARG_HASH_SALT: &str = "hash-salt";
pub const ARG_HASH_COST: &str = "hash-cost";
pub const ARG_VALIDATION_KEY_MINUTES: &str = "validation-key-minutes";
pub const ARG_FORGOT_PASSWORD_POLICY: &str = "forgot-password-policy";
pub const ARG_CACHE_TTL_SECONDS: &str = "cache-ttl-seconds";

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub jwt: JwtOptions,
    pub hash: HashOptions,
    pub validation_key_minutes: i64,
    pub forgot_password_policy: String,
    pub cache_ttl_seconds: u64,
}

#[derive(Debug)]
pub struct JwtOptions {
    pub secret_key: SecretString,
    pub algorithm: String,
    pub subject: String,
    pub access_minutes: i64,
}

#[derive(Debug)]
pub struct HashOptions {
    pub password_algorithm: String,
    pub salt_algorithm: String,
    pub salt: SecretString,
    pub cost: u32,
}

impl Options {
    /// # Errors
    /// Returns an error if a required argument is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let string = |id: &str| -> Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .with_context(|| format!("missing required argument: --{id}"))
        };

        Ok(Self {
            frontend_base_url: string(ARG_FRONTEND_BASE_URL)?,
            jwt: JwtOptions {
                secret_key: SecretString::from(string(ARG_JWT_SECRET_KEY)?),
                algorithm: string(ARG_JWT_ALGORITHM)?,
                subject: string(ARG_JWT_SUBJECT)?,
                access_minutes: matches
                    .get_one::<i64>(ARG_JWT_ACCESS_MINUTES)
                    .copied()
                    .unwrap_or(30),
            },
            hash: HashOptions {
                password_algorithm: string(ARG_PASSWORD_HASH_ALGORITHM)?,
                salt_algorithm: string(ARG_SALT_HASH_ALGORITHM)?,
                salt: SecretString::from(string(ARG_HASH_SALT)?),
                cost: matches.get_one::<u32>(ARG_HASH_COST).copied().unwrap_or(12),
            },
            validation_key_minutes: matches
                .get_one::<i64>(ARG_VALIDATION_KEY_MINUTES)
                .copied()
                .unwrap_or(5),
            forgot_password_policy: string(ARG_FORGOT_PASSWORD_POLICY)?,
            cache_ttl_seconds: matches
                .get_one::<u64>(ARG_CACHE_TTL_SECONDS)
                .copied()
                .unwrap_or(30),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_hash_args(command);
    with_workflow_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET_KEY)
                .long(ARG_JWT_SECRET_KEY)
                .help("Secret used to sign access tokens")
                .env("SESAME_JWT_SECRET_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_JWT_ALGORITHM)
                .long(ARG_JWT_ALGORITHM)
                .help("Access token signing algorithm")
                .env("SESAME_JWT_ALGORITHM")
                .default_value("HS256")
                .value_parser(PossibleValuesParser::new(["HS256", "HS384", "HS512"])),
        )
        .arg(
            Arg::new(ARG_JWT_SUBJECT)
                .long(ARG_JWT_SUBJECT)
                .help("Subject claim of access tokens")
                .env("SESAME_JWT_SUBJECT")
                .default_value("access"),
        )
        .arg(
            Arg::new(ARG_JWT_ACCESS_MINUTES)
                .long(ARG_JWT_ACCESS_MINUTES)
                .help("Access token lifetime in minutes")
                .env("SESAME_JWT_ACCESS_MINUTES")
                .default_value("30")
                .value_parser(clap::value_parser!(i64).range(1..=525_600)),
        )
}

fn with_hash_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PASSWORD_HASH_ALGORITHM)
                .long(ARG_PASSWORD_HASH_ALGORITHM)
                .help("Algorithm used to hash passwords")
                .env("SESAME_PASSWORD_HASH_ALGORITHM")
                .default_value("bcrypt")
                .value_parser(PossibleValuesParser::new(["bcrypt", "argon2"])),
        )
        .arg(
            Arg::new(ARG_SALT_HASH_ALGORITHM)
                .long(ARG_SALT_HASH_ALGORITHM)
                .help("Algorithm used to derive per-account salts")
                .env("SESAME_SALT_HASH_ALGORITHM")
                .default_value("bcrypt")
                .value_parser(PossibleValuesParser::new(["bcrypt", "argon2"])),
        )
        .arg(
            Arg::new(ARG_HASH_SALT)
                .long(ARG_HASH_SALT)
                .help("Deployment seed mixed into every per-account salt")
                .env("SESAME_HASH_SALT")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_HASH_COST)
                .long(ARG_HASH_COST)
                .help("bcrypt cost factor")
                .env("SESAME_HASH_COST")
                .default_value("12")
                .value_parser(clap::value_parser!(u32).range(4..=31)),
        )
}

fn with_workflow_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for activation and reset links")
                .env("SESAME_FRONTEND_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_VALIDATION_KEY_MINUTES)
                .long(ARG_VALIDATION_KEY_MINUTES)
                .help("Lifetime of activation and reset keys in minutes")
                .env("SESAME_VALIDATION_KEY_MINUTES")
                .default_value("5")
                .value_parser(clap::value_parser!(i64).range(1..=525_600)),
        )
        .arg(
            Arg::new(ARG_FORGOT_PASSWORD_POLICY)
                .long(ARG_FORGOT_PASSWORD_POLICY)
                .help("Answer for unknown emails on forgot-password: conceal or reveal")
                .env("SESAME_FORGOT_PASSWORD_POLICY")
                .default_value("conceal")
                .value_parser(PossibleValuesParser::new(["conceal", "reveal"])),
        )
        .arg(
            Arg::new(ARG_CACHE_TTL_SECONDS)
                .long(ARG_CACHE_TTL_SECONDS)
                .help("Lifetime of cached account lookups in seconds")
                .env("SESAME_CACHE_TTL_SECONDS")
                .default_value("30")
                .value_parser(clap::value_parser!(u64)),
        )
}
