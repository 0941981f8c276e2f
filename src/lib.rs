//! # Sesame (account signup, signin and credential lifecycle)
//!
//! `sesame` manages accounts: signup with email activation, password signin
//! issuing HMAC-signed bearer tokens, password change and password reset.
//!
//! ## Credentials
//!
//! Every account carries its own salt, itself produced by one hashing pass over
//! fresh OS randomness and a deployment seed. The password hash is computed over
//! `salt + password` with an adaptive algorithm (bcrypt or argon2id).
//!
//! ## Validation keys
//!
//! Activation and password reset use one-time keys: at most one outstanding key
//! per account, valid for a short window, deleted on redemption. Expired and
//! unknown keys are indistinguishable to callers.
//!
//! ## Email
//!
//! Outbound mail is queued on an in-process channel and delivered by a
//! background worker. Requests never wait for delivery and never fail because of it.

pub mod cli;
pub mod sesame;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
