use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;
use thiserror::Error;
use tracing::error;

use crate::sesame::store::UniqueField;

pub const SIGNIN_FAILED: &str = "signin failed! please recheck all your credentials!";
pub const WRONG_PASSWORD: &str = "current password is wrong!";
pub const INVALID_KEY: &str = "validation key expired or invalid";
pub const INVALID_CREDENTIALS: &str = "could not validate credentials";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Account,
    ValidationKey,
    Profile,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Account => f.write_str("account"),
            Self::ValidationKey => f.write_str("validation key"),
            Self::Profile => f.write_str("profile"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0} does not exist")]
    NotFound(Entity),
    #[error("{field} {value} already exists")]
    AlreadyExists { field: UniqueField, value: String },
    #[error("password does not match")]
    CredentialMismatch,
    #[error("could not validate credentials")]
    InvalidToken,
    #[error("account is not active")]
    NotActive,
    #[error("{0} already exists for this account")]
    Conflict(Entity),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(Entity::ValidationKey)
            | Self::AlreadyExists { .. }
            | Self::CredentialMismatch
            | Self::NotActive => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::NotFound(Entity::ValidationKey) => INVALID_KEY.to_string(),
            Self::NotFound(entity) => format!("{entity} not found"),
            Self::AlreadyExists { field, value } => match field {
                UniqueField::Username => {
                    format!("username {value} is taken! Please choose a different one!")
                }
                UniqueField::Email => {
                    format!("email {value} is already registered! Please choose a different one!")
                }
                UniqueField::PhoneNumber => format!(
                    "phone number {value} is already registered! Please choose a different one!"
                ),
                other => format!("{other} {value} already exists"),
            },
            Self::CredentialMismatch => WRONG_PASSWORD.to_string(),
            Self::InvalidToken => INVALID_CREDENTIALS.to_string(),
            Self::NotActive => "account is not active! please activate through email.".to_string(),
            Self::Conflict(entity) => format!("{entity} already exists for this account"),
            Self::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            error!("internal error: {err:#}");
        }

        let status = self.status();
        let body = Json(json!({ "detail": self.detail() }));

        if matches!(self, Self::InvalidToken) {
            return (
                status,
                [(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))],
                body,
            )
                .into_response();
        }

        (status, body).into_response()
    }
}
