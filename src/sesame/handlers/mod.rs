//! HTTP handlers and the input checks they share.

pub mod accounts;
pub mod auth;
pub mod health;
pub mod users;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

pub const PASSWORD_MIN_LEN: usize = 8;
pub const PASSWORD_MAX_LEN: usize = 64;
pub const EMAIL_MAX_LEN: usize = 256;

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct Message {
    pub msg: String,
}

impl Message {
    pub fn new(msg: impl Into<String>) -> Json<Self> {
        Json(Self { msg: msg.into() })
    }
}

/// At most `EMAIL_MAX_LEN` characters, matching the accounts column.
pub fn valid_email(email: &str) -> bool {
    email.chars().count() <= EMAIL_MAX_LEN
        && Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Optional leading `+` followed by 6 to 15 digits.
pub fn valid_phone_number(phone_number: &str) -> bool {
    Regex::new(r"^\+?[0-9]{6,15}$").is_ok_and(|re| re.is_match(phone_number))
}

/// 6 to 32 word characters, dots, `@` or dashes.
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[\w.@-]{6,32}$").is_ok_and(|re| re.is_match(username))
}

/// 8 to 64 characters with at least one lowercase, one uppercase, one digit
/// and one non-word character.
pub fn valid_password(password: &str) -> bool {
    let len = password.chars().count();
    (PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len)
        && password.chars().any(char::is_lowercase)
        && password.chars().any(char::is_uppercase)
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !(c.is_alphanumeric() || c == '_'))
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Plain error body in the same shape as `AuthError` responses.
pub(crate) fn reject(status: StatusCode, detail: &str) -> Response {
    (status, Json(json!({ "detail": detail }))).into_response()
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn email_format() {
        assert!(valid_email("alice@example.com"));
        assert!(!valid_email("alice@example"));
        assert!(!valid_email("alice example.com"));

        let local = "a".repeat(EMAIL_MAX_LEN - "@example.com".len());
        assert!(valid_email(&format!("{local}@example.com")));
        assert!(!valid_email(&format!("{local}a@example.com")));
    }

    #[test]
    fn phone_number_format() {
        assert!(valid_phone_number("+441234567890"));
        assert!(valid_phone_number("5551234"));
        assert!(valid_phone_number("+123456789012345"));
        assert!(!valid_phone_number("+1234567890123456"));
        assert!(!valid_phone_number("12345"));
        assert!(!valid_phone_number("555-1234"));
    }

    #[test]
    fn username_format() {
        assert!(valid_username("alice01"));
        assert!(valid_username("alice.doe@corp-1"));
        assert!(!valid_username("alice"));
        assert!(!valid_username(&"a".repeat(33)));
        assert!(!valid_username("alice doe"));
    }

    #[test]
    fn password_rules() {
        assert!(valid_password("Secr3t!pass"));
        assert!(!valid_password("S3t!a"));
        assert!(!valid_password("secr3t!pass"));
        assert!(!valid_password("SECR3T!PASS"));
        assert!(!valid_password("Secret!pass"));
        assert!(!valid_password("Secr3tpass_"));
        assert!(!valid_password(&format!("Aa1!{}", "x".repeat(61))));
    }

    #[test]
    fn bearer_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers), Some("abc.def"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("bearer xyz"));
        assert_eq!(bearer_token(&headers), Some("xyz"));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
