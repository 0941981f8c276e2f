use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{bearer_token, reject};
use crate::sesame::{
    error::AuthError,
    store::{NewProfile, Profile},
    workflow::AccountService,
};

const NAME_MAX_LEN: usize = 64;

fn valid_name(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty() && name.chars().count() <= NAME_MAX_LEN
}

fn normalize(profile: NewProfile) -> Result<NewProfile, &'static str> {
    if !valid_name(&profile.first_name) || !valid_name(&profile.last_name) {
        return Err("first and last name are required (at most 64 characters)");
    }

    let middle_name = profile
        .middle_name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty());
    if middle_name.as_deref().is_some_and(|name| !valid_name(name)) {
        return Err("middle name is too long");
    }

    let gender = match profile.gender.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(g) if g.eq_ignore_ascii_case("m") => Some("m".to_string()),
        Some(g) if g.eq_ignore_ascii_case("f") => Some("f".to_string()),
        Some(_) => return Err("gender must be m or f"),
    };

    Ok(NewProfile {
        first_name: profile.first_name.trim().to_string(),
        middle_name,
        last_name: profile.last_name.trim().to_string(),
        gender,
        birthday: profile.birthday,
    })
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = NewProfile,
    responses (
        (status = 201, description = "Profile created", body = Profile),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 409, description = "Profile already exists for this account"),
        (status = 422, description = "Malformed profile"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn create(
    headers: HeaderMap,
    service: Extension<Arc<AccountService>>,
    payload: Option<Json<NewProfile>>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };
    let Some(Json(profile)) = payload else {
        return reject(StatusCode::BAD_REQUEST, "Missing payload");
    };
    let profile = match normalize(profile) {
        Ok(profile) => profile,
        Err(detail) => return reject(StatusCode::UNPROCESSABLE_ENTITY, detail),
    };

    match service.create_profile(token, profile).await {
        Ok(profile) => (StatusCode::CREATED, Json(profile)).into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/users",
    responses (
        (status = 200, description = "Profile of the signed-in account", body = Profile),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "No profile yet"),
    ),
    security(("bearer" = [])),
    tag = "users"
)]
#[instrument(skip_all)]
pub async fn show(headers: HeaderMap, service: Extension<Arc<AccountService>>) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    match service.profile(token).await {
        Ok(profile) => Json(profile).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sesame::handlers::test_support::{active_account, body_json, harness};
    use anyhow::Result;
    use axum::http::{header::AUTHORIZATION, HeaderValue};
    use chrono::NaiveDate;

    fn profile(gender: Option<&str>) -> NewProfile {
        NewProfile {
            first_name: " Alice ".to_string(),
            middle_name: Some(String::new()),
            last_name: "Liddell".to_string(),
            gender: gender.map(ToString::to_string),
            birthday: NaiveDate::from_ymd_opt(1990, 5, 4),
        }
    }

    #[test]
    fn normalize_trims_and_checks() {
        let normalized = normalize(profile(Some("F")));
        assert!(normalized.is_ok());
        if let Ok(normalized) = normalized {
            assert_eq!(normalized.first_name, "Alice");
            assert_eq!(normalized.middle_name, None);
            assert_eq!(normalized.gender.as_deref(), Some("f"));
        }

        assert!(normalize(profile(Some("x"))).is_err());

        let mut blank = profile(None);
        blank.last_name = "  ".to_string();
        assert!(normalize(blank).is_err());
    }

    #[tokio::test]
    async fn second_profile_conflicts() -> Result<()> {
        let mut h = harness()?;
        let token = active_account(&mut h, "alice01").await?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);

        let response = create(
            headers.clone(),
            Extension(h.service.clone()),
            Some(Json(profile(Some("f")))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await?;
        assert_eq!(body["first_name"], "Alice");
        assert_eq!(body["birthday"], "1990-05-04");

        let response = create(
            headers,
            Extension(h.service.clone()),
            Some(Json(profile(None))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        Ok(())
    }

    #[tokio::test]
    async fn requires_bearer_token() -> Result<()> {
        let h = harness()?;
        let response = create(
            HeaderMap::new(),
            Extension(h.service.clone()),
            Some(Json(profile(None))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = show(HeaderMap::new(), Extension(h.service.clone())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn show_returns_created_profile() -> Result<()> {
        let mut h = harness()?;
        let token = active_account(&mut h, "alice01").await?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);

        let response = show(headers.clone(), Extension(h.service.clone())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await?["detail"], "profile not found");

        let response = create(
            headers.clone(),
            Extension(h.service.clone()),
            Some(Json(profile(Some("f")))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = show(headers, Extension(h.service.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        assert_eq!(body["first_name"], "Alice");
        assert_eq!(body["gender"], "f");
        Ok(())
    }
}
