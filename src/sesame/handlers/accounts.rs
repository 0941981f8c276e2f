use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::bearer_token;
use crate::sesame::{error::AuthError, store::AccountInfo, workflow::AccountService};

#[utoipa::path(
    get,
    path = "/accounts/me",
    responses (
        (status = 200, description = "Account of the bearer token holder", body = AccountInfo),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
    security(("bearer" = [])),
    tag = "accounts"
)]
#[instrument(skip_all)]
pub async fn me(headers: HeaderMap, service: Extension<Arc<AccountService>>) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };

    match service.account_info(token).await {
        Ok(info) => Json(info).into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sesame::handlers::test_support::{active_account, body_json, harness};
    use anyhow::Result;
    use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};

    #[tokio::test]
    async fn returns_public_fields_only() -> Result<()> {
        let mut h = harness()?;
        let token = active_account(&mut h, "alice01").await?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);

        let response = me(headers, Extension(h.service.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await?;
        assert_eq!(body["username"], "alice01");
        assert_eq!(body["is_active"], true);
        assert!(body.get("hashed_password").is_none());
        assert!(body.get("hash_salt").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn rejects_garbage_token() -> Result<()> {
        let h = harness()?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"));

        let response = me(headers, Extension(h.service.clone())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
