use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};

use super::{
    bearer_token, reject, valid_email, valid_password, valid_phone_number, valid_username, Message,
};
use crate::sesame::{
    error::{AuthError, Entity, SIGNIN_FAILED},
    workflow::{AccountService, Signup},
};

const INVALID_PASSWORD: &str = "password must be 8 to 64 characters long and contain a lowercase \
    letter, an uppercase letter, a digit and a special character";
const PASSWORD_MISMATCH: &str = "new passwords do not match";

#[derive(ToSchema, Deserialize)]
pub struct SignupRequest {
    username: String,
    email: String,
    phone_number: Option<String>,
    password: String,
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("phone_number", &self.phone_number)
            .field("password", &"***")
            .finish()
    }
}

#[derive(ToSchema, Deserialize)]
pub struct SigninRequest {
    username: String,
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccessToken {
    pub token_type: String,
    pub access_token: String,
}

#[derive(IntoParams, Deserialize, Debug)]
#[into_params(parameter_in = Query)]
pub struct ActivateQuery {
    /// Key from the activation email
    key: String,
}

#[derive(ToSchema, Deserialize)]
pub struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
    repeat_new_password: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    email: String,
}

#[derive(ToSchema, Deserialize)]
pub struct ResetPasswordRequest {
    key: String,
    new_password: String,
    repeat_new_password: String,
}

/// Shared checks for a new password and its confirmation.
fn check_new_password(new_password: &str, repeat: &str) -> Result<(), Response> {
    if new_password != repeat {
        return Err(reject(StatusCode::PRECONDITION_FAILED, PASSWORD_MISMATCH));
    }
    if !valid_password(new_password) {
        return Err(reject(StatusCode::UNPROCESSABLE_ENTITY, INVALID_PASSWORD));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses (
        (status = 201, description = "Account created, activation email queued", body = Message),
        (status = 400, description = "Username, email or phone number already taken"),
        (status = 422, description = "Malformed signup data"),
    ),
    tag = "auth"
)]
#[instrument(skip(service))]
pub async fn signup(
    service: Extension<Arc<AccountService>>,
    payload: Option<Json<SignupRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return reject(StatusCode::BAD_REQUEST, "Missing payload");
    };

    if !valid_username(&request.username) {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, "invalid username");
    }
    if !valid_email(&request.email) {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, "invalid email");
    }
    if !valid_password(&request.password) {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, INVALID_PASSWORD);
    }

    let phone_number = request
        .phone_number
        .map(|phone| phone.trim().to_string())
        .filter(|phone| !phone.is_empty());
    if phone_number.as_deref().is_some_and(|phone| !valid_phone_number(phone)) {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, "invalid phone number");
    }

    let signup = Signup {
        username: request.username,
        email: request.email.trim().to_lowercase(),
        phone_number,
        password: request.password,
    };

    match service.signup(signup).await {
        Ok(_) => (
            StatusCode::CREATED,
            Message::new("account created! please check your email to activate it."),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/signin",
    request_body = SigninRequest,
    responses (
        (status = 200, description = "Bearer token issued", body = AccessToken),
        (status = 400, description = "Unknown user, wrong password or inactive account"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn signin(
    service: Extension<Arc<AccountService>>,
    payload: Option<Json<SigninRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return reject(StatusCode::BAD_REQUEST, "Missing payload");
    };

    match service.signin(&request.username, &request.password).await {
        Ok(access_token) => Json(AccessToken {
            token_type: "bearer".to_string(),
            access_token,
        })
        .into_response(),
        Err(AuthError::NotFound(Entity::Account) | AuthError::CredentialMismatch) => {
            debug!("signin rejected");
            reject(StatusCode::BAD_REQUEST, SIGNIN_FAILED)
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/auth/activate",
    params(ActivateQuery),
    responses (
        (status = 200, description = "Account activated", body = Message),
        (status = 400, description = "Validation key expired or invalid"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn activate(
    service: Extension<Arc<AccountService>>,
    query: Option<Query<ActivateQuery>>,
) -> Response {
    let Some(Query(query)) = query else {
        return AuthError::NotFound(Entity::ValidationKey).into_response();
    };

    match service.activate(query.key.trim()).await {
        Ok(_) => Message::new("account activated! you can now sign in.").into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/password",
    request_body = ChangePasswordRequest,
    responses (
        (status = 200, description = "Password changed", body = Message),
        (status = 400, description = "Current password does not match or account inactive"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 412, description = "New passwords do not match"),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn change_password(
    headers: HeaderMap,
    service: Extension<Arc<AccountService>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return AuthError::InvalidToken.into_response();
    };
    let Some(Json(request)) = payload else {
        return reject(StatusCode::BAD_REQUEST, "Missing payload");
    };
    if let Err(response) = check_new_password(&request.new_password, &request.repeat_new_password)
    {
        return response;
    }

    match service
        .change_password(token, &request.current_password, &request.new_password)
        .await
    {
        Ok(_) => Message::new("password updated!").into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses (
        (status = 202, description = "Reset email queued when the account exists", body = Message),
        (status = 404, description = "No account for this email (reveal policy only)"),
    ),
    tag = "auth"
)]
#[instrument(skip(service))]
pub async fn forgot_password(
    service: Extension<Arc<AccountService>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return reject(StatusCode::BAD_REQUEST, "Missing payload");
    };
    let email = request.email.trim().to_lowercase();
    if !valid_email(&email) {
        return reject(StatusCode::UNPROCESSABLE_ENTITY, "invalid email");
    }

    match service.forgot_password(&email).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Message::new("if the account exists, a password reset email is on its way."),
        )
            .into_response(),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses (
        (status = 200, description = "Password reset", body = Message),
        (status = 400, description = "Validation key expired or invalid"),
        (status = 412, description = "New passwords do not match"),
    ),
    tag = "auth"
)]
#[instrument(skip_all)]
pub async fn reset_password(
    service: Extension<Arc<AccountService>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return reject(StatusCode::BAD_REQUEST, "Missing payload");
    };
    if let Err(response) = check_new_password(&request.new_password, &request.repeat_new_password)
    {
        return response;
    }

    match service
        .reset_password(request.key.trim(), &request.new_password)
        .await
    {
        Ok(_) => Message::new("password reset! you can now sign in.").into_response(),
        Err(err) => err.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sesame::handlers::test_support::{active_account, body_json, harness, PASSWORD};
    use anyhow::Result;
    use axum::http::{header::AUTHORIZATION, HeaderValue};

    fn signup_request(username: &str, email: &str, password: &str) -> Json<SignupRequest> {
        Json(SignupRequest {
            username: username.to_string(),
            email: email.to_string(),
            phone_number: None,
            password: password.to_string(),
        })
    }

    fn bearer(token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
        Ok(headers)
    }

    #[tokio::test]
    async fn signup_creates_account_and_queues_mail() -> Result<()> {
        let mut h = harness()?;
        let response = signup(
            Extension(h.service.clone()),
            Some(signup_request("alice01", "Alice@Example.com", PASSWORD)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(h.store.account_count().await, 1);

        let mail = h.outbox.try_recv()?;
        assert_eq!(mail.to, "alice@example.com");
        assert!(mail.text.contains("/auth/activate?key="));
        Ok(())
    }

    #[tokio::test]
    async fn signup_rejects_bad_input() -> Result<()> {
        let h = harness()?;
        let service = Extension(h.service.clone());

        let response = signup(service.clone(), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = signup(
            service.clone(),
            Some(signup_request("bob", "bob@example.com", PASSWORD)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = signup(
            service.clone(),
            Some(signup_request("bob0001", "bob-at-example", PASSWORD)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = signup(
            service,
            Some(signup_request("bob0001", "bob@example.com", "weakpass")),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        assert_eq!(h.store.account_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn signup_rejects_oversized_fields() -> Result<()> {
        let h = harness()?;
        let service = Extension(h.service.clone());

        let mut request = signup_request("carol01", "carol@example.com", PASSWORD);
        request.phone_number = Some("12345678901234567".to_string());
        let response = signup(service.clone(), Some(request)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await?["detail"], "invalid phone number");

        let email = format!("{}@example.com", "c".repeat(300));
        let response = signup(
            service.clone(),
            Some(signup_request("carol01", &email, PASSWORD)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await?["detail"], "invalid email");
        assert_eq!(h.store.account_count().await, 0);

        let mut request = signup_request("carol01", "carol@example.com", PASSWORD);
        request.phone_number = Some(" +441234567890 ".to_string());
        let response = signup(service, Some(request)).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_username_names_the_field() -> Result<()> {
        let h = harness()?;
        let service = Extension(h.service.clone());
        signup(
            service.clone(),
            Some(signup_request("alice01", "alice@example.com", PASSWORD)),
        )
        .await;

        let response = signup(
            service,
            Some(signup_request("alice01", "other@example.com", PASSWORD)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await?;
        assert_eq!(
            body["detail"],
            "username alice01 is taken! Please choose a different one!"
        );
        Ok(())
    }

    #[tokio::test]
    async fn signin_failures_share_one_message() -> Result<()> {
        let mut h = harness()?;
        active_account(&mut h, "alice01").await?;
        let service = Extension(h.service.clone());

        let unknown = signin(
            service.clone(),
            Some(Json(SigninRequest {
                username: "nobody1".to_string(),
                password: PASSWORD.to_string(),
            })),
        )
        .await;
        let wrong = signin(
            service,
            Some(Json(SigninRequest {
                username: "alice01".to_string(),
                password: "Wr0ng!pass".to_string(),
            })),
        )
        .await;

        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
        assert_eq!(wrong.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(unknown).await?, body_json(wrong).await?);
        Ok(())
    }

    #[tokio::test]
    async fn signin_returns_bearer_token() -> Result<()> {
        let mut h = harness()?;
        active_account(&mut h, "alice01").await?;

        let response = signin(
            Extension(h.service.clone()),
            Some(Json(SigninRequest {
                username: "alice01".to_string(),
                password: PASSWORD.to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await?;
        assert_eq!(body["token_type"], "bearer");
        let token = body["access_token"].as_str().unwrap_or_default();
        assert_eq!(h.service.tokens().verify(token)?.username, "alice01");
        Ok(())
    }

    #[tokio::test]
    async fn activate_with_unknown_key() -> Result<()> {
        let h = harness()?;
        let response = activate(
            Extension(h.service.clone()),
            Some(Query(ActivateQuery {
                key: "unknown".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await?;
        assert_eq!(body["detail"], "validation key expired or invalid");
        Ok(())
    }

    #[tokio::test]
    async fn change_password_requires_matching_repeat() -> Result<()> {
        let mut h = harness()?;
        let token = active_account(&mut h, "alice01").await?;

        let response = change_password(
            bearer(&token)?,
            Extension(h.service.clone()),
            Some(Json(ChangePasswordRequest {
                current_password: PASSWORD.to_string(),
                new_password: "N3w!password".to_string(),
                repeat_new_password: "N3w!passw0rd".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PRECONDITION_FAILED);

        let response = change_password(
            bearer(&token)?,
            Extension(h.service.clone()),
            Some(Json(ChangePasswordRequest {
                current_password: PASSWORD.to_string(),
                new_password: "N3w!password".to_string(),
                repeat_new_password: "N3w!password".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.service.signin("alice01", "N3w!password").await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn change_password_rejects_wrong_current_password() -> Result<()> {
        let mut h = harness()?;
        let token = active_account(&mut h, "alice01").await?;

        let response = change_password(
            bearer(&token)?,
            Extension(h.service.clone()),
            Some(Json(ChangePasswordRequest {
                current_password: "Wr0ng!pass".to_string(),
                new_password: "N3w!password".to_string(),
                repeat_new_password: "N3w!password".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await?;
        assert_eq!(body["detail"], "current password is wrong!");
        assert!(h.service.signin("alice01", PASSWORD).await.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn change_password_without_token() -> Result<()> {
        let h = harness()?;
        let response = change_password(
            HeaderMap::new(),
            Extension(h.service.clone()),
            Some(Json(ChangePasswordRequest {
                current_password: PASSWORD.to_string(),
                new_password: "N3w!password".to_string(),
                repeat_new_password: "N3w!password".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key("www-authenticate"));
        Ok(())
    }

    #[tokio::test]
    async fn forgot_password_is_accepted_for_unknown_email() -> Result<()> {
        let mut h = harness()?;
        let response = forgot_password(
            Extension(h.service.clone()),
            Some(Json(ForgotPasswordRequest {
                email: "ghost@example.com".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(h.outbox.try_recv().is_err());
        Ok(())
    }

    #[tokio::test]
    async fn reset_password_flow() -> Result<()> {
        let mut h = harness()?;
        active_account(&mut h, "alice01").await?;

        let response = forgot_password(
            Extension(h.service.clone()),
            Some(Json(ForgotPasswordRequest {
                email: "alice01@example.com".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let mail = h.outbox.try_recv()?;
        let key = mail
            .text
            .split("?key=")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .unwrap_or_default()
            .to_string();

        let response = reset_password(
            Extension(h.service.clone()),
            Some(Json(ResetPasswordRequest {
                key: key.clone(),
                new_password: "R3set!pass".to_string(),
                repeat_new_password: "R3set!pass".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = reset_password(
            Extension(h.service.clone()),
            Some(Json(ResetPasswordRequest {
                key,
                new_password: "An0ther!pass".to_string(),
                repeat_new_password: "An0ther!pass".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.service.signin("alice01", "R3set!pass").await.is_ok());
        Ok(())
    }
}
