//! Login, refresh, logout and profile endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

use super::{error_response, extract_bearer_token, request_context, unauthorized, ErrorBody};
use crate::auth::{AuthService, AuthTokens, StaffProfile, StaffRole};

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub staff_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: StaffRole,
}

impl From<AuthTokens> for TokenResponse {
    fn from(tokens: AuthTokens) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: tokens.token_type.to_string(),
            expires_in: tokens.expires_in,
            staff_id: tokens.claims.staff_id,
            email: tokens.claims.sub,
            first_name: tokens.claims.first_name,
            last_name: tokens.claims.last_name,
            role: tokens.claims.role,
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = TokenResponse),
        (status = 400, description = "Missing payload", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 423, description = "Account temporarily locked", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers, payload))]
pub async fn login(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request("missing payload");
    };
    let ctx = request_context(&headers);
    let password = SecretString::from(request.password);

    match service.login(&request.email, &password, &ctx).await {
        Ok(tokens) => (StatusCode::OK, Json(TokenResponse::from(tokens))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenResponse),
        (status = 400, description = "Missing payload", body = ErrorBody),
        (status = 401, description = "Refresh token rejected", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers, payload))]
pub async fn refresh(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return bad_request("missing payload");
    };
    let ctx = request_context(&headers);

    match service.refresh(&request.refresh_token, &ctx).await {
        Ok(tokens) => (StatusCode::OK, Json(TokenResponse::from(tokens))).into_response(),
        Err(err) => error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session closed")
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers))]
pub async fn logout(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = extract_bearer_token(&headers) {
        service.logout(&token, &request_context(&headers));
    }
    StatusCode::NO_CONTENT.into_response()
}

#[utoipa::path(
    get,
    path = "/v1/auth/profile",
    responses(
        (status = 200, description = "Current staff profile", body = StaffProfile),
        (status = 401, description = "Missing or rejected token", body = ErrorBody)
    ),
    tag = "auth"
)]
#[instrument(skip(service, headers))]
pub async fn profile(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = extract_bearer_token(&headers) else {
        return unauthorized();
    };

    match service.profile(&token, &request_context(&headers)).await {
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(err) => error_response(&err),
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
