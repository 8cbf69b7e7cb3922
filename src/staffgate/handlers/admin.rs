//! Session administration, restricted to roles with `MANAGE_STAFF`.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{error_response, extract_bearer_token, request_context, unauthorized, ErrorBody};
use crate::auth::{AuthService, Permission, RequestContext, SessionStatistics, TokenClaims};

#[derive(Debug, Serialize, ToSchema)]
pub struct ForceLogoutResponse {
    pub staff_id: i64,
    pub sessions_removed: usize,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionCountResponse {
    pub staff_id: i64,
    pub active_sessions: usize,
}

fn require_manager(
    service: &AuthService,
    headers: &HeaderMap,
    ctx: &RequestContext,
) -> Result<TokenClaims, Response> {
    let token = extract_bearer_token(headers).ok_or_else(unauthorized)?;
    service
        .authorize(&token, Permission::ManageStaff, ctx)
        .map_err(|err| error_response(&err))
}

#[utoipa::path(
    get,
    path = "/v1/admin/sessions/statistics",
    responses(
        (status = 200, description = "Live session totals", body = SessionStatistics),
        (status = 401, description = "Missing or rejected token", body = ErrorBody),
        (status = 403, description = "Caller may not manage staff", body = ErrorBody)
    ),
    tag = "admin"
)]
#[instrument(skip(service, headers))]
pub async fn session_statistics(
    Extension(service): Extension<Arc<AuthService>>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context(&headers);
    if let Err(response) = require_manager(&service, &headers, &ctx) {
        return response;
    }
    (StatusCode::OK, Json(service.session_statistics())).into_response()
}

#[utoipa::path(
    post,
    path = "/v1/admin/sessions/staff/{staff_id}/logout",
    params(("staff_id" = i64, Path, description = "Staff account id")),
    responses(
        (status = 200, description = "Sessions removed", body = ForceLogoutResponse),
        (status = 401, description = "Missing or rejected token", body = ErrorBody),
        (status = 403, description = "Caller may not manage staff", body = ErrorBody)
    ),
    tag = "admin"
)]
#[instrument(skip(service, headers))]
pub async fn force_logout(
    Extension(service): Extension<Arc<AuthService>>,
    Path(staff_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context(&headers);
    let admin = match require_manager(&service, &headers, &ctx) {
        Ok(claims) => claims,
        Err(response) => return response,
    };

    let sessions_removed = service.force_logout_staff(staff_id, &ctx);
    info!(admin = admin.staff_id, staff_id, sessions_removed, "force logout");

    (
        StatusCode::OK,
        Json(ForceLogoutResponse {
            staff_id,
            sessions_removed,
        }),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/v1/admin/sessions/staff/{staff_id}/count",
    params(("staff_id" = i64, Path, description = "Staff account id")),
    responses(
        (status = 200, description = "Live sessions for the account", body = SessionCountResponse),
        (status = 401, description = "Missing or rejected token", body = ErrorBody),
        (status = 403, description = "Caller may not manage staff", body = ErrorBody)
    ),
    tag = "admin"
)]
#[instrument(skip(service, headers))]
pub async fn session_count(
    Extension(service): Extension<Arc<AuthService>>,
    Path(staff_id): Path<i64>,
    headers: HeaderMap,
) -> Response {
    let ctx = request_context(&headers);
    if let Err(response) = require_manager(&service, &headers, &ctx) {
        return response;
    }
    (
        StatusCode::OK,
        Json(SessionCountResponse {
            staff_id,
            active_sessions: service.active_session_count(staff_id),
        }),
    )
        .into_response()
}
