mod common;

use axum::{
    body::to_bytes,
    extract::{Extension, Path},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use common::{env, PASSWORD};
use serde_json::Value;
use staffgate::auth::{AuditKind, AuthConfig};
use staffgate::staffgate::handlers::{
    self,
    auth::{LoginRequest, RefreshRequest},
};

async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap_or_default();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
    headers.insert("x-request-id", HeaderValue::from_static("req-1"));
    headers
}

fn login_body(email: &str, password: &str) -> Option<Json<LoginRequest>> {
    Some(Json(LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }))
}

#[tokio::test]
async fn login_profile_logout_round() {
    let env = env(AuthConfig::default());

    let response = handlers::login(
        Extension(env.service.clone()),
        HeaderMap::new(),
        login_body("alice@example.com", PASSWORD),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);
    assert_eq!(body["role"], "SERVER");
    let access = body["access_token"].as_str().unwrap_or_default().to_string();

    let response = handlers::profile(Extension(env.service.clone()), bearer(&access)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["email"], "alice@example.com");
    assert_eq!(body["first_name"], "Alice");

    let response = handlers::logout(Extension(env.service.clone()), bearer(&access)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = handlers::profile(Extension(env.service.clone()), bearer(&access)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let logout = env
        .sink
        .events()
        .into_iter()
        .find(|event| event.kind == AuditKind::Logout);
    let ctx = logout.map(|event| event.context);
    assert_eq!(
        ctx.as_ref().and_then(|ctx| ctx.ip.as_deref()),
        Some("203.0.113.7")
    );
    assert_eq!(
        ctx.as_ref().and_then(|ctx| ctx.request_id.as_deref()),
        Some("req-1")
    );
}

#[tokio::test]
async fn login_failures_map_to_status_codes() {
    let env = env(AuthConfig::default().with_max_failed_attempts(2));

    let response = handlers::login(Extension(env.service.clone()), HeaderMap::new(), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = handlers::login(
        Extension(env.service.clone()),
        HeaderMap::new(),
        login_body("nobody@example.com", PASSWORD),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid credentials");

    let response = handlers::login(
        Extension(env.service.clone()),
        HeaderMap::new(),
        login_body("alice@example.com", "wrong"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = handlers::login(
        Extension(env.service.clone()),
        HeaderMap::new(),
        login_body("alice@example.com", "wrong"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::LOCKED);
    assert_eq!(
        body_json(response).await["error"],
        "account temporarily locked"
    );
}

#[tokio::test]
async fn refresh_endpoint_rotates_tokens() {
    let env = env(AuthConfig::default());
    let response = handlers::login(
        Extension(env.service.clone()),
        HeaderMap::new(),
        login_body("alice@example.com", PASSWORD),
    )
    .await;
    let body = body_json(response).await;
    let refresh_token = body["refresh_token"].as_str().unwrap_or_default().to_string();

    let response = handlers::refresh(
        Extension(env.service.clone()),
        HeaderMap::new(),
        Some(Json(RefreshRequest {
            refresh_token: refresh_token.clone(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = body_json(response).await;
    assert_ne!(rotated["access_token"], body["access_token"]);

    let response = handlers::refresh(
        Extension(env.service.clone()),
        HeaderMap::new(),
        Some(Json(RefreshRequest {
            refresh_token: "not.a.token".to_string(),
        })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_without_a_token_is_still_no_content() {
    let env = env(AuthConfig::default());
    let response = handlers::logout(Extension(env.service.clone()), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let response = handlers::logout(Extension(env.service.clone()), bearer("garbage")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admin_endpoints_require_manager_role() {
    let env = env(AuthConfig::default());

    let mut tokens = Vec::new();
    for email in ["alice@example.com", "manager@example.com"] {
        let response = handlers::login(
            Extension(env.service.clone()),
            HeaderMap::new(),
            login_body(email, PASSWORD),
        )
        .await;
        let body = body_json(response).await;
        tokens.push(body["access_token"].as_str().unwrap_or_default().to_string());
    }
    let (server, manager) = (tokens[0].clone(), tokens[1].clone());

    let response =
        handlers::session_statistics(Extension(env.service.clone()), HeaderMap::new()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response =
        handlers::session_statistics(Extension(env.service.clone()), bearer(&server)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response =
        handlers::session_statistics(Extension(env.service.clone()), bearer(&manager)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_sessions"], 2);
    assert_eq!(body["distinct_owners"], 2);

    let response = handlers::session_count(
        Extension(env.service.clone()),
        Path(env.alice),
        bearer(&manager),
    )
    .await;
    assert_eq!(body_json(response).await["active_sessions"], 1);

    let response = handlers::force_logout(
        Extension(env.service.clone()),
        Path(env.alice),
        bearer(&manager),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["sessions_removed"], 1);

    let response = handlers::profile(Extension(env.service.clone()), bearer(&server)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_reports_name_and_version() {
    let response = handlers::health().await.into_response();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["name"], env!("CARGO_PKG_NAME"));
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
