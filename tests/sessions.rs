mod common;

use chrono::TimeDelta;
use common::{ctx, env, secret, PASSWORD};
use staffgate::auth::{
    AuditKind, AuthConfig, AuthError, MaintenanceScheduler, Permission, SessionStatistics,
    TokenKind,
};
use std::sync::Arc;

#[tokio::test]
async fn login_then_logout_tracks_statistics() -> anyhow::Result<()> {
    let env = env(AuthConfig::default());

    let tokens = env
        .service
        .login("Alice@Example.com ", &secret(PASSWORD), &ctx())
        .await?;
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.expires_in, 900);
    assert_eq!(tokens.claims.kind, TokenKind::Access);
    assert_eq!(tokens.claims.sub, "alice@example.com");
    assert_eq!(
        env.service.session_statistics(),
        SessionStatistics {
            total_sessions: 1,
            distinct_owners: 1,
        }
    );

    env.service.logout(&tokens.access_token, &ctx());
    assert_eq!(env.service.session_statistics(), SessionStatistics::default());
    assert!(matches!(
        env.service.validate(&tokens.access_token, &ctx()),
        Err(AuthError::InvalidCredentials)
    ));

    // Second logout with the same token is silent.
    env.service.logout(&tokens.access_token, &ctx());
    assert_eq!(env.sink.count(AuditKind::Logout), 2);
    Ok(())
}

#[tokio::test]
async fn every_login_gets_its_own_session() -> anyhow::Result<()> {
    let env = env(AuthConfig::default());
    let first = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;
    let second = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;
    env.service
        .login("manager@example.com", &secret(PASSWORD), &ctx())
        .await?;

    assert_ne!(first.claims.sid, second.claims.sid);
    assert_eq!(env.service.active_session_count(env.alice), 2);
    assert_eq!(
        env.service.session_statistics(),
        SessionStatistics {
            total_sessions: 3,
            distinct_owners: 2,
        }
    );
    Ok(())
}

#[tokio::test]
async fn force_logout_ends_only_the_target_sessions() -> anyhow::Result<()> {
    let env = env(AuthConfig::default());
    let alice_a = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;
    let alice_b = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;
    let manager = env
        .service
        .login("manager@example.com", &secret(PASSWORD), &ctx())
        .await?;

    assert_eq!(env.service.force_logout_staff(env.alice, &ctx()), 2);
    assert_eq!(env.service.force_logout_staff(env.alice, &ctx()), 0);

    assert!(env.service.validate(&alice_a.access_token, &ctx()).is_err());
    assert!(env.service.validate(&alice_b.access_token, &ctx()).is_err());
    assert!(env.service.validate(&manager.access_token, &ctx()).is_ok());
    assert_eq!(env.sink.count(AuditKind::SessionForceRemoved), 1);
    Ok(())
}

#[tokio::test]
async fn idle_sessions_are_swept_and_active_ones_survive() -> anyhow::Result<()> {
    let env = env(
        AuthConfig::default()
            .with_access_ttl_seconds(3600)
            .with_session_idle_timeout_seconds(30 * 60),
    );
    let idle = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;
    let busy = env
        .service
        .login("manager@example.com", &secret(PASSWORD), &ctx())
        .await?;

    env.clock.advance(TimeDelta::minutes(20));
    env.service.validate(&busy.access_token, &ctx())?;

    env.clock.advance(TimeDelta::minutes(11));
    assert_eq!(env.service.expire_idle_sessions(), 1);

    assert!(env.service.validate(&idle.access_token, &ctx()).is_err());
    assert_eq!(env.service.active_session_count(env.alice), 0);
    assert_eq!(env.service.active_session_count(env.manager), 1);
    assert_eq!(env.sink.count(AuditKind::SessionExpired), 1);
    Ok(())
}

#[tokio::test]
async fn refresh_replaces_the_session() -> anyhow::Result<()> {
    let env = env(AuthConfig::default());
    let original = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;

    env.clock.advance(TimeDelta::minutes(5));
    let rotated = env.service.refresh(&original.refresh_token, &ctx()).await?;

    assert_ne!(rotated.claims.sid, original.claims.sid);
    assert!(env.service.validate(&original.access_token, &ctx()).is_err());
    assert!(env.service.validate(&rotated.access_token, &ctx()).is_ok());
    assert_eq!(env.service.active_session_count(env.alice), 1);

    // The access token is never accepted where a refresh token is expected.
    assert!(env
        .service
        .refresh(&rotated.access_token, &ctx())
        .await
        .is_err());
    Ok(())
}

#[tokio::test]
async fn ended_sessions_cannot_be_revived_by_refresh() -> anyhow::Result<()> {
    let env = env(AuthConfig::default());
    let first = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;
    let rotated = env.service.refresh(&first.refresh_token, &ctx()).await?;

    // A refresh token is spent once it has been exchanged.
    assert!(matches!(
        env.service.refresh(&first.refresh_token, &ctx()).await,
        Err(AuthError::InvalidCredentials)
    ));

    assert_eq!(env.service.force_logout_staff(env.alice, &ctx()), 1);
    assert!(matches!(
        env.service.refresh(&rotated.refresh_token, &ctx()).await,
        Err(AuthError::InvalidCredentials)
    ));
    assert_eq!(env.service.active_session_count(env.alice), 0);

    // A fresh login is unaffected.
    let again = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;
    assert!(env.service.refresh(&again.refresh_token, &ctx()).await.is_ok());
    Ok(())
}

#[tokio::test]
async fn expired_access_token_is_rejected_even_with_a_live_session() -> anyhow::Result<()> {
    let env = env(
        AuthConfig::default()
            .with_access_ttl_seconds(60)
            .with_session_idle_timeout_seconds(3600),
    );
    let tokens = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;

    env.clock.advance(TimeDelta::seconds(61));
    assert!(matches!(
        env.service.validate(&tokens.access_token, &ctx()),
        Err(AuthError::InvalidCredentials)
    ));
    Ok(())
}

#[tokio::test]
async fn roles_gate_administration() -> anyhow::Result<()> {
    let env = env(AuthConfig::default());
    let server = env
        .service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;
    let manager = env
        .service
        .login("manager@example.com", &secret(PASSWORD), &ctx())
        .await?;

    assert!(matches!(
        env.service
            .authorize(&server.access_token, Permission::ManageStaff, &ctx()),
        Err(AuthError::AccessDenied)
    ));
    let claims = env
        .service
        .authorize(&manager.access_token, Permission::ManageStaff, &ctx())?;
    assert_eq!(claims.staff_id, env.manager);
    Ok(())
}

#[tokio::test]
async fn profile_reflects_the_account() -> anyhow::Result<()> {
    let env = env(AuthConfig::default());
    let tokens = env
        .service
        .login("manager@example.com", &secret(PASSWORD), &ctx())
        .await?;
    let profile = env.service.profile(&tokens.access_token, &ctx()).await?;
    assert_eq!(profile.staff_id, env.manager);
    assert_eq!(profile.email, "manager@example.com");

    env.store.set_active(env.manager, false);
    assert!(env
        .service
        .profile(&tokens.access_token, &ctx())
        .await
        .is_err());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scheduler_sweeps_idle_sessions_in_the_background() -> anyhow::Result<()> {
    let config = AuthConfig::default()
        .with_session_idle_timeout_seconds(60)
        .with_session_sweep_interval_seconds(30);
    let env = env(config);
    env.service
        .login("alice@example.com", &secret(PASSWORD), &ctx())
        .await?;

    let handle = MaintenanceScheduler::new(Arc::clone(&env.service), &config).spawn();
    tokio::task::yield_now().await;
    assert_eq!(env.service.active_session_count(env.alice), 1);

    env.clock.advance(TimeDelta::seconds(61));
    tokio::time::sleep(std::time::Duration::from_secs(31)).await;
    tokio::task::yield_now().await;

    assert_eq!(env.service.active_session_count(env.alice), 0);
    assert!(handle.is_running());
    handle.shutdown();
    Ok(())
}
