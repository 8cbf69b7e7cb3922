#![allow(dead_code)]

use argon2::Params;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use staffgate::auth::{
    credentials::hash_password_with, Argon2Verifier, AuthConfig, AuthService, CredentialStore,
    ManualClock, MemoryAuditSink, RequestContext, StaffRole, TokenCodec,
};
use staffgate::storage::MemoryCredentialStore;
use std::sync::Arc;

pub const PASSWORD: &str = "correct horse battery staple";
const SECRET: &[u8] = b"integration-secret-integration-secret";

pub struct TestEnv {
    pub service: Arc<AuthService>,
    pub store: Arc<MemoryCredentialStore>,
    pub sink: Arc<MemoryAuditSink>,
    pub clock: Arc<ManualClock>,
    pub alice: i64,
    pub manager: i64,
}

pub fn t0() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}

fn fast_hash(password: &str) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    hash_password_with(password, params).unwrap()
}

pub fn env(config: AuthConfig) -> TestEnv {
    env_with_store(config, |store| store as Arc<dyn CredentialStore>)
}

/// Like [`env`], but the service talks to the store through `wrap`.
pub fn env_with_store(
    config: AuthConfig,
    wrap: impl FnOnce(Arc<MemoryCredentialStore>) -> Arc<dyn CredentialStore>,
) -> TestEnv {
    let store = Arc::new(MemoryCredentialStore::new());
    let hash = fast_hash(PASSWORD);
    let alice = store
        .add_staff("alice@example.com", &hash, StaffRole::Server, "Alice", "Doe")
        .id;
    let manager = store
        .add_staff("manager@example.com", &hash, StaffRole::Manager, "Morgan", "Lee")
        .id;

    let sink = Arc::new(MemoryAuditSink::new());
    let clock = Arc::new(ManualClock::new(t0()));
    let service = AuthService::new(
        config,
        TokenCodec::new(SECRET).unwrap(),
        wrap(store.clone()),
        Arc::new(Argon2Verifier),
    )
    .with_audit_sink(sink.clone())
    .with_clock(clock.clone());

    TestEnv {
        service: Arc::new(service),
        store,
        sink,
        clock,
        alice,
        manager,
    }
}

pub fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

pub fn ctx() -> RequestContext {
    RequestContext::new()
        .with_ip("192.0.2.10")
        .with_user_agent("integration-test")
}
