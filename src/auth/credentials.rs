//! Credential records and the collaborators that own them.

use anyhow::{anyhow, Result};
use argon2::{
    password_hash::SaltString, Algorithm, Argon2, Params, PasswordHash, PasswordHasher,
    PasswordVerifier as _, Version,
};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use regex::Regex;
use serde::Serialize;
use std::{future::Future, pin::Pin};
use tracing::warn;

use super::role::StaffRole;

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// One staff account as the credential store holds it.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CredentialRecord {
    pub id: i64,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: StaffRole,
    pub first_name: String,
    pub last_name: String,
    pub active: bool,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("active", &self.active)
            .field("failed_attempts", &self.failed_attempts)
            .field("locked_until", &self.locked_until)
            .finish_non_exhaustive()
    }
}

/// Persistence for credential records.
///
/// `increment_failed_attempts` must be atomic per account: concurrent failures
/// against one account must each be counted.
pub trait CredentialStore: Send + Sync {
    fn find_by_identity<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<CredentialRecord>>;

    /// Returns the counter value after the increment.
    fn increment_failed_attempts(&self, id: i64) -> StoreFuture<'_, u32>;

    /// Zero the counter and clear any lock.
    fn reset_failed_attempts(&self, id: i64) -> StoreFuture<'_, ()>;

    fn set_lock(&self, id: i64, until: Option<DateTime<Utc>>) -> StoreFuture<'_, ()>;

    /// Zero the counter and clear the lock only if the lock expiry is at or
    /// before `now`, as one atomic step. Returns false when there was nothing
    /// elapsed to clear, including when a newer lock has been set since the
    /// caller read the record.
    fn clear_elapsed_lock(&self, id: i64, now: DateTime<Utc>) -> StoreFuture<'_, bool>;

    /// Accounts whose lock expiry is at or before `now`.
    fn find_accounts_to_unlock(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<CredentialRecord>>;
}

pub trait PasswordVerifier: Send + Sync {
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

/// Verifies PHC-formatted Argon2 hashes.
#[derive(Clone, Debug, Default)]
pub struct Argon2Verifier;

impl PasswordVerifier for Argon2Verifier {
    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            warn!("stored password hash is not a valid PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Hash a password with Argon2id and default parameters.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(plaintext: &str) -> Result<String> {
    hash_password_with(plaintext, Params::default())
}

/// Hash a password with explicit Argon2id parameters.
///
/// # Errors
/// Returns an error if the parameters are rejected or hashing fails.
pub fn hash_password_with(plaintext: &str, params: Params) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let hash = argon2
        .hash_password(plaintext.as_bytes(), &salt)
        .map_err(|err| anyhow!("failed to hash password: {err}"))?
        .to_string();
    Ok(hash)
}

#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}
