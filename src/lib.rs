//! # Staffgate (staff authentication and session lifecycle)
//!
//! `staffgate` verifies staff credentials, issues short-lived HS256 bearer
//! tokens and tracks which of them are live.
//!
//! ## Sessions
//!
//! A token is only accepted while its session entry exists in the registry.
//! Logout, administrative force-logout and the idle sweep all revoke tokens by
//! removing that entry, even before the embedded expiry.
//!
//! ## Lockout
//!
//! Consecutive failed logins are counted atomically in the credential store.
//! Reaching the threshold locks the account for a fixed duration and evicts
//! every live session of that account. Locks clear lazily at the next login or
//! through the periodic lock sweep.
//!
//! ## Roles
//!
//! Staff are `HOST`, `SERVER` or `MANAGER`; each role carries an explicit
//! permission set. Administrative session endpoints require `MANAGE_STAFF`.
//!
//! The database schema lives in `sql/schema.sql`.

pub mod auth;
pub mod cli;
pub mod staffgate;
pub mod storage;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
