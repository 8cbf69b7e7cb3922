//! Credential store and audit sink adapters.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryCredentialStore;
pub use self::postgres::{PgAuditSink, PgCredentialStore};
