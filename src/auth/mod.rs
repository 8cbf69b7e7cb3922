//! Staff authentication and session lifecycle.
//!
//! [`AuthService`] composes the token codec, lockout policy and session
//! registry with the external credential store and audit sink.
//! [`MaintenanceScheduler`] runs the idle-session and lock sweeps.

pub mod audit;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod lockout;
pub mod maintenance;
pub mod role;
pub mod service;
pub mod session;
pub mod token;

pub use self::audit::{AuditEvent, AuditKind, AuditSink, LogAuditSink, MemoryAuditSink, RequestContext};
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::config::AuthConfig;
pub use self::credentials::{
    hash_password, Argon2Verifier, CredentialRecord, CredentialStore, PasswordVerifier,
};
pub use self::error::{AuthError, RejectReason};
pub use self::lockout::{LockoutPolicy, LockoutState};
pub use self::maintenance::{MaintenanceHandle, MaintenanceScheduler};
pub use self::role::{Permission, StaffRole};
pub use self::service::{AuthService, AuthTokens, StaffProfile};
pub use self::session::{
    RevokedFamilies, SessionEntry, SessionRegistry, SessionStatistics, ShardedSessionRegistry,
};
pub use self::token::{TokenClaims, TokenCodec, TokenError, TokenKind};
