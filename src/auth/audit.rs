//! Security audit events.
//!
//! Sinks are fire-and-forget: [`AuthService`](super::service::AuthService)
//! logs a failing sink at `warn` and carries on.

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use tracing::info;

use super::error::RejectReason;

/// Per-request metadata handed to every service call.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    LoginSuccess,
    LoginFailed,
    AccountLocked,
    AccountUnlocked,
    TokenRefresh,
    TokenRejected,
    Logout,
    SessionCreated,
    SessionExpired,
    SessionForceRemoved,
}

impl AuditKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "LOGIN_SUCCESS",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountUnlocked => "ACCOUNT_UNLOCKED",
            Self::TokenRefresh => "TOKEN_REFRESH",
            Self::TokenRejected => "TOKEN_REJECTED",
            Self::Logout => "LOGOUT",
            Self::SessionCreated => "SESSION_CREATED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionForceRemoved => "SESSION_FORCE_REMOVED",
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub subject_id: Option<i64>,
    pub detail: String,
    pub reason: Option<RejectReason>,
    pub timestamp: DateTime<Utc>,
    pub context: RequestContext,
}

impl AuditEvent {
    #[must_use]
    pub fn new(
        kind: AuditKind,
        subject_id: Option<i64>,
        detail: impl Into<String>,
        timestamp: DateTime<Utc>,
        context: &RequestContext,
    ) -> Self {
        Self {
            kind,
            subject_id,
            detail: detail.into(),
            reason: None,
            timestamp,
            context: context.clone(),
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: RejectReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

pub trait AuditSink: Send + Sync {
    /// Record one event. Errors are reported but never fail the caller.
    fn record(&self, event: AuditEvent) -> Result<()>;
}

/// Writes events to the tracing pipeline only.
#[derive(Clone, Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: AuditEvent) -> Result<()> {
        info!(
            audit.kind = %event.kind,
            audit.subject_id = ?event.subject_id,
            audit.reason = event.reason.map(RejectReason::as_str),
            audit.ip = event.context.ip.as_deref(),
            audit.request_id = event.context.request_id.as_deref(),
            "{}",
            event.detail
        );
        Ok(())
    }
}

/// Keeps every event in memory, for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    #[must_use]
    pub fn kinds(&self) -> Vec<AuditKind> {
        self.events.lock().iter().map(|event| event.kind).collect()
    }

    #[must_use]
    pub fn count(&self, kind: AuditKind) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
