//! PostgreSQL credential store and audit sink.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, Instrument};

use crate::auth::{
    audit::{AuditEvent, AuditSink},
    credentials::{normalize_email, CredentialRecord, CredentialStore, StoreFuture},
    role::StaffRole,
};

/// Events queued beyond this are dropped with an error rather than buffered.
pub const AUDIT_QUEUE_CAPACITY: usize = 1024;

const STAFF_COLUMNS: &str = "id, email, password_hash, role, first_name, last_name, is_active, \
     failed_login_attempts, account_locked_until, created_at";

#[derive(Clone, Debug)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn record_from_row(row: &PgRow) -> Result<CredentialRecord> {
    let role: String = row.try_get("role").context("missing role column")?;
    let failed: i32 = row
        .try_get("failed_login_attempts")
        .context("missing failed_login_attempts column")?;
    Ok(CredentialRecord {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: role.parse::<StaffRole>().map_err(|err| anyhow!(err))?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        active: row.try_get("is_active")?,
        failed_attempts: u32::try_from(failed).unwrap_or(0),
        locked_until: row.try_get("account_locked_until")?,
        created_at: row.try_get("created_at")?,
    })
}

impl CredentialStore for PgCredentialStore {
    fn find_by_identity<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<CredentialRecord>> {
        Box::pin(async move {
            // The schema keeps stored emails lowercase, so an exact match on the
            // normalized input uses the unique index.
            let query = format!("SELECT {STAFF_COLUMNS} FROM staff WHERE email = $1");
            let row = sqlx::query(&query)
                .bind(normalize_email(email))
                .fetch_optional(&self.pool)
                .instrument(db_span("SELECT", &query))
                .await
                .context("failed to look up staff account")?;
            row.as_ref().map(record_from_row).transpose()
        })
    }

    fn increment_failed_attempts(&self, id: i64) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let query = r"
                UPDATE staff
                SET failed_login_attempts = failed_login_attempts + 1
                WHERE id = $1
                RETURNING failed_login_attempts
            ";
            let row = sqlx::query(query)
                .bind(id)
                .fetch_optional(&self.pool)
                .instrument(db_span("UPDATE", query))
                .await
                .context("failed to increment failed login attempts")?
                .ok_or_else(|| anyhow!("no staff account with id {id}"))?;
            let count: i32 = row.try_get("failed_login_attempts")?;
            Ok(u32::try_from(count).unwrap_or(0))
        })
    }

    fn reset_failed_attempts(&self, id: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let query = r"
                UPDATE staff
                SET failed_login_attempts = 0, account_locked_until = NULL
                WHERE id = $1
            ";
            sqlx::query(query)
                .bind(id)
                .execute(&self.pool)
                .instrument(db_span("UPDATE", query))
                .await
                .context("failed to reset failed login attempts")?;
            Ok(())
        })
    }

    fn set_lock(&self, id: i64, until: Option<DateTime<Utc>>) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let query = "UPDATE staff SET account_locked_until = $2 WHERE id = $1";
            sqlx::query(query)
                .bind(id)
                .bind(until)
                .execute(&self.pool)
                .instrument(db_span("UPDATE", query))
                .await
                .context("failed to set account lock")?;
            Ok(())
        })
    }

    fn clear_elapsed_lock(&self, id: i64, now: DateTime<Utc>) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let query = r"
                UPDATE staff
                SET failed_login_attempts = 0, account_locked_until = NULL
                WHERE id = $1
                  AND account_locked_until IS NOT NULL
                  AND account_locked_until <= $2
            ";
            let result = sqlx::query(query)
                .bind(id)
                .bind(now)
                .execute(&self.pool)
                .instrument(db_span("UPDATE", query))
                .await
                .context("failed to clear elapsed account lock")?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn find_accounts_to_unlock(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<CredentialRecord>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {STAFF_COLUMNS} FROM staff \
                 WHERE account_locked_until IS NOT NULL AND account_locked_until <= $1"
            );
            let rows = sqlx::query(&query)
                .bind(now)
                .fetch_all(&self.pool)
                .instrument(db_span("SELECT", &query))
                .await
                .context("failed to list locked accounts")?;
            rows.iter().map(record_from_row).collect()
        })
    }
}

/// Audit sink that queues events and writes them to `audit_log` from a
/// background task, so recording never waits on the database. The queue is
/// bounded: while the database is slow or down, events past
/// [`AUDIT_QUEUE_CAPACITY`] are rejected instead of piling up in memory.
#[derive(Clone, Debug)]
pub struct PgAuditSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl PgAuditSink {
    /// Spawn the writer task on the current runtime.
    #[must_use]
    pub fn spawn(pool: PgPool) -> (Self, tokio::task::JoinHandle<()>) {
        let (sink, mut rx) = Self::with_capacity(AUDIT_QUEUE_CAPACITY);
        let writer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = insert_audit_event(&pool, &event).await {
                    error!(audit.kind = %event.kind, "failed to persist audit event: {err:#}");
                }
            }
            debug!("audit writer stopped");
        });
        (sink, writer)
    }

    fn with_capacity(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AuditSink for PgAuditSink {
    fn record(&self, event: AuditEvent) -> Result<()> {
        self.tx.try_send(event).map_err(|err| match err {
            TrySendError::Full(event) => anyhow!("audit queue is full, dropped {}", event.kind),
            TrySendError::Closed(_) => anyhow!("audit writer is not running"),
        })
    }
}

async fn insert_audit_event(pool: &PgPool, event: &AuditEvent) -> Result<()> {
    let query = r"
        INSERT INTO audit_log
            (action, staff_id, details, reason, ip_address, user_agent, request_id, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    ";
    sqlx::query(query)
        .bind(event.kind.as_str())
        .bind(event.subject_id)
        .bind(&event.detail)
        .bind(event.reason.map(|reason| reason.as_str()))
        .bind(event.context.ip.as_deref())
        .bind(event.context.user_agent.as_deref())
        .bind(event.context.request_id.as_deref())
        .bind(event.timestamp)
        .execute(pool)
        .instrument(db_span("INSERT", query))
        .await
        .context("failed to insert audit event")?;
    Ok(())
}
