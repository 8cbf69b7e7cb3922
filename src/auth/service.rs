//! Login, refresh, logout and profile flows for staff accounts.
//!
//! Every rejection is audited with its specific [`RejectReason`]; callers only
//! ever see the coarse [`AuthError`] kinds.

use anyhow::Context;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    audit::{AuditEvent, AuditKind, AuditSink, LogAuditSink, RequestContext},
    clock::{Clock, SystemClock},
    config::AuthConfig,
    credentials::{normalize_email, valid_email, CredentialRecord, CredentialStore, PasswordVerifier},
    error::{AuthError, RejectReason},
    lockout::{LockoutPolicy, LockoutState},
    role::Permission,
    session::{
        RevokedFamilies, SessionEntry, SessionRegistry, SessionStatistics, ShardedSessionRegistry,
        TouchOutcome,
    },
    token::{TokenClaims, TokenCodec, TokenKind},
};

pub const TOKEN_TYPE: &str = "Bearer";

/// Token pair handed out by login and refresh.
#[derive(Clone, Debug, Serialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub claims: TokenClaims,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct StaffProfile {
    pub staff_id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: super::role::StaffRole,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&CredentialRecord> for StaffProfile {
    fn from(record: &CredentialRecord) -> Self {
        Self {
            staff_id: record.id,
            email: record.email.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            role: record.role,
            active: record.active,
            created_at: record.created_at,
        }
    }
}

pub struct AuthService {
    config: AuthConfig,
    codec: TokenCodec,
    lockout: LockoutPolicy,
    sessions: Arc<dyn SessionRegistry>,
    revoked: RevokedFamilies,
    credentials: Arc<dyn CredentialStore>,
    verifier: Arc<dyn PasswordVerifier>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("config", &self.config)
            .field("lockout", &self.lockout)
            .finish_non_exhaustive()
    }
}

impl AuthService {
    /// Service with an in-process sharded registry, a tracing audit sink and
    /// the system clock.
    #[must_use]
    pub fn new(
        config: AuthConfig,
        codec: TokenCodec,
        credentials: Arc<dyn CredentialStore>,
        verifier: Arc<dyn PasswordVerifier>,
    ) -> Self {
        let config = config.normalize();
        Self {
            lockout: config.lockout_policy(),
            config,
            codec,
            sessions: Arc::new(ShardedSessionRegistry::new()),
            revoked: RevokedFamilies::new(),
            credentials,
            verifier,
            audit: Arc::new(LogAuditSink),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionRegistry>) -> Self {
        self.sessions = sessions;
        self
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Authenticate with email and password and open a new session.
    ///
    /// # Errors
    /// `AccountLocked` while the account is locked, including for the failure
    /// that crosses the threshold; `InvalidCredentials` for every other
    /// rejection; `Internal` when the credential store fails.
    #[instrument(skip(self, password, ctx), fields(request_id = ctx.request_id.as_deref()))]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
        ctx: &RequestContext,
    ) -> Result<AuthTokens, AuthError> {
        let now = self.clock.now();
        let email = normalize_email(email);

        let record = if valid_email(&email) {
            self.credentials.find_by_identity(&email).await?
        } else {
            None
        };

        let Some(record) = record else {
            self.login_failed(None, RejectReason::UnknownIdentity, "unknown identity", now, ctx);
            return Err(AuthError::InvalidCredentials);
        };

        if !record.active {
            self.login_failed(Some(record.id), RejectReason::Deactivated, "account deactivated", now, ctx);
            return Err(AuthError::InvalidCredentials);
        }

        match self.lockout.state(record.locked_until, now) {
            LockoutState::Locked { until } => {
                self.login_failed(
                    Some(record.id),
                    RejectReason::Locked,
                    &format!("account locked until {until}"),
                    now,
                    ctx,
                );
                return Err(AuthError::AccountLocked);
            }
            LockoutState::Active if record.locked_until.is_some() => {
                // Only the request that actually clears the elapsed lock resets
                // the counter; others that read the same stale record must not
                // wipe failures counted since.
                if self.credentials.clear_elapsed_lock(record.id, now).await? {
                    self.audit(AuditEvent::new(
                        AuditKind::AccountUnlocked,
                        Some(record.id),
                        "lock elapsed, cleared at login",
                        now,
                        ctx,
                    ));
                }
            }
            LockoutState::Active => {}
        }

        if !self.verify_password(password, &record.password_hash).await? {
            return Err(self.register_failure(&record, now, ctx).await?);
        }

        self.credentials.reset_failed_attempts(record.id).await?;

        let tokens = self.open_session(&record, now, ctx)?;

        self.audit(AuditEvent::new(
            AuditKind::LoginSuccess,
            Some(record.id),
            format!("login succeeded for {}", record.email),
            now,
            ctx,
        ));
        info!(staff_id = record.id, role = %record.role, "staff login");

        Ok(tokens)
    }

    /// Exchange a refresh token for a new pair. The previous session family is
    /// revoked, so each refresh token is accepted at most once.
    ///
    /// # Errors
    /// `InvalidCredentials` when the token is rejected, its family was revoked
    /// (reuse, logout, force-logout or lockout), or the account is no longer
    /// usable; `Internal` when the credential store fails.
    #[instrument(skip(self, refresh_token, ctx), fields(request_id = ctx.request_id.as_deref()))]
    pub async fn refresh(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<AuthTokens, AuthError> {
        let now = self.clock.now();
        let claims = self.decode(refresh_token, TokenKind::Refresh, now, ctx)?;
        if self.revoked.is_revoked(claims.sid) {
            self.token_rejected(Some(claims.staff_id), RejectReason::SessionRevoked, now, ctx);
            return Err(AuthError::InvalidCredentials);
        }
        let record = self.current_record(&claims, now, ctx).await?;

        // Concurrent refreshes with the same token race here; one wins.
        if !self.revoked.revoke(claims.sid, claims.exp) {
            self.token_rejected(Some(claims.staff_id), RejectReason::SessionRevoked, now, ctx);
            return Err(AuthError::InvalidCredentials);
        }
        let revoked = self.sessions.remove_session(claims.sid);
        let tokens = self.open_session(&record, now, ctx)?;

        self.audit(AuditEvent::new(
            AuditKind::TokenRefresh,
            Some(record.id),
            format!("token pair rotated, {revoked} previous session(s) revoked"),
            now,
            ctx,
        ));

        Ok(tokens)
    }

    /// End the session for `access_token` and revoke its refresh token. Never
    /// fails.
    #[instrument(skip(self, access_token, ctx), fields(request_id = ctx.request_id.as_deref()))]
    pub fn logout(&self, access_token: &str, ctx: &RequestContext) {
        let now = self.clock.now();
        let removed = self.sessions.remove(access_token);
        let decoded = self.codec.decode(access_token, now.timestamp()).ok();

        if decoded.is_none() && removed.is_none() {
            debug!("logout with unknown token ignored");
            return;
        }

        match (&removed, &decoded) {
            (Some(entry), _) => self.revoke_family(entry),
            (None, Some(claims)) => {
                self.revoked
                    .revoke(claims.sid, self.refresh_expiry(claims.iat));
            }
            (None, None) => {}
        }

        let subject_id = decoded
            .as_ref()
            .map(|claims| claims.staff_id)
            .or_else(|| removed.as_ref().map(|entry| entry.staff_id));
        let detail = if removed.is_some() {
            "session closed"
        } else {
            "logout for a session that was already gone"
        };
        self.audit(AuditEvent::new(AuditKind::Logout, subject_id, detail, now, ctx));
    }

    /// Profile of the staff member behind a live access token. Does not slide
    /// the session.
    ///
    /// # Errors
    /// `InvalidCredentials` when the token or account is rejected; `Internal`
    /// when the credential store fails.
    #[instrument(skip(self, access_token, ctx), fields(request_id = ctx.request_id.as_deref()))]
    pub async fn profile(
        &self,
        access_token: &str,
        ctx: &RequestContext,
    ) -> Result<StaffProfile, AuthError> {
        let now = self.clock.now();
        let claims = self.decode(access_token, TokenKind::Access, now, ctx)?;

        if !self.sessions.contains(access_token) {
            self.token_rejected(Some(claims.staff_id), RejectReason::SessionNotFound, now, ctx);
            return Err(AuthError::InvalidCredentials);
        }

        let record = self.current_record(&claims, now, ctx).await?;
        Ok(StaffProfile::from(&record))
    }

    /// Per-request gate: the token must decode and its session must be live
    /// and not idle. A successful check slides the session.
    ///
    /// # Errors
    /// `InvalidCredentials` on any rejection.
    pub fn validate(
        &self,
        access_token: &str,
        ctx: &RequestContext,
    ) -> Result<TokenClaims, AuthError> {
        let now = self.clock.now();
        let claims = self.decode(access_token, TokenKind::Access, now, ctx)?;

        match self
            .sessions
            .touch_within(access_token, self.config.idle_timeout_delta(), now)
        {
            TouchOutcome::Touched => Ok(claims),
            TouchOutcome::Absent => {
                self.token_rejected(Some(claims.staff_id), RejectReason::SessionNotFound, now, ctx);
                Err(AuthError::InvalidCredentials)
            }
            TouchOutcome::Expired(entry) => {
                self.audit(AuditEvent::new(
                    AuditKind::SessionExpired,
                    Some(entry.staff_id),
                    format!("session idle since {}", entry.last_activity),
                    now,
                    ctx,
                ));
                self.token_rejected(Some(claims.staff_id), RejectReason::SessionIdle, now, ctx);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    /// [`validate`](Self::validate) plus a role check.
    ///
    /// # Errors
    /// `InvalidCredentials` when the token is rejected, `AccessDenied` when the
    /// role lacks `permission`.
    pub fn authorize(
        &self,
        access_token: &str,
        permission: Permission,
        ctx: &RequestContext,
    ) -> Result<TokenClaims, AuthError> {
        let claims = self.validate(access_token, ctx)?;
        if claims.role.has_permission(permission) {
            Ok(claims)
        } else {
            warn!(staff_id = claims.staff_id, role = %claims.role, ?permission, "access denied");
            Err(AuthError::AccessDenied)
        }
    }

    /// Remove every live session of `staff_id` and revoke their refresh tokens.
    pub fn force_logout_staff(&self, staff_id: i64, ctx: &RequestContext) -> usize {
        let removed = self.evict_staff(staff_id);
        if removed > 0 {
            self.audit(AuditEvent::new(
                AuditKind::SessionForceRemoved,
                Some(staff_id),
                format!("{removed} session(s) removed by administrator"),
                self.clock.now(),
                ctx,
            ));
        }
        removed
    }

    #[must_use]
    pub fn active_session_count(&self, staff_id: i64) -> usize {
        self.sessions.count_for_staff(staff_id)
    }

    #[must_use]
    pub fn session_statistics(&self) -> SessionStatistics {
        self.sessions.stats()
    }

    /// Drop sessions idle past the timeout. Returns how many were removed.
    /// Revocations whose refresh tokens have expired are forgotten here too.
    pub fn expire_idle_sessions(&self) -> usize {
        let now = self.clock.now();
        let pruned = self.revoked.prune(now.timestamp());
        if pruned > 0 {
            debug!(pruned, "forgot expired session revocations");
        }
        let expired = self
            .sessions
            .sweep_expired(self.config.idle_timeout_delta(), now);
        let ctx = RequestContext::default();
        for session in &expired {
            self.audit(AuditEvent::new(
                AuditKind::SessionExpired,
                Some(session.entry.staff_id),
                format!(
                    "session for {} idle since {}",
                    session.entry.identity, session.entry.last_activity
                ),
                now,
                &ctx,
            ));
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "expired idle sessions");
        }
        expired.len()
    }

    /// Clear locks whose expiry has passed. Returns how many accounts were
    /// unlocked; a failing reset is logged and skipped. An account that was
    /// unlocked or locked again after the scan is left untouched.
    ///
    /// # Errors
    /// Returns an error if the lookup of locked accounts fails.
    pub async fn unlock_elapsed_accounts(&self) -> anyhow::Result<usize> {
        let now = self.clock.now();
        let candidates = self
            .credentials
            .find_accounts_to_unlock(now)
            .await
            .context("failed to list accounts to unlock")?;

        let ctx = RequestContext::default();
        let mut unlocked = 0;
        for record in candidates {
            match self.credentials.clear_elapsed_lock(record.id, now).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(staff_id = record.id, "lock already cleared or renewed");
                    continue;
                }
                Err(err) => {
                    error!(staff_id = record.id, "failed to unlock account: {err:#}");
                    continue;
                }
            }
            unlocked += 1;
            self.audit(AuditEvent::new(
                AuditKind::AccountUnlocked,
                Some(record.id),
                format!("lock for {} elapsed", record.email),
                now,
                &ctx,
            ));
        }
        if unlocked > 0 {
            info!(count = unlocked, "unlocked accounts");
        }
        Ok(unlocked)
    }

    async fn verify_password(
        &self,
        password: &SecretString,
        hash: &str,
    ) -> Result<bool, AuthError> {
        let verifier = Arc::clone(&self.verifier);
        let plaintext = SecretString::from(password.expose_secret().to_owned());
        let hash = hash.to_owned();
        let verified =
            tokio::task::spawn_blocking(move || verifier.verify(plaintext.expose_secret(), &hash))
                .await
                .context("password verification task failed")?;
        Ok(verified)
    }

    /// Count a failed password and lock the account once the threshold is hit.
    /// Returns the error to surface to the caller.
    async fn register_failure(
        &self,
        record: &CredentialRecord,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> Result<AuthError, AuthError> {
        let failed = self.credentials.increment_failed_attempts(record.id).await?;

        if !self.lockout.should_lock(failed) {
            self.login_failed(
                Some(record.id),
                RejectReason::BadPassword,
                &format!("bad password, attempt {failed} of {}", self.lockout.threshold()),
                now,
                ctx,
            );
            return Ok(AuthError::InvalidCredentials);
        }

        let until = self.lockout.lock_expiry(now);
        self.credentials.set_lock(record.id, Some(until)).await?;
        let evicted = self.evict_staff(record.id);

        self.login_failed(
            Some(record.id),
            RejectReason::BadPassword,
            &format!("bad password, attempt {failed} of {}", self.lockout.threshold()),
            now,
            ctx,
        );
        self.audit(AuditEvent::new(
            AuditKind::AccountLocked,
            Some(record.id),
            format!("locked until {until} after {failed} failed attempts, {evicted} session(s) evicted"),
            now,
            ctx,
        ));
        warn!(staff_id = record.id, failed, "account locked");

        Ok(AuthError::AccountLocked)
    }

    /// Remove every session of `staff_id`, revoking each family.
    fn evict_staff(&self, staff_id: i64) -> usize {
        let removed = self.sessions.drain_for_staff(staff_id);
        for entry in &removed {
            self.revoke_family(entry);
        }
        removed.len()
    }

    fn revoke_family(&self, entry: &SessionEntry) {
        self.revoked.revoke(
            entry.session_id,
            self.refresh_expiry(entry.created_at.timestamp()),
        );
    }

    /// When a refresh token issued at `issued_at` (unix seconds) expires.
    fn refresh_expiry(&self, issued_at: i64) -> i64 {
        let ttl = i64::try_from(self.config.refresh_ttl().as_secs()).unwrap_or(i64::MAX);
        issued_at.saturating_add(ttl)
    }

    fn open_session(
        &self,
        record: &CredentialRecord,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> Result<AuthTokens, AuthError> {
        let issued_at = now.timestamp();
        let access = TokenClaims::new(
            record.email.as_str(),
            record.id,
            record.role,
            record.first_name.as_str(),
            record.last_name.as_str(),
            TokenKind::Access,
            Uuid::new_v4(),
        );
        let refresh = access.sibling(TokenKind::Refresh);

        let access_token = self
            .codec
            .issue(&access, self.config.access_ttl(), issued_at)
            .context("failed to issue access token")?;
        let refresh_token = self
            .codec
            .issue(&refresh, self.config.refresh_ttl(), issued_at)
            .context("failed to issue refresh token")?;

        self.sessions.insert(
            access_token.clone(),
            SessionEntry::new(record.id, record.email.clone(), access.sid, now),
        );
        self.audit(AuditEvent::new(
            AuditKind::SessionCreated,
            Some(record.id),
            format!("session {} opened", access.sid),
            now,
            ctx,
        ));

        let expires_in = self.config.access_ttl().as_secs();
        let ttl = i64::try_from(expires_in).unwrap_or(i64::MAX);
        Ok(AuthTokens {
            access_token,
            refresh_token,
            token_type: TOKEN_TYPE,
            expires_in,
            claims: TokenClaims {
                iat: issued_at,
                exp: issued_at.saturating_add(ttl),
                ..access
            },
        })
    }

    fn decode(
        &self,
        token: &str,
        expected: TokenKind,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> Result<TokenClaims, AuthError> {
        let claims = match self.codec.decode(token, now.timestamp()) {
            Ok(claims) => claims,
            Err(err) => {
                self.token_rejected(None, RejectReason::from(&err), now, ctx);
                return Err(AuthError::InvalidCredentials);
            }
        };
        if claims.kind != expected {
            self.token_rejected(Some(claims.staff_id), RejectReason::WrongTokenKind, now, ctx);
            return Err(AuthError::InvalidCredentials);
        }
        Ok(claims)
    }

    /// Reload the account behind `claims` and check it is still usable.
    async fn current_record(
        &self,
        claims: &TokenClaims,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) -> Result<CredentialRecord, AuthError> {
        let record = self.credentials.find_by_identity(&claims.sub).await?;
        let reason = match &record {
            None => Some(RejectReason::UnknownIdentity),
            Some(record) if record.id != claims.staff_id => Some(RejectReason::IdentityMismatch),
            Some(record) if !record.active => Some(RejectReason::Deactivated),
            Some(record) if self.lockout.is_locked(record.locked_until, now) => {
                Some(RejectReason::Locked)
            }
            Some(_) => None,
        };
        match (record, reason) {
            (Some(record), None) => Ok(record),
            (_, reason) => {
                self.token_rejected(
                    Some(claims.staff_id),
                    reason.unwrap_or(RejectReason::UnknownIdentity),
                    now,
                    ctx,
                );
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    fn login_failed(
        &self,
        subject_id: Option<i64>,
        reason: RejectReason,
        detail: &str,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) {
        self.audit(
            AuditEvent::new(AuditKind::LoginFailed, subject_id, detail, now, ctx).with_reason(reason),
        );
    }

    fn token_rejected(
        &self,
        subject_id: Option<i64>,
        reason: RejectReason,
        now: DateTime<Utc>,
        ctx: &RequestContext,
    ) {
        self.audit(
            AuditEvent::new(AuditKind::TokenRejected, subject_id, reason.as_str(), now, ctx)
                .with_reason(reason),
        );
    }

    fn audit(&self, event: AuditEvent) {
        let kind = event.kind;
        if let Err(err) = self.audit.record(event) {
            warn!(audit.kind = %kind, "audit sink failed: {err:#}");
        }
    }
}
