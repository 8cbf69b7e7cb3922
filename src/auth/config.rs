//! Authentication and session-lifecycle settings.
//!
//! This is the only place lockout thresholds live; [`AuthConfig::lockout_policy`]
//! derives the policy from it.

use chrono::TimeDelta;
use std::time::Duration;

use super::lockout::{LockoutPolicy, DEFAULT_LOCKOUT_DURATION, DEFAULT_MAX_FAILED_ATTEMPTS};

const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_SESSION_IDLE_TIMEOUT_SECONDS: u64 = 30 * 60;
const DEFAULT_SESSION_SWEEP_INTERVAL_SECONDS: u64 = 5 * 60;
const DEFAULT_LOCK_SWEEP_INTERVAL_SECONDS: u64 = 10 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AuthConfig {
    access_ttl: Duration,
    refresh_ttl: Duration,
    session_idle_timeout: Duration,
    max_failed_attempts: u32,
    lockout_duration: Duration,
    session_sweep_interval: Duration,
    lock_sweep_interval: Duration,
}

impl AuthConfig {
    /// Defaults: 15m access tokens, 7d refresh tokens, 30m idle timeout,
    /// lock after 5 failures for 30m, sweeps every 5m (sessions) and 10m (locks).
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECONDS),
            session_idle_timeout: Duration::from_secs(DEFAULT_SESSION_IDLE_TIMEOUT_SECONDS),
            max_failed_attempts: DEFAULT_MAX_FAILED_ATTEMPTS,
            lockout_duration: DEFAULT_LOCKOUT_DURATION,
            session_sweep_interval: Duration::from_secs(DEFAULT_SESSION_SWEEP_INTERVAL_SECONDS),
            lock_sweep_interval: Duration::from_secs(DEFAULT_LOCK_SWEEP_INTERVAL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: u64) -> Self {
        self.access_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: u64) -> Self {
        self.refresh_ttl = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_session_idle_timeout_seconds(mut self, seconds: u64) -> Self {
        self.session_idle_timeout = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_max_failed_attempts(mut self, attempts: u32) -> Self {
        self.max_failed_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_lockout_duration_seconds(mut self, seconds: u64) -> Self {
        self.lockout_duration = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_session_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.session_sweep_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_lock_sweep_interval_seconds(mut self, seconds: u64) -> Self {
        self.lock_sweep_interval = Duration::from_secs(seconds);
        self
    }

    /// Zero intervals and thresholds become the smallest usable value.
    #[must_use]
    pub fn normalize(self) -> Self {
        let at_least_one_second = |d: Duration| {
            if d.is_zero() {
                Duration::from_secs(1)
            } else {
                d
            }
        };
        Self {
            access_ttl: at_least_one_second(self.access_ttl),
            refresh_ttl: at_least_one_second(self.refresh_ttl),
            session_idle_timeout: at_least_one_second(self.session_idle_timeout),
            max_failed_attempts: self.max_failed_attempts.max(1),
            lockout_duration: self.lockout_duration,
            session_sweep_interval: at_least_one_second(self.session_sweep_interval),
            lock_sweep_interval: at_least_one_second(self.lock_sweep_interval),
        }
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    #[must_use]
    pub fn session_idle_timeout(&self) -> Duration {
        self.session_idle_timeout
    }

    /// Idle timeout as a signed delta for timestamp arithmetic.
    #[must_use]
    pub fn idle_timeout_delta(&self) -> TimeDelta {
        TimeDelta::from_std(self.session_idle_timeout).unwrap_or(TimeDelta::MAX)
    }

    #[must_use]
    pub fn max_failed_attempts(&self) -> u32 {
        self.max_failed_attempts
    }

    #[must_use]
    pub fn lockout_duration(&self) -> Duration {
        self.lockout_duration
    }

    #[must_use]
    pub fn session_sweep_interval(&self) -> Duration {
        self.session_sweep_interval
    }

    #[must_use]
    pub fn lock_sweep_interval(&self) -> Duration {
        self.lock_sweep_interval
    }

    #[must_use]
    pub fn lockout_policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(self.max_failed_attempts, self.lockout_duration)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}
