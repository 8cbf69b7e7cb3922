//! Account lockout decisions.
//!
//! Lockout state is never stored on its own: it is derived from the
//! failed-attempt counter and the lock expiry on the credential record.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

pub const DEFAULT_MAX_FAILED_ATTEMPTS: u32 = 5;
pub const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(30 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockoutState {
    Active,
    Locked { until: DateTime<Utc> },
}

#[derive(Clone, Copy, Debug)]
pub struct LockoutPolicy {
    threshold: u32,
    duration: TimeDelta,
}

impl LockoutPolicy {
    #[must_use]
    pub fn new(threshold: u32, duration: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            duration: TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX),
        }
    }

    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.duration
    }

    #[must_use]
    pub fn should_lock(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.threshold
    }

    #[must_use]
    pub fn lock_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.duration)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    #[must_use]
    pub fn is_locked(&self, lock_expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        lock_expiry.is_some_and(|until| until > now)
    }

    #[must_use]
    pub fn state(&self, lock_expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> LockoutState {
        match lock_expiry {
            Some(until) if until > now => LockoutState::Locked { until },
            _ => LockoutState::Active,
        }
    }

    /// Time left on an active lock, `None` when not locked.
    #[must_use]
    pub fn lock_remaining(
        &self,
        lock_expiry: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Option<TimeDelta> {
        match self.state(lock_expiry, now) {
            LockoutState::Locked { until } => Some(until - now),
            LockoutState::Active => None,
        }
    }
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILED_ATTEMPTS, DEFAULT_LOCKOUT_DURATION)
    }
}
