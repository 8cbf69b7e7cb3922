//! Live session registry.
//!
//! Presence in the registry, not token expiry, decides whether an access token
//! is live: logout, force-logout and the idle sweep all revoke by removing the
//! entry. Entries are keyed by the literal access-token string.
//!
//! [`ShardedSessionRegistry`] spreads entries across independently locked
//! shards so unrelated tokens never contend on one lock. Bulk operations visit
//! the shards one at a time; a session inserted into an already visited shard
//! during a force-logout survives it.

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::hash_map::{Entry, RandomState};
use std::collections::{HashMap, HashSet};
use std::hash::BuildHasher;
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_SHARDS: usize = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionEntry {
    pub staff_id: i64,
    pub identity: String,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl SessionEntry {
    #[must_use]
    pub fn new(staff_id: i64, identity: String, session_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            staff_id,
            identity,
            session_id,
            created_at: now,
            last_activity: now,
        }
    }

    fn is_idle(&self, idle_timeout: TimeDelta, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.last_activity) > idle_timeout
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredSession {
    pub token: String,
    pub entry: SessionEntry,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TouchOutcome {
    Touched,
    Absent,
    /// The entry was idle past the timeout and has been removed.
    Expired(SessionEntry),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionStatistics {
    pub total_sessions: usize,
    pub distinct_owners: usize,
}

/// Storage strategy for live sessions. Every method must be safe to call
/// concurrently without external locking.
pub trait SessionRegistry: Send + Sync {
    /// Insert or silently replace the entry for `token`.
    fn insert(&self, token: String, entry: SessionEntry);

    /// Slide `last_activity` to `now`. Returns false if the token is not live.
    fn touch(&self, token: &str, now: DateTime<Utc>) -> bool;

    /// Atomic idle check plus touch, the per-request gate.
    fn touch_within(&self, token: &str, idle_timeout: TimeDelta, now: DateTime<Utc>)
        -> TouchOutcome;

    fn contains(&self, token: &str) -> bool;

    fn remove(&self, token: &str) -> Option<SessionEntry>;

    /// Remove and return every session owned by `staff_id`.
    fn drain_for_staff(&self, staff_id: i64) -> Vec<SessionEntry>;

    /// Remove every session owned by `staff_id`, returns how many were removed.
    fn remove_all_for_staff(&self, staff_id: i64) -> usize {
        self.drain_for_staff(staff_id).len()
    }

    /// Remove every token issued under `session_id`.
    fn remove_session(&self, session_id: Uuid) -> usize;

    /// Remove and return entries idle for longer than `idle_timeout`.
    fn sweep_expired(&self, idle_timeout: TimeDelta, now: DateTime<Utc>) -> Vec<ExpiredSession>;

    fn count_for_staff(&self, staff_id: i64) -> usize;

    fn stats(&self) -> SessionStatistics;
}

pub struct ShardedSessionRegistry {
    shards: Vec<RwLock<HashMap<String, SessionEntry>>>,
    hasher: RandomState,
}

impl std::fmt::Debug for ShardedSessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedSessionRegistry")
            .field("shards", &self.shards.len())
            .finish_non_exhaustive()
    }
}

impl ShardedSessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    #[must_use]
    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, token: &str) -> &RwLock<HashMap<String, SessionEntry>> {
        let hash = self.hasher.hash_one(token);
        // Modulo keeps the index below shards.len(), which fits in usize.
        #[allow(clippy::cast_possible_truncation)]
        let index = (hash % self.shards.len() as u64) as usize;
        &self.shards[index]
    }

    fn remove_where(&self, predicate: impl Fn(&SessionEntry) -> bool) -> Vec<SessionEntry> {
        let mut removed = Vec::new();
        for shard in &self.shards {
            let mut guard = shard.write();
            let tokens: Vec<String> = guard
                .iter()
                .filter(|(_, entry)| predicate(entry))
                .map(|(token, _)| token.clone())
                .collect();
            removed.extend(tokens.iter().filter_map(|token| guard.remove(token)));
        }
        removed
    }
}

impl Default for ShardedSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionRegistry for ShardedSessionRegistry {
    fn insert(&self, token: String, entry: SessionEntry) {
        self.shard(&token).write().insert(token, entry);
    }

    fn touch(&self, token: &str, now: DateTime<Utc>) -> bool {
        match self.shard(token).write().get_mut(token) {
            Some(entry) => {
                entry.last_activity = now;
                true
            }
            None => false,
        }
    }

    fn touch_within(
        &self,
        token: &str,
        idle_timeout: TimeDelta,
        now: DateTime<Utc>,
    ) -> TouchOutcome {
        let mut guard = self.shard(token).write();
        let idle = match guard.get_mut(token) {
            None => return TouchOutcome::Absent,
            Some(entry) if entry.is_idle(idle_timeout, now) => true,
            Some(entry) => {
                entry.last_activity = now;
                false
            }
        };
        if idle {
            match guard.remove(token) {
                Some(entry) => TouchOutcome::Expired(entry),
                None => TouchOutcome::Absent,
            }
        } else {
            TouchOutcome::Touched
        }
    }

    fn contains(&self, token: &str) -> bool {
        self.shard(token).read().contains_key(token)
    }

    fn remove(&self, token: &str) -> Option<SessionEntry> {
        self.shard(token).write().remove(token)
    }

    fn drain_for_staff(&self, staff_id: i64) -> Vec<SessionEntry> {
        self.remove_where(|entry| entry.staff_id == staff_id)
    }

    fn remove_session(&self, session_id: Uuid) -> usize {
        self.remove_where(|entry| entry.session_id == session_id).len()
    }

    fn sweep_expired(&self, idle_timeout: TimeDelta, now: DateTime<Utc>) -> Vec<ExpiredSession> {
        let mut expired = Vec::new();
        for shard in &self.shards {
            let mut guard = shard.write();
            let idle: Vec<String> = guard
                .iter()
                .filter(|(_, entry)| entry.is_idle(idle_timeout, now))
                .map(|(token, _)| token.clone())
                .collect();
            for token in idle {
                if let Some(entry) = guard.remove(&token) {
                    expired.push(ExpiredSession { token, entry });
                }
            }
        }
        expired
    }

    fn count_for_staff(&self, staff_id: i64) -> usize {
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .values()
                    .filter(|entry| entry.staff_id == staff_id)
                    .count()
            })
            .sum()
    }

    fn stats(&self) -> SessionStatistics {
        let mut total_sessions = 0;
        let mut owners = HashSet::new();
        for shard in &self.shards {
            let guard = shard.read();
            total_sessions += guard.len();
            owners.extend(guard.values().map(|entry| entry.staff_id));
        }
        SessionStatistics {
            total_sessions,
            distinct_owners: owners.len(),
        }
    }
}

/// Session families whose refresh tokens are no longer honoured. An entry is
/// kept until the family's refresh token would have expired anyway.
#[derive(Debug, Default)]
pub struct RevokedFamilies {
    families: Mutex<HashMap<Uuid, i64>>,
}

impl RevokedFamilies {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `session_id` until `expires_at` (unix seconds). Returns false if
    /// the family was already revoked, so exactly one caller wins a race.
    pub fn revoke(&self, session_id: Uuid, expires_at: i64) -> bool {
        match self.families.lock().entry(session_id) {
            Entry::Occupied(mut slot) => {
                if expires_at > *slot.get() {
                    slot.insert(expires_at);
                }
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            }
        }
    }

    #[must_use]
    pub fn is_revoked(&self, session_id: Uuid) -> bool {
        self.families.lock().contains_key(&session_id)
    }

    /// Forget families whose refresh tokens have expired by `now_unix_seconds`.
    pub fn prune(&self, now_unix_seconds: i64) -> usize {
        let mut families = self.families.lock();
        let before = families.len();
        families.retain(|_, expires_at| *expires_at > now_unix_seconds);
        before - families.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.families.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
