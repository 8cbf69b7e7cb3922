//! In-process credential store for tests and local runs.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::auth::{
    credentials::{normalize_email, CredentialRecord, CredentialStore, StoreFuture},
    role::StaffRole,
};

#[derive(Debug)]
pub struct MemoryCredentialStore {
    records: RwLock<HashMap<i64, CredentialRecord>>,
    next_id: AtomicI64,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Store `record`, assigning a fresh id when `record.id` is zero.
    pub fn insert(&self, mut record: CredentialRecord) -> CredentialRecord {
        if record.id == 0 {
            record.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        } else {
            self.next_id.fetch_max(record.id + 1, Ordering::Relaxed);
        }
        record.email = normalize_email(&record.email);
        self.records.write().insert(record.id, record.clone());
        record
    }

    /// Add an active account with no failed attempts.
    pub fn add_staff(
        &self,
        email: &str,
        password_hash: &str,
        role: StaffRole,
        first_name: &str,
        last_name: &str,
    ) -> CredentialRecord {
        self.insert(CredentialRecord {
            id: 0,
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            active: true,
            failed_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<CredentialRecord> {
        self.records.read().get(&id).cloned()
    }

    /// Returns false if no such account exists.
    pub fn set_active(&self, id: i64, active: bool) -> bool {
        match self.records.write().get_mut(&id) {
            Some(record) => {
                record.active = active;
                true
            }
            None => false,
        }
    }

    fn update<T>(&self, id: i64, f: impl FnOnce(&mut CredentialRecord) -> T) -> Result<T> {
        let mut records = self.records.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| anyhow!("no staff account with id {id}"))?;
        Ok(f(record))
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn find_by_identity<'a>(&'a self, email: &'a str) -> StoreFuture<'a, Option<CredentialRecord>> {
        Box::pin(async move {
            let email = normalize_email(email);
            Ok(self
                .records
                .read()
                .values()
                .find(|record| record.email == email)
                .cloned())
        })
    }

    fn increment_failed_attempts(&self, id: i64) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            self.update(id, |record| {
                record.failed_attempts = record.failed_attempts.saturating_add(1);
                record.failed_attempts
            })
        })
    }

    fn reset_failed_attempts(&self, id: i64) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.update(id, |record| {
                record.failed_attempts = 0;
                record.locked_until = None;
            })
        })
    }

    fn set_lock(&self, id: i64, until: Option<DateTime<Utc>>) -> StoreFuture<'_, ()> {
        Box::pin(async move { self.update(id, |record| record.locked_until = until) })
    }

    fn clear_elapsed_lock(&self, id: i64, now: DateTime<Utc>) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            self.update(id, |record| match record.locked_until {
                Some(until) if until <= now => {
                    record.failed_attempts = 0;
                    record.locked_until = None;
                    true
                }
                _ => false,
            })
        })
    }

    fn find_accounts_to_unlock(&self, now: DateTime<Utc>) -> StoreFuture<'_, Vec<CredentialRecord>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .values()
                .filter(|record| record.locked_until.is_some_and(|until| until <= now))
                .cloned()
                .collect())
        })
    }
}
