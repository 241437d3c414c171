// In-memory lock store
// Same atomic semantics as the Redis executor, with per-key atomicity from
// DashMap's shard locks and lazy expiry against the tokio clock

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use leasehold_common::{LockError, Result};
use tokio::time::Instant;
use tracing::debug;

use crate::executor::LockScriptExecutor;

/// A stored key with its expiry deadline
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn new(value: &str, expires_at: Instant) -> Self {
        Self {
            value: value.to_string(),
            expires_at,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

fn deadline(now: Instant, ttl: Duration) -> Result<Instant> {
    now.checked_add(ttl)
        .ok_or_else(|| LockError::illegal_argument(format!("ttl {:?} is out of range", ttl)))
}

/// In-process key-value store implementing the lock primitives
#[derive(Default)]
pub struct MemoryLockStore {
    entries: DashMap<String, StoredValue>,
    unavailable: AtomicBool,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every lock operation fail with `StoreUnavailable` until reset
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current value of `key`, if present and not expired
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Remaining time to live of `key`, if present and not expired
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at - now)
    }

    /// Unconditionally remove `key`
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(count = removed, "Purged expired lock entries");
        }
        removed
    }

    fn ensure_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LockError::store_unavailable("memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl LockScriptExecutor for MemoryLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        let expires_at = deadline(now, ttl)?;

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_expired(now) {
                    return Ok(false);
                }
                entry.insert(StoredValue::new(value, expires_at));
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue::new(value, expires_at));
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.ensure_available()?;
        let now = Instant::now();

        let removed = self
            .entries
            .remove_if(key, |_, entry| {
                !entry.is_expired(now) && entry.value == expected
            })
            .is_some();
        Ok(removed)
    }

    async fn compare_and_reset_ttl(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool> {
        self.ensure_available()?;
        let now = Instant::now();
        let expires_at = deadline(now, ttl)?;

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let stored = entry.get_mut();
                if stored.is_expired(now) {
                    *stored = StoredValue::new(expected, expires_at);
                    return Ok(true);
                }
                if stored.value != expected {
                    return Ok(false);
                }
                stored.expires_at = expires_at;
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(StoredValue::new(expected, expires_at));
                Ok(true)
            }
        }
    }
}
