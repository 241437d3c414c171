//! Lease records for renewable locks
//!
//! The table is a cache of "this process should keep renewing that key".
//! The store stays the source of truth: losing the table only loses
//! auto-renewal, never ownership correctness.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::identity::{OwnerTask, TaskId, TaskProbe};

/// Lease table key: one entry per (task, lock key)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeaseKey {
    pub task: TaskId,
    pub key: String,
}

impl LeaseKey {
    pub fn new(task: TaskId, key: impl Into<String>) -> Self {
        Self {
            task,
            key: key.into(),
        }
    }
}

/// A renewable lock held by this process
#[derive(Debug, Clone)]
pub struct LeaseRecord {
    /// Lock key in the store
    pub key: String,
    /// Value stored under the key
    pub owner_value: String,
    /// Lease duration applied on every renewal
    pub timeout: Duration,
    pub acquired_at: Instant,
    pub last_renewed_at: Option<Instant>,
    pub renewal_count: u32,
    task: TaskProbe,
}

impl LeaseRecord {
    pub fn new(task: &OwnerTask, key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            key: key.into(),
            owner_value: task.owner_value().to_string(),
            timeout,
            acquired_at: Instant::now(),
            last_renewed_at: None,
            renewal_count: 0,
            task: task.probe(),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id()
    }

    pub fn lease_key(&self) -> LeaseKey {
        LeaseKey::new(self.task.id(), self.key.clone())
    }

    /// Whether the owning task is still running
    pub fn is_owner_alive(&self) -> bool {
        self.task.is_alive()
    }
}

/// Concurrent map of lease records shared by the manager and the keep-alive pass
#[derive(Clone, Default)]
pub struct LeaseTable {
    records: Arc<DashMap<LeaseKey, LeaseRecord>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: LeaseRecord) {
        self.records.insert(record.lease_key(), record);
    }

    pub fn remove(&self, task: TaskId, key: &str) -> Option<LeaseRecord> {
        self.records
            .remove(&LeaseKey::new(task, key))
            .map(|(_, record)| record)
    }

    pub fn get(&self, task: TaskId, key: &str) -> Option<LeaseRecord> {
        self.records
            .get(&LeaseKey::new(task, key))
            .map(|record| record.clone())
    }

    pub fn contains(&self, task: TaskId, key: &str) -> bool {
        self.records.contains_key(&LeaseKey::new(task, key))
    }

    /// Record a successful renewal
    pub fn mark_renewed(&self, lease_key: &LeaseKey) {
        if let Some(mut record) = self.records.get_mut(lease_key) {
            record.last_renewed_at = Some(Instant::now());
            record.renewal_count += 1;
        }
    }

    /// Copy of all records; no shard lock is held once this returns
    pub fn snapshot(&self) -> Vec<LeaseRecord> {
        self.records
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
