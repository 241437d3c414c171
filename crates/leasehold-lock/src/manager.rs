//! Lock manager
//!
//! Provides:
//! - `acquire`: plain set-if-absent lock, renewal is the caller's business
//! - `acquire_with_renewal`: lock owned by an `OwnerTask`, kept alive by the
//!   keep-alive pass while the task runs
//! - `release`: owner-checked delete
//! - `extend`: owner-checked TTL refresh that also re-claims a lapsed key

use std::sync::Arc;
use std::time::Duration;

use leasehold_common::{LockConfig, LockError, Result};
use leasehold_store::{LockScriptExecutor, MAX_TTL};
use tracing::{debug, info};

use crate::identity::{OwnerTask, task_of};
use crate::keepalive::KeepAlive;
use crate::lease::{LeaseRecord, LeaseTable};

fn check_key_value(key: &str, value: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LockError::illegal_argument("key must not be empty"));
    }
    if value.is_empty() {
        return Err(LockError::illegal_argument("value must not be empty"));
    }
    Ok(())
}

fn check_timeout(timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(LockError::illegal_argument("timeout must be greater than 0"));
    }
    if timeout > MAX_TTL {
        return Err(LockError::IllegalArgument(format!(
            "timeout must not exceed {} ms",
            MAX_TTL.as_millis()
        )));
    }
    Ok(())
}

/// Distributed lock operations over an atomic store executor
#[derive(Clone)]
pub struct LockManager {
    executor: Arc<dyn LockScriptExecutor>,
    leases: LeaseTable,
    config: LockConfig,
}

impl LockManager {
    pub fn new(executor: Arc<dyn LockScriptExecutor>, config: LockConfig) -> Result<Self> {
        config.check()?;
        info!(
            keep_alive_ms = config.keep_alive_ms,
            factor = config.factor,
            "LockManager initialized"
        );
        Ok(Self {
            executor,
            leases: LeaseTable::new(),
            config,
        })
    }

    /// Create a manager and start its keep-alive pass
    pub fn start(
        executor: Arc<dyn LockScriptExecutor>,
        config: LockConfig,
    ) -> Result<(Self, KeepAlive)> {
        let manager = Self::new(executor, config)?;
        let keep_alive = KeepAlive::spawn(manager.clone());
        Ok((manager, keep_alive))
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Lease table shared with the keep-alive pass
    pub fn leases(&self) -> &LeaseTable {
        &self.leases
    }

    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }

    /// Lock `key` with `value` for `timeout`.
    ///
    /// Returns `false` if the key is already held. Nothing is recorded
    /// locally, so the lock is never renewed automatically.
    pub async fn acquire(&self, key: &str, value: &str, timeout: Duration) -> Result<bool> {
        check_key_value(key, value)?;
        check_timeout(timeout)?;

        let acquired = self.executor.set_if_absent(key, value, timeout).await?;
        debug!(key = %key, acquired, "Lock acquire");
        Ok(acquired)
    }

    /// Lock `key` on behalf of `task` and keep renewing it while the task lives.
    ///
    /// The stored value is the task's owner value. `timeout` must be at least
    /// `keep_alive_ms * factor` so that a lease survives a skipped tick.
    pub async fn acquire_with_renewal(
        &self,
        task: &OwnerTask,
        key: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let value = task.owner_value();
        check_key_value(key, value)?;
        check_timeout(timeout)?;
        self.check_renewal_timeout(timeout)?;

        let acquired = self.executor.set_if_absent(key, value, timeout).await?;
        if acquired {
            self.leases.insert(LeaseRecord::new(task, key, timeout));
            debug!(key = %key, task = %task.id(), "Renewable lock acquired");
        }
        Ok(acquired)
    }

    /// `acquire_with_renewal` for the task-local current `OwnerTask`
    pub async fn acquire_with_renewal_current(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<bool> {
        let task = OwnerTask::current().ok_or_else(|| {
            LockError::illegal_argument("renewable locks must be acquired inside an owner task")
        })?;
        self.acquire_with_renewal(&task, key, timeout).await
    }

    /// Delete `key` if it holds `value`.
    ///
    /// The calling task's lease record for `key` is dropped whatever the store
    /// answers, including when the store call fails.
    pub async fn release(&self, key: &str, value: &str) -> Result<bool> {
        check_key_value(key, value)?;

        let result = self.executor.compare_and_delete(key, value).await;
        self.forget(key, value);

        let released = result?;
        debug!(key = %key, released, "Lock release");
        Ok(released)
    }

    /// Refresh `key` to `timeout` if it holds `value`, or claim it for `value`
    /// if it is absent. Returns `false` when another owner holds it.
    pub async fn extend(&self, key: &str, value: &str, timeout: Duration) -> Result<bool> {
        check_key_value(key, value)?;
        check_timeout(timeout)?;

        let extended = self
            .executor
            .compare_and_reset_ttl(key, value, timeout)
            .await?;
        debug!(key = %key, extended, "Lock extend");
        Ok(extended)
    }

    /// Store-side release that leaves the lease table alone
    pub(crate) async fn release_in_store(&self, key: &str, value: &str) -> Result<bool> {
        check_key_value(key, value)?;
        self.executor.compare_and_delete(key, value).await
    }

    fn check_renewal_timeout(&self, timeout: Duration) -> Result<()> {
        let min_ms = self.config.min_renewal_timeout_ms();
        if (timeout.as_millis() as f64) < min_ms {
            return Err(LockError::IllegalArgument(format!(
                "timeout must be at least {} ms",
                min_ms
            )));
        }
        Ok(())
    }

    fn forget(&self, key: &str, value: &str) {
        if let Some(task) = task_of(value) {
            self.leases.remove(task, key);
        }
        if let Some(current) = OwnerTask::current() {
            self.leases.remove(current.id(), key);
        }
    }
}
