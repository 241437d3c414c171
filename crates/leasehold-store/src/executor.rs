//! Atomic compare-and-act primitives

use std::time::Duration;

use async_trait::async_trait;
use leasehold_common::Result;

/// Longest TTL a lock may carry
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Atomic lock operations executed against the backing store.
///
/// Each call runs as one indivisible unit on the store. Transport failures
/// surface as `LockError::StoreUnavailable` and are never retried here.
#[async_trait]
pub trait LockScriptExecutor: Send + Sync {
    /// Set `key` to `value` with `ttl` only if `key` does not exist
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// Delete `key` only if it currently holds `expected`
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Refresh or re-claim a lease in one step.
    ///
    /// - `key` absent: set it to `expected` with `ttl`, return `true`
    /// - `key` holds `expected`: reset its TTL to `ttl`, return `true`
    /// - `key` holds another value: leave value and TTL untouched, return `false`
    async fn compare_and_reset_ttl(&self, key: &str, expected: &str, ttl: Duration)
    -> Result<bool>;
}

/// TTL expressed in whole milliseconds, rounding sub-millisecond remainders up
pub fn ttl_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_millis();
    let rounded = if ttl.subsec_nanos() % 1_000_000 != 0 {
        millis + 1
    } else {
        millis
    };
    u64::try_from(rounded).unwrap_or(u64::MAX)
}
