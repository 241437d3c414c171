// Redis-backed lock store
// Single-key atomicity comes from Redis itself: SET NX PX for acquisition,
// Lua scripts for the compare-and-act operations

use std::time::Duration;

use async_trait::async_trait;
use leasehold_common::{LockError, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script, Value};
use tracing::{debug, info};

use crate::executor::{LockScriptExecutor, ttl_millis};
use crate::scripts::{COMPARE_AND_DELETE, COMPARE_AND_RESET_TTL};

fn store_error(e: RedisError) -> LockError {
    LockError::StoreUnavailable(e.to_string())
}

/// Lock executor over a reconnecting Redis connection
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    compare_and_delete: Script,
    compare_and_reset_ttl: Script,
}

impl RedisLockStore {
    /// Connect to `url` (e.g. `redis://127.0.0.1:6379/0`)
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(store_error)?;
        let conn = ConnectionManager::new(client).await.map_err(store_error)?;
        info!(url = %url, "Connected Redis lock store");
        Ok(Self::with_connection(conn))
    }

    /// Wrap a connection owned by the host application
    pub fn with_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
            compare_and_reset_ttl: Script::new(COMPARE_AND_RESET_TTL),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(store_error)
    }

    /// Remaining ttl of `key`; `None` when the key is absent or has no expiry
    pub async fn pttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn.clone();
        let millis: i64 = conn.pttl(key).await.map_err(store_error)?;
        Ok(u64::try_from(millis).ok().map(Duration::from_millis))
    }

    /// Unconditionally delete `key`
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(store_error)?;
        Ok(removed > 0)
    }
}

#[async_trait]
impl LockScriptExecutor for RedisLockStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reply: Value = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(store_error)?;

        let set = !matches!(reply, Value::Nil);
        debug!(key = %key, set, "SET NX PX");
        Ok(set)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(deleted == 1)
    }

    async fn compare_and_reset_ttl(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let reset: i64 = self
            .compare_and_reset_ttl
            .key(key)
            .arg(expected)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(reset == 1)
    }
}
