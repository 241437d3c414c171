// Integration tests for the lease keep-alive timer
// Run on a paused tokio clock so that tick timing is deterministic

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::{KEY, VALUE, init_tracing, memory_manager};
use leasehold_lock::{
    KeepAlive, LockConfig, LockManager, LockScriptExecutor, MemoryLockStore, OwnerTask, Result,
    renew_leases,
};

const LEASE: Duration = Duration::from_millis(6_000);

#[tokio::test(start_paused = true)]
async fn test_tick_refreshes_lease() {
    let (manager, store) = memory_manager();
    let keep_alive = KeepAlive::spawn(manager.clone());
    let task = OwnerTask::new();

    assert!(manager.acquire_with_renewal(&task, KEY, LEASE).await.unwrap());

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    let before_tick = store.remaining_ttl(KEY).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let after_tick = store.remaining_ttl(KEY).unwrap();

    assert!(after_tick > before_tick);
    assert!(after_tick <= LEASE);
    keep_alive.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_live_task_outlasts_its_ttl() {
    let (manager, store) = memory_manager();
    let keep_alive = KeepAlive::spawn(manager.clone());
    let task = OwnerTask::new();

    assert!(manager.acquire_with_renewal(&task, KEY, LEASE).await.unwrap());
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(store.get(KEY).as_deref(), Some(task.owner_value()));
    let record = manager.leases().get(task.id(), KEY).unwrap();
    assert!(record.renewal_count >= 5);

    // Explicit release ends the renewals
    assert!(manager.release(KEY, task.owner_value()).await.unwrap());
    assert_eq!(manager.lease_count(), 0);
    keep_alive.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_finished_task_lock_reclaimed_within_one_tick() {
    let (manager, store) = memory_manager();
    let keep_alive = KeepAlive::spawn(manager.clone());

    let handle = OwnerTask::spawn({
        let manager = manager.clone();
        |task| async move { manager.acquire_with_renewal(&task, KEY, LEASE).await.unwrap() }
    });
    assert!(handle.await.unwrap());
    assert_eq!(manager.lease_count(), 1);

    // Before the tick the dead owner's lock still excludes others
    tokio::time::sleep(Duration::from_millis(4_000)).await;
    assert!(!manager.acquire(KEY, VALUE, LEASE).await.unwrap());

    // After the tick, and before the natural expiry at 6000 ms
    tokio::time::sleep(Duration::from_millis(1_100)).await;
    assert_eq!(store.get(KEY), None);
    assert_eq!(manager.lease_count(), 0);
    assert!(manager.acquire(KEY, VALUE, LEASE).await.unwrap());

    keep_alive.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_finish_releases_on_next_tick() {
    let (manager, store) = memory_manager();
    let keep_alive = KeepAlive::spawn(manager.clone());
    let task = OwnerTask::new();

    assert!(manager.acquire_with_renewal(&task, KEY, LEASE).await.unwrap());
    task.finish();

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(store.get(KEY), None);
    assert!(!manager.leases().contains(task.id(), KEY));

    keep_alive.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_wires_keep_alive() {
    init_tracing();
    let store = Arc::new(MemoryLockStore::new());
    let config = LockConfig::new(5_000, 1.1).unwrap();
    let (manager, keep_alive) = LockManager::start(store.clone(), config).unwrap();
    assert!(keep_alive.is_running());

    let task = OwnerTask::new();
    assert!(manager.acquire_with_renewal(&task, KEY, LEASE).await.unwrap());
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(store.get(KEY).as_deref(), Some(task.owner_value()));

    keep_alive.shutdown().await;
}

/// What `ScriptedStore` does on every extend
#[derive(Clone, Copy)]
enum ExtendBehavior {
    /// Sleep this long before extending
    Slow(Duration),
    /// Panic on the first call, succeed afterwards
    PanicOnce,
}

/// Memory store with an instrumented extend
struct ScriptedStore {
    inner: MemoryLockStore,
    behavior: ExtendBehavior,
    extend_calls: AtomicU32,
}

impl ScriptedStore {
    fn new(behavior: ExtendBehavior) -> Self {
        Self {
            inner: MemoryLockStore::new(),
            behavior,
            extend_calls: AtomicU32::new(0),
        }
    }

    fn extend_calls(&self) -> u32 {
        self.extend_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LockScriptExecutor for ScriptedStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        self.inner.compare_and_delete(key, expected).await
    }

    async fn compare_and_reset_ttl(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let call = self.extend_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            ExtendBehavior::Slow(delay) => tokio::time::sleep(delay).await,
            ExtendBehavior::PanicOnce if call == 0 => panic!("store exploded"),
            ExtendBehavior::PanicOnce => {}
        }
        self.inner.compare_and_reset_ttl(key, expected, ttl).await
    }
}

fn scripted_manager(behavior: ExtendBehavior) -> (LockManager, Arc<ScriptedStore>) {
    init_tracing();
    let store = Arc::new(ScriptedStore::new(behavior));
    let config = LockConfig::new(5_000, 1.1).unwrap();
    let manager = LockManager::new(store.clone(), config).unwrap();
    (manager, store)
}

#[tokio::test(start_paused = true)]
async fn test_slow_pass_skips_overlapping_ticks() {
    let (manager, store) = scripted_manager(ExtendBehavior::Slow(Duration::from_secs(12)));
    let keep_alive = KeepAlive::spawn(manager.clone());
    let task = OwnerTask::new();

    assert!(
        manager
            .acquire_with_renewal(&task, KEY, Duration::from_secs(60))
            .await
            .unwrap()
    );

    // Pass started at 5 s runs until 17 s; ticks at 10 s and 15 s are skipped
    tokio::time::sleep(Duration::from_secs(19)).await;
    assert_eq!(store.extend_calls(), 1);

    // The tick at 20 s starts the next pass
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(store.extend_calls(), 2);

    keep_alive.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_pass_does_not_stop_ticks() {
    let (manager, store) = scripted_manager(ExtendBehavior::PanicOnce);
    let keep_alive = KeepAlive::spawn(manager.clone());
    let task = OwnerTask::new();

    assert!(
        manager
            .acquire_with_renewal(&task, KEY, Duration::from_secs(60))
            .await
            .unwrap()
    );

    tokio::time::sleep(Duration::from_millis(5_100)).await;
    assert_eq!(store.extend_calls(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(store.extend_calls(), 2);
    assert_eq!(manager.leases().get(task.id(), KEY).unwrap().renewal_count, 1);

    keep_alive.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_release_during_pass_is_not_renewed() {
    let (manager, store) = scripted_manager(ExtendBehavior::Slow(Duration::from_secs(1)));
    let task = OwnerTask::new();
    let timeout = Duration::from_secs(60);

    assert!(manager.acquire_with_renewal(&task, "a", timeout).await.unwrap());
    assert!(manager.acquire_with_renewal(&task, "b", timeout).await.unwrap());

    let pass = tokio::spawn({
        let manager = manager.clone();
        async move { renew_leases(&manager).await }
    });

    // The pass is now inside its first extend
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(store.extend_calls(), 1);
    assert!(manager.release("a", task.owner_value()).await.unwrap());
    assert!(manager.release("b", task.owner_value()).await.unwrap());
    assert_eq!(manager.lease_count(), 0);

    let report = pass.await.unwrap();
    assert_eq!(report.renewed, 0);
    assert_eq!(store.extend_calls(), 1);
    assert_eq!(store.inner.get("a"), None);
    assert_eq!(store.inner.get("b"), None);

    // Both keys are free for anyone else
    assert!(manager.acquire("a", VALUE, timeout).await.unwrap());
    assert!(manager.acquire("b", VALUE, timeout).await.unwrap());
}
