// Shared helpers for leasehold-lock integration tests

#![allow(dead_code)]

use std::sync::Arc;

use leasehold_lock::{LockConfig, LockManager, MemoryLockStore};

pub const KEY: &str = "hello";
pub const VALUE: &str = "world";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("leasehold_lock=debug")
        .try_init();
}

/// Manager over a fresh in-memory store with `keep_alive=5000ms, factor=1.1`
pub fn memory_manager() -> (LockManager, Arc<MemoryLockStore>) {
    init_tracing();
    let store = Arc::new(MemoryLockStore::new());
    let config = LockConfig::new(5_000, 1.1).expect("valid config");
    let manager = LockManager::new(store.clone(), config).expect("valid manager");
    (manager, store)
}
