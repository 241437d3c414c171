//! Leasehold Store - atomic lock primitives
//!
//! This crate provides:
//! - `LockScriptExecutor`, the three compare-and-act operations the lock
//!   protocol is built on
//! - `MemoryLockStore`, an in-process store with the same atomicity
//! - `RedisLockStore` (feature `redis`), backed by `SET NX PX` and Lua scripts

mod executor;
mod memory;
#[cfg(feature = "redis")]
mod redis_store;
pub mod scripts;

pub use executor::*;
pub use memory::*;
#[cfg(feature = "redis")]
pub use redis_store::RedisLockStore;
