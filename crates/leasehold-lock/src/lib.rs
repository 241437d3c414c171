//! Leasehold Lock - distributed lock with lease keep-alive
//!
//! This crate provides:
//! - Owner identity: process-unique owner values bound to `OwnerTask` handles
//! - `LockManager`: acquire, acquire-with-renewal, release and extend
//! - `KeepAlive`: the background pass that renews leases of live tasks and
//!   releases those of finished ones

pub mod identity;
pub mod keepalive;
pub mod lease;
pub mod manager;

pub use identity::{OwnerTask, TaskId, TaskProbe, current_owner_value, process_id, task_of};
pub use keepalive::{KeepAlive, RenewalReport, renew_leases};
pub use lease::{LeaseKey, LeaseRecord, LeaseTable};
pub use manager::LockManager;

// Re-export the collaborators a host application needs to wire a manager
pub use leasehold_common::{LockConfig, LockError, Result};
#[cfg(feature = "redis")]
pub use leasehold_store::RedisLockStore;
pub use leasehold_store::{LockScriptExecutor, MAX_TTL, MemoryLockStore};
