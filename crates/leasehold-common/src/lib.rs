//! Leasehold Common - Shared types for the lock crates
//!
//! This crate provides:
//! - `LockError` and the crate-wide `Result` alias
//! - `LockConfig` and its layered loader

pub mod config;
pub mod error;

// Re-exports for convenience
pub use crate::config::{LOCK_PROPERTIES_PREFIX, LockConfig};
pub use crate::error::{LockError, Result};
