//! Lease keep-alive
//!
//! One timer per `LockManager`, ticking every `keep_alive_ms`. Each tick runs a
//! renewal pass as its own task:
//! - owner task alive: extend the lease (re-claiming it if it lapsed)
//! - owner task dead: release the lock and drop the record
//!
//! A tick is skipped while the previous pass is still running, and a failing
//! or panicking pass never stops later ticks.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use crate::manager::LockManager;

/// Outcome counts of one renewal pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalReport {
    /// Leases extended or re-claimed for a live task
    pub renewed: u32,
    /// Leases of live tasks now held by another owner
    pub lost: u32,
    /// Leases of finished tasks released and forgotten
    pub released: u32,
    /// Store failures; the records stay for the next tick
    pub failed: u32,
}

impl RenewalReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Run one renewal pass over every lease of `manager`
pub async fn renew_leases(manager: &LockManager) -> RenewalReport {
    let leases = manager.leases();
    let mut report = RenewalReport::default();

    if leases.is_empty() {
        debug!("Skipped lease renewal: no renewable locks held");
        gauge!("leasehold_leases_active").set(0.0);
        return report;
    }

    let mut finished = Vec::new();
    for record in leases.snapshot() {
        // Released since the snapshot was taken
        if !leases.contains(record.task_id(), &record.key) {
            continue;
        }
        let alive = record.is_owner_alive();
        debug!(key = %record.key, task = %record.task_id(), alive, "Checking lease");

        if alive {
            match manager
                .extend(&record.key, &record.owner_value, record.timeout)
                .await
            {
                Ok(true) if !leases.contains(record.task_id(), &record.key) => {
                    // Released while the extend was in flight, which may have
                    // re-claimed the key
                    if let Err(e) = manager
                        .release_in_store(&record.key, &record.owner_value)
                        .await
                    {
                        report.failed += 1;
                        error!(
                            key = %record.key,
                            error = %e,
                            "Failed to undo renewal of released lease"
                        );
                    }
                }
                Ok(true) => {
                    report.renewed += 1;
                    leases.mark_renewed(&record.lease_key());
                    counter!("leasehold_renewals_total", "outcome" => "renewed").increment(1);
                }
                Ok(false) => {
                    report.lost += 1;
                    counter!("leasehold_renewals_total", "outcome" => "lost").increment(1);
                    warn!(
                        key = %record.key,
                        task = %record.task_id(),
                        "Lease is held by another owner"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    counter!("leasehold_renewals_total", "outcome" => "failed").increment(1);
                    error!(key = %record.key, error = %e, "Failed to extend lease");
                }
            }
        } else {
            match manager
                .release_in_store(&record.key, &record.owner_value)
                .await
            {
                Ok(released) => {
                    report.released += 1;
                    counter!("leasehold_releases_total", "reason" => "owner_finished").increment(1);
                    info!(
                        key = %record.key,
                        task = %record.task_id(),
                        released,
                        "Released lock of finished task"
                    );
                    finished.push(record);
                }
                Err(e) => {
                    report.failed += 1;
                    error!(key = %record.key, error = %e, "Failed to release lock of finished task");
                }
            }
        }
    }

    for record in finished {
        leases.remove(record.task_id(), &record.key);
    }
    gauge!("leasehold_leases_active").set(leases.len() as f64);

    report
}

/// Clears the busy flag when a pass ends, even by panic
struct PassGuard {
    busy: Arc<AtomicBool>,
}

impl PassGuard {
    fn try_begin(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { busy: busy.clone() })
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Handle of the background keep-alive timer
pub struct KeepAlive {
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    /// Start ticking every `keep_alive_ms`; the first tick fires one period from now
    pub fn spawn(manager: LockManager) -> Self {
        let period = manager.config().keep_alive();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        info!(period_ms = period.as_millis() as u64, "Starting lease keep-alive");
        let handle = tokio::spawn(Self::run(manager, period, shutdown_rx));

        Self {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Stop issuing ticks. An in-flight pass finishes on its own; held leases
    /// are left to expire.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!("Lease keep-alive task ended abnormally: {}", e);
        }
        info!("Stopped lease keep-alive");
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    async fn run(manager: LockManager, period: Duration, mut shutdown_rx: mpsc::Receiver<()>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let busy = Arc::new(AtomicBool::new(false));

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let Some(guard) = PassGuard::try_begin(&busy) else {
                        info!("Skipped lease renewal tick: previous pass still running");
                        continue;
                    };
                    let manager = manager.clone();
                    tokio::spawn(async move {
                        let _guard = guard;
                        match AssertUnwindSafe(renew_leases(&manager)).catch_unwind().await {
                            Ok(report) if !report.is_empty() => {
                                info!(
                                    renewed = report.renewed,
                                    lost = report.lost,
                                    released = report.released,
                                    failed = report.failed,
                                    "Lease renewal pass finished"
                                );
                            }
                            Ok(_) => {}
                            Err(_) => error!("Lease renewal pass panicked"),
                        }
                    });
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
