//! Per-dispatcher table of proxies waiting for a seat.
//!
//! Modeled the same way the gateway's route cache models a keyed
//! TTL-expiring value ([`moka::future::Cache`]): a write-TTL cache
//! keyed by proxy id, with explicit `insert`/`invalidate` rather than
//! relying on eviction to carry any signal. Eviction here genuinely
//! delivers nothing to the waiter — the waiter's own per-attempt
//! timeout and its poll of [`crate::proxy_store::ProxyStore`] are what
//! keep it moving if the entry silently disappears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Notify;

use crate::model::ProxyId;

/// Outcome of one wait on a [`PendingClaimHandle`]. Replaces the
/// source's catch-block-per-exception-type control flow with an
/// explicit three-way result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// A seat may be available; the caller should re-attempt `claim_seat`.
    Completed,
    /// The proxy was stopped externally; the caller must not claim a seat.
    Cancelled,
    /// No signal arrived within the wait unit; re-attempt anyway as a
    /// defense against a missed event.
    TimedOut,
}

struct PendingClaimState {
    notify: Notify,
    cancelled: AtomicBool,
}

/// Cheaply cloneable handle to one waiter's completion signal.
#[derive(Clone)]
pub struct PendingClaimHandle {
    state: Arc<PendingClaimState>,
}

impl PendingClaimHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(PendingClaimState {
                notify: Notify::new(),
                cancelled: AtomicBool::new(false),
            }),
        }
    }

    /// Wakes the waiter with a hint that a seat may now be claimable.
    pub fn signal_completed(&self) {
        self.state.notify.notify_waiters();
    }

    /// Wakes the waiter and marks the claim as cancelled; the waiter
    /// must not claim a seat after observing this.
    pub fn signal_cancelled(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Waits up to `wait_unit` for a signal, returning the outcome.
    pub async fn wait(&self, wait_unit: Duration) -> ClaimOutcome {
        if self.state.cancelled.load(Ordering::Acquire) {
            return ClaimOutcome::Cancelled;
        }
        let notified = self.state.notify.notified();
        match tokio::time::timeout(wait_unit, notified).await {
            Ok(()) => {
                if self.state.cancelled.load(Ordering::Acquire) {
                    ClaimOutcome::Cancelled
                } else {
                    ClaimOutcome::Completed
                }
            }
            Err(_) => ClaimOutcome::TimedOut,
        }
    }
}

pub struct PendingClaimTable {
    cache: Cache<ProxyId, PendingClaimHandle>,
}

impl PendingClaimTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// Inserts a new waiter for `proxy_id`. Callers must not start a
    /// second concurrent claim for the same proxy; doing so is
    /// undefined per the contract this table implements.
    #[tracing::instrument(skip_all)]
    pub async fn insert(&self, proxy_id: ProxyId) -> PendingClaimHandle {
        let handle = PendingClaimHandle::new();
        self.cache.insert(proxy_id, handle.clone()).await;
        handle
    }

    #[tracing::instrument(skip_all)]
    pub async fn get_if_present(&self, proxy_id: ProxyId) -> Option<PendingClaimHandle> {
        self.cache.get(&proxy_id).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn invalidate(&self, proxy_id: ProxyId) {
        self.cache.invalidate(&proxy_id).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
