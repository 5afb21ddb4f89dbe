//! Crate-wide error taxonomy.
//!
//! Every error that escapes [`crate::dispatcher::Dispatcher::start_proxy`]
//! or [`crate::dispatcher::Dispatcher::stop_proxy`] is a variant of
//! [`DispatchError`] so callers can match on kind instead of parsing a
//! message. Transient failures (a single missed claim, a single dropped
//! event) never escape as errors; they are retried internally and are
//! not represented here at all.

use crate::model::{DelegateProxyId, ProxyId};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// `pauseProxy` / `resumeProxy`: fatal for the requested operation,
    /// not for the dispatcher itself.
    #[error("operation not supported by the shared-proxy dispatcher: {operation}")]
    Unsupported { operation: &'static str },

    /// No seat could be claimed within the attempt budget, or the
    /// delegate lookup failed after a seat was claimed.
    #[error("proxy {proxy_id} failed to start: {reason}")]
    ProxyFailedToStart {
        proxy_id: ProxyId,
        reason: ProxyStartFailure,
    },

    /// A required runtime-value key was looked up before it was
    /// registered, or a required argument was missing. These indicate a
    /// bug in the calling code, not a recoverable runtime condition.
    #[error("programmer fault: {0}")]
    ProgrammerFault(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyStartFailure {
    #[error("no seat became claimable within {attempts} attempts of {wait_unit_secs}s each")]
    WaitBudgetExhausted { attempts: u32, wait_unit_secs: u64 },

    #[error("delegate workload {delegate_id} was missing after its seat was claimed")]
    DelegateMissing { delegate_id: DelegateProxyId },
}

