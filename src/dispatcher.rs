//! The per-spec orchestrator: claims a seat for an arriving proxy,
//! waits and retries when none is free, and releases seats on stop.

use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::config::ProxySharing;
use crate::delegate_store::DelegateProxyStore;
use crate::errors::{DispatchError, ProxyStartFailure};
use crate::event_bus::{
    Event, EventBus, PendingProxyEvent, SeatAvailableEvent, SeatClaimedEvent, SeatReleaseReason,
};
use crate::metrics;
use crate::model::{Proxy, ProxySpec, RuntimeValueHolder, RuntimeValueKey, Seat};
use crate::pending_claims::{ClaimOutcome, PendingClaimTable};
use crate::proxy_store::ProxyStore;
use crate::seat_store::SeatStore;

struct DispatcherInner {
    spec: ProxySpec,
    seat_store: SeatStore,
    delegate_store: DelegateProxyStore,
    proxy_store: ProxyStore,
    event_bus: EventBus,
    pending_claims: PendingClaimTable,
    config: ProxySharing,
}

/// A [`Dispatcher`] owns exactly one [`PendingClaimTable`] and exists
/// per [`ProxySpec`]; see [`crate::registry::DispatcherRegistry`] for
/// how one is obtained for a given spec id.
#[derive(Clone)]
pub struct Dispatcher(Arc<DispatcherInner>);

impl Dispatcher {
    pub fn new(
        spec: ProxySpec,
        seat_store: SeatStore,
        delegate_store: DelegateProxyStore,
        proxy_store: ProxyStore,
        event_bus: EventBus,
        config: ProxySharing,
    ) -> Self {
        let pending_claims = PendingClaimTable::new(config.pending_claim_ttl());
        let dispatcher = Self(Arc::new(DispatcherInner {
            spec,
            seat_store,
            delegate_store,
            proxy_store,
            event_bus: event_bus.clone(),
            pending_claims,
            config,
        }));

        let subscriber = dispatcher.clone();
        let spec_id = dispatcher.0.spec.id.clone();
        event_bus.subscribe(
            move |event| matches!(event, Event::SeatAvailable(e) if e.spec_id == spec_id),
            Arc::new(move |event| {
                let subscriber = subscriber.clone();
                Box::pin(async move {
                    if let Event::SeatAvailable(evt) = event {
                        subscriber.on_seat_available_event(&evt).await;
                    }
                    Ok(())
                })
            }),
        );

        dispatcher
    }

    pub fn spec_id(&self) -> &str {
        &self.0.spec.id
    }

    /// `IProxyDispatcher::supportsPause`, always `false` for shared proxies.
    pub fn supports_pause(&self) -> bool {
        false
    }

    /// Placeholder hook mirrored from the source's pre-SpEL runtime
    /// value injection point. Left as the identity: nothing in this
    /// crate's contract populates it, and no policy evaluation stage
    /// exists here to feed.
    pub fn add_runtime_values_before_spel(&self, proxy: Proxy) -> Proxy {
        proxy
    }

    pub fn pause_proxy(&self) -> Result<(), DispatchError> {
        Err(DispatchError::Unsupported {
            operation: "pauseProxy",
        })
    }

    pub fn resume_proxy(&self) -> Result<(), DispatchError> {
        Err(DispatchError::Unsupported {
            operation: "resumeProxy",
        })
    }

    #[tracing::instrument(skip_all, fields(proxy_id = %proxy.id, spec_id = %self.0.spec.id))]
    pub async fn start_proxy(&self, proxy: Proxy) -> Result<Proxy, DispatchError> {
        let inner = &self.0;
        let start = Instant::now();

        if let Some(seat) = inner.seat_store.claim_seat(proxy.id).await {
            return self.finish_claim(proxy, seat, start).await;
        }

        tracing::debug!("no free seat, entering wait loop");
        let handle = inner.pending_claims.insert(proxy.id).await;
        inner.event_bus.publish(Event::PendingProxy(PendingProxyEvent {
            spec_id: inner.spec.id.clone(),
            proxy_id: proxy.id,
        }));
        metrics::PENDING_CLAIMS
            .with_label_values(&[inner.spec.id.as_str()])
            .inc();

        let wait_unit = inner.config.wait_unit();
        let max_attempts = inner.config.max_attempts();

        let mut claimed_seat: Option<Seat> = None;
        let mut cancelled = false;
        let mut exhausted = true;

        for attempt in 0..max_attempts {
            let outcome = handle.wait(wait_unit).await;
            tracing::debug!(attempt, ?outcome, "seat wait attempt");

            if matches!(outcome, ClaimOutcome::Cancelled) {
                cancelled = true;
                exhausted = false;
                break;
            }

            match inner.proxy_store.get_proxy(proxy.id).await {
                None => {
                    cancelled = true;
                    exhausted = false;
                    break;
                }
                Some(current) if current.status.is_terminal_for_waiters() => {
                    cancelled = true;
                    exhausted = false;
                    break;
                }
                _ => {}
            }

            if let Some(seat) = inner.seat_store.claim_seat(proxy.id).await {
                claimed_seat = Some(seat);
                exhausted = false;
                break;
            }
        }

        inner.pending_claims.invalidate(proxy.id).await;
        metrics::PENDING_CLAIMS
            .with_label_values(&[inner.spec.id.as_str()])
            .dec();

        if cancelled {
            tracing::info!("proxy start cancelled while waiting for a seat");
            return Ok(proxy);
        }

        if let Some(seat) = claimed_seat {
            return self.finish_claim(proxy, seat, start).await;
        }

        debug_assert!(exhausted);
        tracing::warn!(attempts = max_attempts, "exhausted wait budget for a seat");
        Err(DispatchError::ProxyFailedToStart {
            proxy_id: proxy.id,
            reason: ProxyStartFailure::WaitBudgetExhausted {
                attempts: max_attempts,
                wait_unit_secs: wait_unit.as_secs(),
            },
        })
    }

    async fn finish_claim(&self, proxy: Proxy, seat: Seat, start: Instant) -> Result<Proxy, DispatchError> {
        let inner = &self.0;
        inner.event_bus.publish(Event::SeatClaimed(SeatClaimedEvent {
            spec_id: inner.spec.id.clone(),
            proxy_id: proxy.id,
        }));
        metrics::SEAT_WAIT_SECONDS
            .with_label_values(&[inner.spec.id.as_str()])
            .observe(start.elapsed().as_secs_f64());

        let delegate = match inner.delegate_store.get_delegate_proxy(seat.delegate_proxy_id).await {
            Some(delegate) => delegate,
            None => {
                inner
                    .seat_store
                    .release_seat(seat.id, None, SeatReleaseReason::ExternalRequest)
                    .await;
                return Err(DispatchError::ProxyFailedToStart {
                    proxy_id: proxy.id,
                    reason: ProxyStartFailure::DelegateMissing {
                        delegate_id: seat.delegate_proxy_id,
                    },
                });
            }
        };

        let new_container_id = Uuid::new_v4().to_string();
        let retargeted = proxy.retargeted(delegate.id, seat.id, &delegate.targets, new_container_id);
        tracing::info!(seat_id = %seat.id, delegate_id = %delegate.id, "proxy installed onto delegate workload");
        Ok(retargeted)
    }

    #[tracing::instrument(skip_all, fields(proxy_id = %proxy.id))]
    pub async fn stop_proxy(&self, proxy: &Proxy, reason: SeatReleaseReason) {
        let inner = &self.0;

        if let Some(seat_id) = proxy
            .get(RuntimeValueKey::SEAT_ID)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
        {
            inner.seat_store.release_seat(seat_id, Some(proxy.id), reason).await;
        }

        if let Some(handle) = inner.pending_claims.get_if_present(proxy.id).await {
            handle.signal_cancelled();
            inner.pending_claims.invalidate(proxy.id).await;
        }
    }

    async fn on_seat_available_event(&self, evt: &SeatAvailableEvent) {
        let Some(intended) = evt.intended_proxy_id else {
            return;
        };
        if let Some(handle) = self.0.pending_claims.get_if_present(intended).await {
            handle.signal_completed();
            self.0.pending_claims.invalidate(intended).await;
        }
    }
}
