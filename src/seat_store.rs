//! Inventory of seats on ready delegate workloads.
//!
//! Follows the `Arc<Inner>` + `Deref` shape used for shared mutable
//! state elsewhere in this codebase (see the gateway's shared request
//! table): a cheap handle wraps a `scc::HashMap` keyed by seat id plus a
//! FIFO queue of free seat ids that makes claim order fair without
//! requiring a full scan of the map on every claim.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::event_bus::{Event, EventBus, SeatAvailableEvent, SeatReleaseReason, SeatReleasedEvent};
use crate::metrics;
use crate::model::{DelegateProxyId, ProxyId, Seat, SeatId, SpecId};

struct SeatStoreInner {
    seats: scc::HashMap<SeatId, Seat>,
    free_queue: AsyncMutex<VecDeque<SeatId>>,
    event_bus: EventBus,
}

#[derive(Clone)]
pub struct SeatStore(Arc<SeatStoreInner>);

impl Deref for SeatStore {
    type Target = SeatStoreInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl SeatStore {
    pub fn new(event_bus: EventBus) -> Self {
        Self(Arc::new(SeatStoreInner {
            seats: scc::HashMap::new(),
            free_queue: AsyncMutex::new(VecDeque::new()),
            event_bus,
        }))
    }

    /// Adds a seat belonging to a freshly-ready delegate workload. Not
    /// part of the distilled operation list, but required for the
    /// invariants in the data model to hold across delegate churn.
    pub async fn register_seat(&self, seat: Seat) {
        let spec_id = seat.spec_id.clone();
        let id = seat.id;
        let is_free = !seat.is_claimed();
        let _ = self.seats.insert_async(id, seat).await;
        if is_free {
            self.free_queue.lock().await.push_back(id);
        }
        self.publish_unclaimed_gauge(&spec_id).await;
    }

    /// Removes every seat belonging to `delegate_proxy_id`, claimed or
    /// not. A drained delegate takes its occupants' seats down with it;
    /// the occupant's proxy is expected to be stopped by the caller.
    pub async fn deregister_delegate(&self, delegate_proxy_id: DelegateProxyId) {
        let mut removed_ids = Vec::new();
        self.seats.retain_async(|id, seat| {
            let keep = seat.delegate_proxy_id != delegate_proxy_id;
            if !keep {
                removed_ids.push(*id);
            }
            keep
        }).await;
        if removed_ids.is_empty() {
            return;
        }
        let mut q = self.free_queue.lock().await;
        q.retain(|id| !removed_ids.contains(id));
    }

    #[tracing::instrument(skip_all)]
    pub async fn claim_seat(&self, claimant_proxy_id: ProxyId) -> Option<Seat> {
        let seat_id = {
            let mut q = self.free_queue.lock().await;
            q.pop_front()?
        };
        let claimed = match self.seats.get_async(&seat_id).await {
            Some(mut entry) => {
                entry.claimant_proxy_id = Some(claimant_proxy_id);
                (*entry).clone()
            }
            None => return None,
        };
        metrics::SEATS_CLAIMED_TOTAL
            .with_label_values(&[&claimed.spec_id])
            .inc();
        self.publish_unclaimed_gauge(&claimed.spec_id).await;
        Some(claimed)
    }

    /// Idempotent: releasing an already-free or nonexistent seat is a
    /// no-op, not an error.
    #[tracing::instrument(skip_all)]
    pub async fn release_seat(&self, seat_id: SeatId, proxy_id: Option<ProxyId>, reason: SeatReleaseReason) {
        let released = match self.seats.get_async(&seat_id).await {
            Some(mut entry) => {
                let was_claimed = entry.claimant_proxy_id.take().is_some();
                was_claimed.then(|| (*entry).clone())
            }
            None => None,
        };
        let Some(seat) = released else {
            return;
        };
        self.free_queue.lock().await.push_back(seat_id);
        metrics::SEATS_RELEASED_TOTAL
            .with_label_values(&[&seat.spec_id])
            .inc();
        self.publish_unclaimed_gauge(&seat.spec_id).await;
        self.event_bus.publish(Event::SeatReleased(SeatReleasedEvent {
            spec_id: seat.spec_id.clone(),
            seat_id,
            proxy_id,
            reason,
        }));
        self.event_bus.publish(Event::SeatAvailable(SeatAvailableEvent {
            spec_id: seat.spec_id,
            intended_proxy_id: None,
        }));
    }

    pub async fn get_seat(&self, seat_id: SeatId) -> Option<Seat> {
        self.seats.get_async(&seat_id).await.map(|e| (*e).clone())
    }

    pub async fn num_unclaimed_seats(&self, spec_id: &SpecId) -> usize {
        let mut count = 0;
        self.seats.scan_async(|_, seat| {
            if &seat.spec_id == spec_id && !seat.is_claimed() {
                count += 1;
            }
        }).await;
        count
    }

    pub async fn num_claimed_seats(&self, spec_id: &SpecId) -> usize {
        let mut count = 0;
        self.seats.scan_async(|_, seat| {
            if &seat.spec_id == spec_id && seat.is_claimed() {
                count += 1;
            }
        }).await;
        count
    }

    async fn publish_unclaimed_gauge(&self, spec_id: &SpecId) {
        let count = self.num_unclaimed_seats(spec_id).await;
        metrics::SEATS_UNCLAIMED
            .with_label_values(&[spec_id.as_str()])
            .set(count as i64);
    }
}
