//! In-process publish/subscribe for the dispatcher's four event types.
//!
//! The wider system has a driver-backed pub/sub abstraction that can
//! span processes (subjects, chunking, request/reply). Nothing in this
//! crate's contract requires crossing a process boundary, so this is
//! the single-process case of that idea: one `broadcast` channel
//! carrying a tagged [`Event`] enum, with [`EventBus::subscribe`]
//! spawning a task per handler that filters by kind the way a driver's
//! subject routing would.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::Instrument;

use crate::model::{DelegateProxyId, ProxyId, SeatId, SpecId};

const CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone)]
pub struct PendingProxyEvent {
    pub spec_id: SpecId,
    pub proxy_id: ProxyId,
}

#[derive(Debug, Clone)]
pub struct SeatAvailableEvent {
    pub spec_id: SpecId,
    pub intended_proxy_id: Option<ProxyId>,
}

#[derive(Debug, Clone)]
pub struct SeatClaimedEvent {
    pub spec_id: SpecId,
    pub proxy_id: ProxyId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatReleaseReason {
    ProxyStopped,
    ExternalRequest,
}

#[derive(Debug, Clone)]
pub struct SeatReleasedEvent {
    pub spec_id: SpecId,
    pub seat_id: SeatId,
    pub proxy_id: Option<ProxyId>,
    pub reason: SeatReleaseReason,
}

#[derive(Debug, Clone)]
pub enum Event {
    PendingProxy(PendingProxyEvent),
    SeatAvailable(SeatAvailableEvent),
    SeatClaimed(SeatClaimedEvent),
    SeatReleased(SeatReleasedEvent),
}

impl Event {
    pub fn spec_id(&self) -> &str {
        match self {
            Event::PendingProxy(e) => &e.spec_id,
            Event::SeatAvailable(e) => &e.spec_id,
            Event::SeatClaimed(e) => &e.spec_id,
            Event::SeatReleased(e) => &e.spec_id,
        }
    }
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type Handler = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct EventBusInner {
    sender: broadcast::Sender<Event>,
}

/// Cheaply cloneable handle shared by every `Dispatcher` and by the
/// (out-of-scope) scaler.
#[derive(Clone)]
pub struct EventBus(Arc<EventBusInner>);

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self(Arc::new(EventBusInner { sender }))
    }

    /// Publishes best-effort to every current subscriber. If there are
    /// no subscribers the event is simply dropped, matching the
    /// source's at-most-once delivery semantics.
    pub fn publish(&self, event: Event) {
        let _ = self.0.sender.send(event);
    }

    /// Registers `handler` for events of the given kind filter, driven
    /// by a dedicated task reading from a fresh broadcast receiver. A
    /// handler error is logged and the task keeps running; a lagged
    /// receiver (handler too slow) resubscribes and continues rather
    /// than terminating.
    pub fn subscribe<F>(&self, filter: F, handler: Handler)
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        let mut rx = self.0.sender.subscribe();
        tokio::spawn(
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => {
                            if !filter(&event) {
                                continue;
                            }
                            if let Err(err) = handler(event).await {
                                tracing::warn!(?err, "event handler returned an error");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "event subscriber lagged, resuming");
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            .in_current_span(),
        );
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
