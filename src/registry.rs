//! Per-process map from spec id to its live [`Dispatcher`].
//!
//! A [`Dispatcher`] is instantiated per [`crate::model::ProxySpec`], but
//! admission only knows a spec id at the point it needs to call
//! `start_proxy`. This registry is the minimal wiring that lets a spec
//! id resolve to the dispatcher that owns its pending-claim table,
//! lazily constructing one (and subscribing it to the shared event bus)
//! the first time a spec is seen.

use std::sync::Arc;

use crate::config::ProxySharing;
use crate::delegate_store::DelegateProxyStore;
use crate::dispatcher::Dispatcher;
use crate::event_bus::EventBus;
use crate::model::{ProxySpec, SpecId};
use crate::proxy_store::ProxyStore;
use crate::seat_store::SeatStore;

struct DispatcherRegistryInner {
    dispatchers: scc::HashMap<SpecId, Dispatcher>,
    seat_store: SeatStore,
    delegate_store: DelegateProxyStore,
    proxy_store: ProxyStore,
    event_bus: EventBus,
    config: ProxySharing,
}

#[derive(Clone)]
pub struct DispatcherRegistry(Arc<DispatcherRegistryInner>);

impl DispatcherRegistry {
    pub fn new(
        seat_store: SeatStore,
        delegate_store: DelegateProxyStore,
        proxy_store: ProxyStore,
        event_bus: EventBus,
        config: ProxySharing,
    ) -> Self {
        Self(Arc::new(DispatcherRegistryInner {
            dispatchers: scc::HashMap::new(),
            seat_store,
            delegate_store,
            proxy_store,
            event_bus,
            config,
        }))
    }

    /// Returns the dispatcher for `spec`, constructing it the first
    /// time this spec id is seen. Specs are immutable at runtime, so
    /// once built, a dispatcher is reused for the lifetime of the
    /// process; there is no eviction path.
    pub async fn dispatcher_for(&self, spec: ProxySpec) -> Dispatcher {
        if let Some(existing) = self.0.dispatchers.get_async(&spec.id).await {
            return (*existing).clone();
        }

        let inner = &self.0;
        let built = Dispatcher::new(
            spec.clone(),
            inner.seat_store.clone(),
            inner.delegate_store.clone(),
            inner.proxy_store.clone(),
            inner.event_bus.clone(),
            inner.config.clone(),
        );

        match self.0.dispatchers.entry_async(spec.id.clone()).await {
            scc::hash_map::Entry::Vacant(entry) => {
                entry.insert_entry(built.clone());
                built
            }
            scc::hash_map::Entry::Occupied(entry) => (*entry).clone(),
        }
    }
}
