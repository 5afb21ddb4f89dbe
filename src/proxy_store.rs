//! Registry of authoritative proxy snapshots.
//!
//! The dispatcher polls this store to detect out-of-band cancellation
//! while a proxy is waiting for a seat: a control path can set a
//! proxy's status to `Stopping`/`Stopped` here directly, ahead of or
//! instead of calling `stop_proxy`, and the waiter must notice.

use std::ops::Deref;
use std::sync::Arc;

use crate::model::{Proxy, ProxyId};

struct ProxyStoreInner {
    proxies: scc::HashMap<ProxyId, Proxy>,
}

#[derive(Clone)]
pub struct ProxyStore(Arc<ProxyStoreInner>);

impl Deref for ProxyStore {
    type Target = ProxyStoreInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl ProxyStore {
    pub fn new() -> Self {
        Self(Arc::new(ProxyStoreInner {
            proxies: scc::HashMap::new(),
        }))
    }

    pub async fn upsert(&self, proxy: Proxy) {
        match self.proxies.entry_async(proxy.id).await {
            scc::hash_map::Entry::Vacant(entry) => {
                entry.insert_entry(proxy);
            }
            scc::hash_map::Entry::Occupied(mut entry) => {
                *entry = proxy;
            }
        }
    }

    pub async fn remove(&self, proxy_id: ProxyId) {
        self.proxies.remove_async(&proxy_id).await;
    }

    pub async fn get_proxy(&self, proxy_id: ProxyId) -> Option<Proxy> {
        self.proxies.get_async(&proxy_id).await.map(|e| (*e).clone())
    }
}

impl Default for ProxyStore {
    fn default() -> Self {
        Self::new()
    }
}
