//! Registry of delegate workloads (the real backends that host seats).

use std::ops::Deref;
use std::sync::Arc;

use crate::model::{DelegateProxy, DelegateProxyId};

struct DelegateProxyStoreInner {
    delegates: scc::HashMap<DelegateProxyId, DelegateProxy>,
}

#[derive(Clone)]
pub struct DelegateProxyStore(Arc<DelegateProxyStoreInner>);

impl Deref for DelegateProxyStore {
    type Target = DelegateProxyStoreInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DelegateProxyStore {
    pub fn new() -> Self {
        Self(Arc::new(DelegateProxyStoreInner {
            delegates: scc::HashMap::new(),
        }))
    }

    pub async fn register_delegate(&self, delegate: DelegateProxy) {
        match self.delegates.entry_async(delegate.id).await {
            scc::hash_map::Entry::Vacant(entry) => {
                entry.insert_entry(delegate);
            }
            scc::hash_map::Entry::Occupied(mut entry) => {
                *entry = delegate;
            }
        }
    }

    pub async fn remove_delegate(&self, delegate_id: DelegateProxyId) {
        self.delegates.remove_async(&delegate_id).await;
    }

    /// Returns the delegate's current endpoints. `None` signals
    /// `DelegateMissing`: the delegate was retired between a seat claim
    /// and this read.
    #[tracing::instrument(skip_all)]
    pub async fn get_delegate_proxy(&self, delegate_id: DelegateProxyId) -> Option<DelegateProxy> {
        self.delegates.get_async(&delegate_id).await.map(|e| (*e).clone())
    }
}

impl Default for DelegateProxyStore {
    fn default() -> Self {
        Self::new()
    }
}
