//! Scheduling layer that multiplexes short-lived proxies onto a pool of
//! pre-warmed delegate workload seats.
//!
//! A [`model::Proxy`] arrives through [`dispatcher::Dispatcher::start_proxy`],
//! which claims a free [`model::Seat`] from the [`seat_store::SeatStore`]
//! or waits for one via the [`pending_claims::PendingClaimTable`] and
//! [`event_bus::EventBus`], then retargets the proxy onto the claimed
//! [`model::DelegateProxy`]. [`registry::DispatcherRegistry`] resolves a
//! spec id to its dispatcher.

pub mod config;
pub mod delegate_store;
pub mod dispatcher;
pub mod errors;
pub mod event_bus;
pub mod metrics;
pub mod model;
pub mod pending_claims;
pub mod proxy_store;
pub mod registry;
pub mod seat_store;

pub use delegate_store::DelegateProxyStore;
pub use dispatcher::Dispatcher;
pub use errors::{DispatchError, ProxyStartFailure};
pub use event_bus::EventBus;
pub use model::{DelegateProxy, Proxy, ProxySpec, Seat};
pub use pending_claims::{ClaimOutcome, PendingClaimTable};
pub use proxy_store::ProxyStore;
pub use registry::DispatcherRegistry;
pub use seat_store::SeatStore;
