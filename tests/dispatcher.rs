use std::time::Duration;

use rivet_proxy_sharing::config::ProxySharing;
use rivet_proxy_sharing::delegate_store::DelegateProxyStore;
use rivet_proxy_sharing::dispatcher::Dispatcher;
use rivet_proxy_sharing::errors::{DispatchError, ProxyStartFailure};
use rivet_proxy_sharing::event_bus::{Event, EventBus, SeatAvailableEvent, SeatReleaseReason};
use rivet_proxy_sharing::model::{
    AuthBackend, ContainerSpec, DelegateProxy, Proxy, ProxySpec, RuntimeValueHolder,
    RuntimeValueKey, RuntimeValue, Seat,
};
use rivet_proxy_sharing::model::ProxyStatus;
use rivet_proxy_sharing::proxy_store::ProxyStore;
use rivet_proxy_sharing::seat_store::SeatStore;
use uuid::Uuid;

fn fast_config() -> ProxySharing {
    ProxySharing {
        wait_unit_seconds: Some(1),
        max_attempts: Some(3),
        pending_claim_ttl_ms: Some(10 * 60 * 1000),
    }
}

fn test_spec(spec_id: &str) -> ProxySpec {
    ProxySpec {
        id: spec_id.to_string(),
        container: ContainerSpec {
            id: "template".into(),
            image: "rstudio/rstudio".into(),
        },
        auth_backend: AuthBackend::None,
        sharing: Some(rivet_proxy_sharing::model::ProxySharingExtension {
            minimum_seats_available: 2,
        }),
    }
}

fn new_proxy(spec_id: &str) -> Proxy {
    Proxy::new(
        Uuid::new_v4(),
        spec_id.to_string(),
        "alice",
        ContainerSpec {
            id: Uuid::new_v4().to_string(),
            image: "rstudio/rstudio".into(),
        },
        0,
    )
}

struct Harness {
    dispatcher: Dispatcher,
    seat_store: SeatStore,
    delegate_store: DelegateProxyStore,
    proxy_store: ProxyStore,
    event_bus: EventBus,
    spec_id: String,
}

async fn harness(spec_id: &str, config: ProxySharing) -> Harness {
    let event_bus = EventBus::new();
    let seat_store = SeatStore::new(event_bus.clone());
    let delegate_store = DelegateProxyStore::new();
    let proxy_store = ProxyStore::new();
    let spec = test_spec(spec_id);
    let dispatcher = Dispatcher::new(
        spec,
        seat_store.clone(),
        delegate_store.clone(),
        proxy_store.clone(),
        event_bus.clone(),
        config,
    );
    Harness {
        dispatcher,
        seat_store,
        delegate_store,
        proxy_store,
        event_bus,
        spec_id: spec_id.to_string(),
    }
}

async fn add_delegate_with_seats(h: &Harness, delegate_id: Uuid, targets: Vec<String>, n_seats: usize) -> Vec<Uuid> {
    h.delegate_store
        .register_delegate(DelegateProxy {
            id: delegate_id,
            spec_id: h.spec_id.clone(),
            targets,
        })
        .await;
    let mut seat_ids = Vec::new();
    for _ in 0..n_seats {
        let seat_id = Uuid::new_v4();
        h.seat_store
            .register_seat(Seat {
                id: seat_id,
                delegate_proxy_id: delegate_id,
                spec_id: h.spec_id.clone(),
                claimant_proxy_id: None,
            })
            .await;
        seat_ids.push(seat_id);
    }
    seat_ids
}

// S1 - immediate claim
#[tokio::test]
async fn immediate_claim_retargets_proxy() {
    let h = harness("spec-s1", fast_config()).await;
    let delegate_id = Uuid::new_v4();
    let seat_ids = add_delegate_with_seats(&h, delegate_id, vec!["http://d1:8080".into()], 2).await;

    let proxy = new_proxy(&h.spec_id);
    let original_container_id = proxy.container.id.clone();
    let result = h.dispatcher.start_proxy(proxy).await.unwrap();

    assert_eq!(
        result.get(RuntimeValueKey::TARGET_ID).unwrap().as_str().unwrap(),
        delegate_id.to_string()
    );
    assert!(result.targets.contains(&"http://d1:8080".to_string()));
    let claimed_seat = result.get(RuntimeValueKey::SEAT_ID).unwrap().as_str().unwrap().to_string();
    assert!(seat_ids.iter().any(|id| id.to_string() == claimed_seat));
    assert_ne!(result.container.id, original_container_id);
    assert_eq!(h.seat_store.num_claimed_seats(&h.spec_id).await, 1);
}

// S2 - wait then wake via an explicit intended SeatAvailableEvent
#[tokio::test(flavor = "multi_thread")]
async fn wait_then_wake_on_intended_event() {
    let h = harness("spec-s2", fast_config()).await;
    // zero free seats initially; the delegate has one seat, pre-claimed
    // by an unrelated proxy so start_proxy must wait.
    let delegate_id = Uuid::new_v4();
    let seat_ids = add_delegate_with_seats(&h, delegate_id, vec!["http://d2:8080".into()], 1).await;
    let occupying_seat = h.seat_store.claim_seat(Uuid::new_v4()).await.unwrap();
    assert_eq!(occupying_seat.id, seat_ids[0]);

    let proxy = new_proxy(&h.spec_id);
    h.proxy_store.upsert(proxy.clone()).await;
    let proxy_id = proxy.id;

    let waiter = {
        let dispatcher = h.dispatcher.clone();
        tokio::spawn(async move { dispatcher.start_proxy(proxy).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.seat_store
        .release_seat(occupying_seat.id, None, SeatReleaseReason::ExternalRequest)
        .await;
    h.event_bus.publish(Event::SeatAvailable(SeatAvailableEvent {
        spec_id: h.spec_id.clone(),
        intended_proxy_id: Some(proxy_id),
    }));

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter did not finish in time")
        .unwrap()
        .unwrap();

    assert_eq!(
        result.get(RuntimeValueKey::SEAT_ID).unwrap().as_str().unwrap(),
        occupying_seat.id.to_string()
    );
}

// S3 - external stop while waiting
#[tokio::test(flavor = "multi_thread")]
async fn external_stop_while_waiting_returns_input_unchanged() {
    let h = harness("spec-s3", fast_config()).await;
    // no delegates/seats registered at all: every claim attempt misses.

    let mut proxy = new_proxy(&h.spec_id);
    proxy = proxy.with_status(ProxyStatus::Starting);
    h.proxy_store.upsert(proxy.clone()).await;
    let proxy_id = proxy.id;
    let input_container_id = proxy.container.id.clone();

    let waiter = {
        let dispatcher = h.dispatcher.clone();
        let proxy = proxy.clone();
        tokio::spawn(async move { dispatcher.start_proxy(proxy).await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let mut stopped = h.proxy_store.get_proxy(proxy_id).await.unwrap();
    stopped = stopped.with_status(ProxyStatus::Stopping);
    h.proxy_store.upsert(stopped.clone()).await;
    h.dispatcher.stop_proxy(&stopped, SeatReleaseReason::ExternalRequest).await;

    let result = tokio::time::timeout(Duration::from_secs(2), waiter)
        .await
        .expect("waiter did not finish in time")
        .unwrap()
        .unwrap();

    assert_eq!(result.container.id, input_container_id);
    assert_eq!(h.seat_store.num_claimed_seats(&h.spec_id).await, 0);
}

// S4 - a dropped/no-op wake is recovered by the waiter's own timeout
#[tokio::test(flavor = "multi_thread")]
async fn missed_event_self_heals_via_timeout() {
    let h = harness("spec-s4", fast_config()).await;
    let delegate_id = Uuid::new_v4();
    let seat_ids = add_delegate_with_seats(&h, delegate_id, vec!["http://d4:8080".into()], 1).await;
    let occupying_seat = h.seat_store.claim_seat(Uuid::new_v4()).await.unwrap();
    assert_eq!(occupying_seat.id, seat_ids[0]);

    let proxy = new_proxy(&h.spec_id);
    h.proxy_store.upsert(proxy.clone()).await;

    let waiter = {
        let dispatcher = h.dispatcher.clone();
        tokio::spawn(async move { dispatcher.start_proxy(proxy).await })
    };

    // Released without ever publishing an intended event: the generic
    // broadcast release_seat emits (intended_proxy_id = None) is a
    // no-op for this waiter per spec, so it must fall back to its own
    // per-attempt timeout to notice the seat is free again.
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.seat_store
        .release_seat(occupying_seat.id, None, SeatReleaseReason::ExternalRequest)
        .await;

    let result = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .expect("waiter did not finish in time")
        .unwrap()
        .unwrap();

    assert_eq!(
        result.get(RuntimeValueKey::SEAT_ID).unwrap().as_str().unwrap(),
        occupying_seat.id.to_string()
    );
}

// S5 - PublicPath retargeting
#[tokio::test]
async fn public_path_is_retargeted_to_delegate_id() {
    let h = harness("spec-s5", fast_config()).await;
    let delegate_id = Uuid::new_v4();
    add_delegate_with_seats(&h, delegate_id, vec!["http://d5:8080".into()], 1).await;

    let proxy = new_proxy(&h.spec_id);
    let proxy_id = proxy.id;
    let proxy = proxy.with_runtime_value(
        RuntimeValueKey::PUBLIC_PATH,
        RuntimeValue::String(format!("/app/{proxy_id}/")),
    );

    let result = h.dispatcher.start_proxy(proxy).await.unwrap();
    let path = result
        .get(RuntimeValueKey::PUBLIC_PATH)
        .unwrap()
        .as_str()
        .unwrap();
    assert_eq!(path, format!("/app/{delegate_id}/"));
}

// S6 - seat leak prevention when the delegate disappears after claim
#[tokio::test]
async fn delegate_missing_after_claim_releases_seat() {
    let h = harness("spec-s6", fast_config()).await;
    let delegate_id = Uuid::new_v4();
    add_delegate_with_seats(&h, delegate_id, vec!["http://d6:8080".into()], 1).await;
    // simulate the delegate being retired between claim and lookup
    h.delegate_store.remove_delegate(delegate_id).await;

    let unclaimed_before = h.seat_store.num_unclaimed_seats(&h.spec_id).await;
    let proxy = new_proxy(&h.spec_id);
    let err = h.dispatcher.start_proxy(proxy).await.unwrap_err();

    match err {
        DispatchError::ProxyFailedToStart {
            reason: ProxyStartFailure::DelegateMissing { delegate_id: missing },
            ..
        } => assert_eq!(missing, delegate_id),
        other => panic!("expected DelegateMissing, got {other:?}"),
    }
    assert_eq!(h.seat_store.num_unclaimed_seats(&h.spec_id).await, unclaimed_before);
}

#[tokio::test]
async fn pause_and_resume_are_unsupported() {
    let h = harness("spec-pause", fast_config()).await;
    assert!(!h.dispatcher.supports_pause());
    assert!(matches!(
        h.dispatcher.pause_proxy(),
        Err(DispatchError::Unsupported { .. })
    ));
    assert!(matches!(
        h.dispatcher.resume_proxy(),
        Err(DispatchError::Unsupported { .. })
    ));
}

#[tokio::test]
async fn release_seat_is_idempotent() {
    let h = harness("spec-idem", fast_config()).await;
    let delegate_id = Uuid::new_v4();
    let seat_ids = add_delegate_with_seats(&h, delegate_id, vec!["http://d7:8080".into()], 1).await;
    let seat = h.seat_store.claim_seat(Uuid::new_v4()).await.unwrap();
    assert_eq!(seat.id, seat_ids[0]);

    h.seat_store.release_seat(seat.id, None, SeatReleaseReason::ExternalRequest).await;
    h.seat_store.release_seat(seat.id, None, SeatReleaseReason::ExternalRequest).await;

    assert_eq!(h.seat_store.num_unclaimed_seats(&h.spec_id).await, 1);
    assert_eq!(h.seat_store.num_claimed_seats(&h.spec_id).await, 0);
}

// Property 8 - internal-only runtime values (SeatId, DelegateProxy)
// never cross the wire; API-facing ones (TargetId, PublicPath) do.
#[test]
fn serialized_proxy_drops_internal_runtime_values() {
    let proxy = new_proxy("spec-wire")
        .with_runtime_value(RuntimeValueKey::SEAT_ID, RuntimeValue::String("seat-1".into()))
        .with_runtime_value(
            RuntimeValueKey::DELEGATE_PROXY,
            RuntimeValue::String("http://delegate:8080".into()),
        )
        .with_runtime_value(RuntimeValueKey::TARGET_ID, RuntimeValue::String("target-1".into()))
        .with_runtime_value(RuntimeValueKey::PUBLIC_PATH, RuntimeValue::String("/app/x/".into()));

    let json = serde_json::to_value(&proxy).unwrap();
    let wire_values = json.get("runtime_values").unwrap().as_object().unwrap();

    assert!(!wire_values.contains_key("SeatId"));
    assert!(!wire_values.contains_key("DelegateProxy"));
    assert_eq!(wire_values.get("TargetId").unwrap(), "target-1");
    assert_eq!(wire_values.get("PublicPath").unwrap(), "/app/x/");

    let round_tripped: Proxy = serde_json::from_value(json).unwrap();
    assert_eq!(round_tripped.get(RuntimeValueKey::SEAT_ID), None);
    assert_eq!(round_tripped.get(RuntimeValueKey::DELEGATE_PROXY), None);
    assert_eq!(
        round_tripped.get(RuntimeValueKey::TARGET_ID).unwrap().as_str().unwrap(),
        "target-1"
    );
}

#[tokio::test]
async fn wait_budget_exhausted_fails_with_no_seats_at_all() {
    let mut config = fast_config();
    config.max_attempts = Some(2);
    config.wait_unit_seconds = Some(0);
    let h = harness("spec-exhaust", config).await;
    // no delegates registered: claim_seat always misses.

    let proxy = new_proxy(&h.spec_id);
    let err = h.dispatcher.start_proxy(proxy).await.unwrap_err();
    match err {
        DispatchError::ProxyFailedToStart {
            reason: ProxyStartFailure::WaitBudgetExhausted { attempts, .. },
            ..
        } => assert_eq!(attempts, 2),
        other => panic!("expected WaitBudgetExhausted, got {other:?}"),
    }
}
