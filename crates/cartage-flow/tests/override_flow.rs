//! Manual override tests driven through the service: the forced pairs
//! must match what the normal flow produces, and slot side effects must
//! stay consistent with the corrected request.

use std::sync::Arc;

use cartage_core::{InMemoryDirectory, RequestId, SlotId, SpotName};
use cartage_flow::config::FlowConfig;
use cartage_flow::dispatch::memory::InMemoryDispatchClient;
use cartage_flow::dispatch::{DispatchClient, OrderProgress};
use cartage_flow::error::{Error, Result};
use cartage_flow::reconciler::Reconciler;
use cartage_flow::request::{
    LegSide, PrepStatus, PreparationRequest, RequestClass, StatusPair,
};
use cartage_flow::service::PreparationService;
use cartage_flow::store::memory::InMemoryStore;
use cartage_flow::store::Store;

struct Harness {
    store: Arc<InMemoryStore>,
    dispatch: Arc<InMemoryDispatchClient>,
    service: PreparationService,
    reconciler: Reconciler,
}

fn harness() -> Harness {
    let config = FlowConfig::default();
    let store = Arc::new(InMemoryStore::new(config.buffer_spots()));
    let dispatch = Arc::new(InMemoryDispatchClient::new());
    let directory = Arc::new(InMemoryDirectory::from_entries([
        ("MB-01", "amr-0101"),
        ("MB-02", "amr-0102"),
        ("MB-FG-01", "amr-0901"),
        ("MB-FG-02", "amr-0902"),
        ("PK-01", "amr-0501"),
        ("DY-01", "amr-0301"),
        ("DY-02", "amr-0302"),
        ("DY-05", "amr-0305"),
    ]));
    let service = PreparationService::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&dispatch) as Arc<dyn DispatchClient>,
        directory,
        config.clone(),
    );
    let reconciler = Reconciler::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&dispatch) as Arc<dyn DispatchClient>,
        config,
    );
    Harness {
        store,
        dispatch,
        service,
        reconciler,
    }
}

async fn seed(
    harness: &Harness,
    class: RequestClass,
    fixed: &str,
    candidates: &[&str],
) -> RequestId {
    let request = PreparationRequest::new(
        class,
        SpotName::new(fixed),
        candidates.iter().map(|c| SpotName::new(*c)).collect(),
    )
    .expect("request");
    let id = request.id;
    harness.store.insert_request(request).await.expect("insert");
    id
}

/// Drives a request to the point the normal flow reaches after the
/// outbound leg resolves, and returns the pair it produced.
async fn normal_flow_arrived_pair(harness: &Harness, id: &RequestId) -> StatusPair {
    harness
        .service
        .mark_ready(RequestClass::Part, id, LegSide::Near)
        .await
        .expect("mark ready");
    let request = harness
        .store
        .get_request(RequestClass::Part, id)
        .await
        .expect("get")
        .expect("row");
    let order = request.open_order.expect("order");
    harness
        .dispatch
        .set_progress(order.order_id, OrderProgress::Complete);
    harness.reconciler.tick().await.expect("pass");
    harness
        .store
        .get_request(RequestClass::Part, id)
        .await
        .expect("get")
        .expect("row")
        .status_pair()
}

#[tokio::test]
async fn far_reset_matches_the_normal_flow_pair() -> Result<()> {
    let harness = harness();
    // One request goes through the normal flow...
    let normal = seed(&harness, RequestClass::Part, "DY-01", &["DY-05"]).await;
    let flow_pair = normal_flow_arrived_pair(&harness, &normal).await;

    // ...and a stalled twin is force-corrected to the same point.
    let stalled = seed(&harness, RequestClass::Part, "DY-02", &["DY-05"]).await;
    let outcome = harness
        .service
        .manual_reset(
            RequestClass::Part,
            SpotName::new("DY-02"),
            SpotName::new("DY-05"),
            LegSide::Far,
        )
        .await?;

    assert_eq!(outcome.request_id, stalled);
    assert_eq!(outcome.applied, flow_pair);
    Ok(())
}

#[tokio::test]
async fn near_reset_clears_a_wedged_cycle() -> Result<()> {
    let harness = harness();
    let id = seed(&harness, RequestClass::Part, "DY-01", &["DY-05"]).await;

    // The outbound order is in flight when the operator intervenes.
    harness
        .service
        .mark_ready(RequestClass::Part, &id, LegSide::Near)
        .await?;

    let outcome = harness
        .service
        .manual_reset(
            RequestClass::Part,
            SpotName::new("DY-01"),
            SpotName::new("DY-05"),
            LegSide::Near,
        )
        .await?;
    assert_eq!(
        outcome.applied,
        StatusPair::new(PrepStatus::Prepare, PrepStatus::Waiting)
    );

    // The abandoned order is no longer polled.
    let row = harness
        .store
        .get_request(RequestClass::Part, &id)
        .await?
        .expect("row");
    assert!(row.open_order.is_none());
    let summary = harness.reconciler.tick().await.expect("pass");
    assert_eq!(summary.polled, 0);
    Ok(())
}

#[tokio::test]
async fn buffer_near_reset_frees_slot_and_promotes_queued() -> Result<()> {
    let harness = harness();
    let holder = seed(&harness, RequestClass::Part, "MB-01", &["MB-FG-01"]).await;
    let blocked = seed(&harness, RequestClass::Part, "MB-02", &["MB-FG-01"]).await;

    harness
        .service
        .mark_ready(RequestClass::Part, &holder, LegSide::Near)
        .await?;
    harness
        .service
        .mark_ready(RequestClass::Part, &blocked, LegSide::Near)
        .await?;

    let outcome = harness
        .service
        .manual_reset(
            RequestClass::Part,
            SpotName::new("MB-01"),
            SpotName::new("MB-FG-01"),
            LegSide::Near,
        )
        .await?;

    assert_eq!(outcome.request_id, holder);
    assert_eq!(
        outcome.applied,
        StatusPair::new(PrepStatus::InUse, PrepStatus::Waiting)
    );
    assert_eq!(outcome.promoted, vec![blocked]);

    let slot = harness.store.get_slot(SlotId::BufferA).await?;
    assert!(slot.is_free());
    Ok(())
}

#[tokio::test]
async fn buffer_far_reset_rebinds_the_exact_occupant() -> Result<()> {
    let harness = harness();
    let occupant = seed(&harness, RequestClass::Part, "MB-01", &["MB-FG-01"]).await;
    harness
        .service
        .mark_ready(RequestClass::Part, &occupant, LegSide::Near)
        .await?;

    let outcome = harness
        .service
        .manual_reset(
            RequestClass::Part,
            SpotName::new("MB-01"),
            SpotName::new("MB-FG-01"),
            LegSide::Far,
        )
        .await?;

    assert_eq!(outcome.request_id, occupant);
    assert_eq!(
        outcome.applied,
        StatusPair::new(PrepStatus::Waiting, PrepStatus::Ready)
    );

    // Slot occupancy stays consistent with the corrected request.
    let slot = harness.store.get_slot(SlotId::BufferA).await?;
    assert!(slot.held_by(&occupant));
    assert_eq!(slot.occupant_origin, Some(SpotName::new("MB-01")));
    assert!(slot.is_consistent());

    // The forced state continues through the normal flow.
    let row = harness
        .store
        .get_request(RequestClass::Part, &occupant)
        .await?
        .expect("row");
    assert!(row.open_order.is_none());
    harness
        .service
        .mark_ready(RequestClass::Part, &occupant, LegSide::Far)
        .await?;
    Ok(())
}

#[tokio::test]
async fn pack_near_reset_restores_idle_siblings() -> Result<()> {
    let harness = harness();
    let chosen = seed(&harness, RequestClass::Pack, "PK-01", &["DY-01", "DY-02"]).await;
    let sibling = seed(&harness, RequestClass::Pack, "PK-01", &["DY-02"]).await;
    harness
        .service
        .select_candidate(RequestClass::Pack, &chosen, SpotName::new("DY-01"))
        .await?;

    let outcome = harness
        .service
        .manual_reset(
            RequestClass::Pack,
            SpotName::new("DY-01"),
            SpotName::new("PK-01"),
            LegSide::Near,
        )
        .await?;

    assert_eq!(outcome.request_id, chosen);
    assert_eq!(outcome.siblings_restored, 1);
    let row = harness
        .store
        .get_request(RequestClass::Pack, &sibling)
        .await?
        .expect("row");
    assert!(!row.is_inactive());
    Ok(())
}

#[tokio::test]
async fn failed_reset_commits_nothing() -> Result<()> {
    let harness = harness();
    let id = seed(&harness, RequestClass::Part, "MB-01", &["MB-FG-02"]).await;
    let before = harness
        .store
        .get_request(RequestClass::Part, &id)
        .await?
        .expect("row")
        .status_pair();

    // No request matches this pair and the buffer has no binding.
    let result = harness
        .service
        .manual_reset(
            RequestClass::Part,
            SpotName::new("MB-09"),
            SpotName::new("MB-FG-01"),
            LegSide::Far,
        )
        .await;
    assert!(matches!(result, Err(Error::Integrity { .. })));

    let after = harness
        .store
        .get_request(RequestClass::Part, &id)
        .await?
        .expect("row")
        .status_pair();
    assert_eq!(before, after);
    for slot in harness.service.list_slots().await? {
        assert!(slot.is_free());
    }
    Ok(())
}
