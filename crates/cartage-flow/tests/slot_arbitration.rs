//! Shared-slot arbitration tests: mutual exclusion, queueing, broadcast
//! promotion, and redirect behavior across the full operator flow.

use std::sync::Arc;

use cartage_core::{InMemoryDirectory, RequestId, SlotId, SpotName};
use cartage_flow::config::FlowConfig;
use cartage_flow::dispatch::memory::InMemoryDispatchClient;
use cartage_flow::dispatch::{DispatchClient, OrderProgress};
use cartage_flow::error::Result;
use cartage_flow::reconciler::Reconciler;
use cartage_flow::request::{LegSide, PrepStatus, PreparationRequest, RequestClass};
use cartage_flow::service::{MarkReadyOutcome, PreparationService};
use cartage_flow::store::memory::InMemoryStore;
use cartage_flow::store::{AcquireOutcome, Store};

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
        ("MB-03", "amr-0103"),
        ("MB-FG-01", "amr-0901"),
        ("MB-FG-02", "amr-0902"),
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

async fn seed_part(harness: &Harness, near: &str, candidates: &[&str]) -> RequestId {
    let request = PreparationRequest::new(
        RequestClass::Part,
        SpotName::new(near),
        candidates.iter().map(|c| SpotName::new(*c)).collect(),
    )
    .expect("request");
    let id = request.id;
    harness.store.insert_request(request).await.expect("insert");
    id
}

/// Resolves the outbound order already in flight, confirms the far side,
/// and resolves the return order.
async fn drive_full_cycle(harness: &Harness, id: &RequestId) -> Result<()> {
    for leg in 0..2 {
        if leg == 1 {
            harness
                .service
                .mark_ready(RequestClass::Part, id, LegSide::Far)
                .await?;
        }
        let request = harness
            .store
            .get_request(RequestClass::Part, id)
            .await?
            .expect("row");
        let order = request.open_order.expect("order in flight");
        harness
            .dispatch
            .set_progress(order.order_id, OrderProgress::Complete);
        harness.reconciler.tick().await.expect("pass ran");
    }
    Ok(())
}

/// Scenario: two part requests target the same buffer; the loser queues
/// and is promoted once the winner's cycle completes.
#[tokio::test]
async fn contended_buffer_queues_then_promotes() -> Result<()> {
    let harness = harness();
    let first = seed_part(&harness, "MB-01", &["MB-FG-01"]).await;
    let second = seed_part(&harness, "MB-02", &["MB-FG-01"]).await;

    let outcome = harness
        .service
        .mark_ready(RequestClass::Part, &first, LegSide::Near)
        .await?;
    assert!(outcome.is_dispatched());
    let slot = harness.store.get_slot(SlotId::BufferA).await?;
    assert!(slot.held_by(&first));
    assert_eq!(slot.occupant_origin, Some(SpotName::new("MB-01")));

    let outcome = harness
        .service
        .mark_ready(RequestClass::Part, &second, LegSide::Near)
        .await?;
    assert!(matches!(outcome, MarkReadyOutcome::Queued));

    // The winner's carrier goes out, is confirmed, and returns.
    drive_full_cycle(&harness, &first).await?;

    // Release promoted the queued request back to its active status.
    let row = harness
        .store
        .get_request(RequestClass::Part, &second)
        .await?
        .expect("row");
    assert_eq!(row.status_near, PrepStatus::InUse);

    let slot = harness.store.get_slot(SlotId::BufferA).await?;
    assert!(slot.is_free());
    Ok(())
}

/// At most one concurrent acquirer succeeds while a slot is occupied; all
/// others observe the occupied outcome.
#[tokio::test]
async fn concurrent_acquisition_is_mutually_exclusive() -> Result<()> {
    let harness = harness();
    let store = Arc::clone(&harness.store);

    let mut handles = Vec::new();
    for i in 0..12 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let request = RequestId::generate();
            store
                .try_acquire_slot(SlotId::BufferB, &request, &SpotName::new(format!("MB-{i:02}")))
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        if handle.await.expect("join")?.is_held() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    Ok(())
}

/// Promotion happens exactly once per release: repeated free/acquire
/// cycles neither double-promote nor starve a queued request.
#[tokio::test]
async fn promotion_is_exactly_once_per_release() -> Result<()> {
    let harness = harness();
    let queued = seed_part(&harness, "MB-02", &["MB-FG-01"]).await;
    {
        let mut request = harness
            .store
            .get_request(RequestClass::Part, &queued)
            .await?
            .expect("row");
        request.mark_queued().expect("queue");
        harness.store.save_request(&request).await?;
    }

    let arbiter = harness.service.arbiter();
    let holder = RequestId::generate();
    arbiter
        .try_acquire(SlotId::BufferA, &holder, &SpotName::new("MB-01"))
        .await?;

    let summary = arbiter.release(SlotId::BufferA).await?;
    assert_eq!(summary.promoted, vec![queued]);

    // Re-acquire and release again: nothing left to promote.
    arbiter
        .try_acquire(SlotId::BufferA, &holder, &SpotName::new("MB-01"))
        .await?;
    let summary = arbiter.release(SlotId::BufferA).await?;
    assert!(summary.promoted.is_empty());
    Ok(())
}

/// A request re-evaluating a slot it already holds must not deadlock
/// against itself.
#[tokio::test]
async fn self_reacquisition_is_a_no_op_success() -> Result<()> {
    let harness = harness();
    let request = RequestId::generate();
    let origin = SpotName::new("MB-01");
    let arbiter = harness.service.arbiter();

    assert_eq!(
        arbiter
            .try_acquire(SlotId::BufferA, &request, &origin)
            .await?,
        AcquireOutcome::Acquired
    );
    assert_eq!(
        arbiter
            .try_acquire(SlotId::BufferA, &request, &origin)
            .await?,
        AcquireOutcome::AlreadyHeld
    );
    Ok(())
}

/// Occupancy of the preferred buffer redirects the request to the other
/// free buffer instead of queueing it.
#[tokio::test]
async fn second_request_lands_in_other_buffer() -> Result<()> {
    let harness = harness();
    let first = seed_part(&harness, "MB-01", &["MB-FG-01", "MB-FG-02"]).await;
    let second = seed_part(&harness, "MB-02", &["MB-FG-01", "MB-FG-02"]).await;
    let third = seed_part(&harness, "MB-03", &["MB-FG-01", "MB-FG-02"]).await;

    harness
        .service
        .mark_ready(RequestClass::Part, &first, LegSide::Near)
        .await?;
    let outcome = harness
        .service
        .mark_ready(RequestClass::Part, &second, LegSide::Near)
        .await?;
    let MarkReadyOutcome::Dispatched { redirected_to, .. } = outcome else {
        panic!("expected dispatch");
    };
    assert_eq!(redirected_to, Some(SpotName::new("MB-FG-02")));

    // Both buffers occupied: the third request queues.
    let outcome = harness
        .service
        .mark_ready(RequestClass::Part, &third, LegSide::Near)
        .await?;
    assert!(matches!(outcome, MarkReadyOutcome::Queued));
    Ok(())
}

/// The slot occupancy pairing invariant holds through a full contended
/// cycle: origin and binding are always set or cleared together.
#[tokio::test]
async fn slot_occupancy_stays_paired() -> Result<()> {
    let harness = harness();
    let id = seed_part(&harness, "MB-01", &["MB-FG-01"]).await;

    harness
        .service
        .mark_ready(RequestClass::Part, &id, LegSide::Near)
        .await?;
    for slot in harness.service.list_slots().await? {
        assert!(slot.is_consistent());
    }

    drive_full_cycle(&harness, &id).await?;
    for slot in harness.service.list_slots().await? {
        assert!(slot.is_consistent());
        assert!(slot.is_free());
    }
    Ok(())
}
