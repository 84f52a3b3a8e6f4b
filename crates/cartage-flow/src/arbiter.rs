//! Slot arbitration over the two shared buffer destinations.
//!
//! Many producers compete for two scarce buffer spots. The arbiter
//! enforces single-occupant mutual exclusion through the store's
//! check-and-set primitives and owns the release side: freeing a slot
//! broadcast-promotes every request that was blocked in `Queue` status.
//!
//! ## Why broadcast promotion
//!
//! No FIFO queue is persisted. Queued requests are distinguished only by
//! their status and are all re-evaluated on every release, because several
//! physically distinct requests may have been queued against the same
//! slot's availability and all become valid again once the backing
//! resource frees. The real bottleneck resolves at the next acquisition,
//! not here.

use std::sync::Arc;

use cartage_core::{RequestId, SlotId, SpotName};

use crate::error::Result;
use crate::request::{PrepStatus, RequestClass};
use crate::slot::SharedSlot;
use crate::store::Store;

pub use crate::store::AcquireOutcome;

/// Summary of a slot release.
#[derive(Debug, Clone)]
pub struct ReleaseSummary {
    /// Requests promoted out of `Queue` status by this release.
    pub promoted: Vec<RequestId>,
}

/// Arbitrates occupancy of the two shared buffer slots.
pub struct SlotArbiter {
    store: Arc<dyn Store>,
    feeder_prefix: String,
}

impl SlotArbiter {
    /// Creates an arbiter over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, feeder_prefix: impl Into<String>) -> Self {
        Self {
            store,
            feeder_prefix: feeder_prefix.into(),
        }
    }

    /// Attempts to bind a slot to a request.
    ///
    /// Atomic with respect to concurrent callers: two requests can never
    /// both observe the same free slot and both succeed. A request that
    /// already holds the slot gets a no-op success.
    ///
    /// # Errors
    ///
    /// Returns storage errors; contention is reported through the outcome,
    /// not as an error.
    #[tracing::instrument(skip(self), fields(slot = %slot, request = %request))]
    pub async fn try_acquire(
        &self,
        slot: SlotId,
        request: &RequestId,
        origin: &SpotName,
    ) -> Result<AcquireOutcome> {
        let outcome = self.store.try_acquire_slot(slot, request, origin).await?;
        crate::metrics::record_acquire(slot, outcome.is_held());
        Ok(outcome)
    }

    /// Binds the preferred slot if free, redirecting to the other buffer
    /// when the preferred one is occupied. Returns the slot actually
    /// bound, or `None` when both buffers are occupied.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn acquire_preferring(
        &self,
        preferred: SlotId,
        request: &RequestId,
        origin: &SpotName,
    ) -> Result<Option<SharedSlot>> {
        let bound = self
            .store
            .acquire_free_slot(preferred, request, origin)
            .await?;
        if let Some(slot) = &bound {
            crate::metrics::record_acquire(slot.id, true);
            if slot.id != preferred {
                tracing::debug!(
                    request = %request,
                    preferred = %preferred,
                    bound = %slot.id,
                    "redirected to free buffer"
                );
            }
        }
        Ok(bound)
    }

    /// Frees a slot and re-evaluates every queued request.
    ///
    /// Promotion is per-request check-and-set (`Queue` back to the active
    /// pair), so a request is promoted at most once per release and
    /// repeated releases cannot double-promote.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    #[tracing::instrument(skip(self), fields(slot = %slot))]
    pub async fn release(&self, slot: SlotId) -> Result<ReleaseSummary> {
        self.store.release_slot(slot).await?;
        let promoted = self.store.promote_queued(&self.feeder_prefix).await?;
        if !promoted.is_empty() {
            tracing::info!(slot = %slot, promoted = promoted.len(), "queued requests promoted");
        }
        crate::metrics::record_release(slot, promoted.len());
        Ok(ReleaseSummary { promoted })
    }

    /// Number of requests currently queued against a slot's spot.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn queue_len(&self, slot: SlotId) -> Result<usize> {
        let slot_row = self.store.get_slot(slot).await?;
        let requests = self.store.list_requests(RequestClass::Part).await?;
        Ok(requests
            .iter()
            .filter(|request| {
                request.status_near == PrepStatus::Queue && request.selected == slot_row.spot
            })
            .count())
    }
}
