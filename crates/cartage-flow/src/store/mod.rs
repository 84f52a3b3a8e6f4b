//! Pluggable storage for ledger and slot state.
//!
//! The [`Store`] trait defines the persistence layer for the two request
//! collections and the two shared slot rows.
//!
//! ## Design Principles
//!
//! - **Atomic methods**: every trait method is one atomic unit. There is
//!   no in-process locking primitive shared between the reconciler and the
//!   operator-facing handlers; all mutual exclusion is expressed through
//!   these methods.
//! - **CAS semantics**: slot acquisition is a transactional check-and-set.
//!   A read-then-write across two calls is a race and must not be used for
//!   acquisition decisions.
//! - **Testability**: the in-memory implementation serializes every method
//!   behind a single lock; a relational implementation must use row-level
//!   locking or serializable transactions to provide the same guarantee.

pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;

use cartage_core::{RequestId, SlotId, SpotName};

use crate::error::Result;
use crate::request::{PrepStatus, PreparationRequest, RequestClass};
use crate::slot::SharedSlot;
use crate::troubleshoot::{ResetOutcome, ResetSpec};

/// Result of a slot acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The slot was free and is now bound to the caller.
    Acquired,
    /// The slot was already bound to the caller's own request (no-op).
    AlreadyHeld,
    /// The slot is bound to another request; the caller must queue.
    Occupied {
        /// The request currently holding the slot, if its binding is known.
        held_by: Option<RequestId>,
    },
}

impl AcquireOutcome {
    /// Returns true if the caller holds the slot after the call.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        matches!(self, Self::Acquired | Self::AlreadyHeld)
    }
}

/// The persisted state layout, materialized.
///
/// Two parallel request collections sharing one schema, plus the two-row
/// slot table and the seeded tag catalog. This is the unit a transactional
/// backend locks when executing the composite operations ([`Store::apply_reset`]):
/// select the affected rows for update, run the pure planner, write back,
/// commit.
#[derive(Debug, Default, Clone)]
pub struct StoreState {
    /// Part request collection, keyed by id (ids sort by creation time).
    pub parts: BTreeMap<RequestId, PreparationRequest>,
    /// Pack request collection, keyed by id.
    pub packs: BTreeMap<RequestId, PreparationRequest>,
    /// The two shared slot rows.
    pub slots: Vec<SharedSlot>,
    /// Seeded auxiliary tag catalog.
    pub tags: Vec<String>,
}

impl StoreState {
    /// Returns the request collection for a class.
    #[must_use]
    pub const fn requests(&self, class: RequestClass) -> &BTreeMap<RequestId, PreparationRequest> {
        match class {
            RequestClass::Part => &self.parts,
            RequestClass::Pack => &self.packs,
        }
    }

    /// Returns the mutable request collection for a class.
    pub fn requests_mut(
        &mut self,
        class: RequestClass,
    ) -> &mut BTreeMap<RequestId, PreparationRequest> {
        match class {
            RequestClass::Part => &mut self.parts,
            RequestClass::Pack => &mut self.packs,
        }
    }

    /// Finds the slot occupying a spot.
    #[must_use]
    pub fn slot_by_spot(&self, spot: &SpotName) -> Option<&SharedSlot> {
        self.slots.iter().find(|slot| &slot.spot == spot)
    }

    /// Finds the most recent request of a class matching a (near, far) pair.
    ///
    /// Ids encode creation time, so "most recent" is the highest id.
    #[must_use]
    pub fn latest_by_pair(
        &self,
        class: RequestClass,
        near: &SpotName,
        far: &SpotName,
    ) -> Option<&PreparationRequest> {
        self.requests(class)
            .values()
            .rev()
            .find(|request| request.matches_pair(near, far))
    }

    /// Iterates over both collections.
    pub fn all_requests(&self) -> impl Iterator<Item = &PreparationRequest> {
        self.parts.values().chain(self.packs.values())
    }

    /// Iterates mutably over both collections.
    pub fn all_requests_mut(&mut self) -> impl Iterator<Item = &mut PreparationRequest> {
        self.parts.values_mut().chain(self.packs.values_mut())
    }

    /// Returns how many slots are occupied.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    /// Returns true if some slot binds the given request.
    #[must_use]
    pub fn slot_binds(&self, request: &RequestId) -> bool {
        self.slots.iter().any(|slot| slot.held_by(request))
    }

    /// Promotes every `Queue`-status request with a feeder-prefixed fixed
    /// endpoint back to its active pair. Returns the promoted ids.
    pub fn promote_queued(&mut self, feeder_prefix: &str) -> Vec<RequestId> {
        let mut promoted = Vec::new();
        for request in self.all_requests_mut() {
            if request.status_near == PrepStatus::Queue
                && request.fixed_endpoint.has_prefix(feeder_prefix)
            {
                request.restore_idle(feeder_prefix);
                promoted.push(request.id);
            }
        }
        promoted
    }

    /// Marks every idle feeder-lane request `Queue` when both slots are
    /// occupied. Returns the number of rows changed.
    pub fn queue_idle_feeders_if_full(&mut self, feeder_prefix: &str) -> usize {
        if self.slots.is_empty() || self.occupied_count() < self.slots.len() {
            return 0;
        }
        let bound: Vec<RequestId> = self
            .slots
            .iter()
            .filter_map(|slot| slot.bound_request)
            .collect();
        let mut changed = 0;
        for request in self.all_requests_mut() {
            let skip = !request.fixed_endpoint.has_prefix(feeder_prefix)
                || request.open_order.is_some()
                || bound.contains(&request.id)
                || matches!(
                    request.status_near,
                    PrepStatus::Waiting | PrepStatus::Queue | PrepStatus::Inactive
                );
            if skip {
                continue;
            }
            if request.mark_queued().is_ok() {
                changed += 1;
            }
        }
        changed
    }
}

/// Storage abstraction for ledger and slot state.
///
/// ## Atomicity contract
///
/// Each method is a single atomic unit with respect to every other method.
/// The check-and-set methods ([`try_acquire_slot`](Self::try_acquire_slot),
/// [`acquire_free_slot`](Self::acquire_free_slot)) are the core primitives
/// for mutual exclusion over the shared buffers: two concurrent callers
/// must never both observe the same slot free. The composite method
/// [`apply_reset`](Self::apply_reset) runs the whole manual override as one
/// transaction; on error nothing is committed.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Request operations ---

    /// Gets a request by class and id.
    async fn get_request(
        &self,
        class: RequestClass,
        id: &RequestId,
    ) -> Result<Option<PreparationRequest>>;

    /// Lists all requests of a class in id (creation) order.
    async fn list_requests(&self, class: RequestClass) -> Result<Vec<PreparationRequest>>;

    /// Lists every request, of either class, with an open dispatch order.
    async fn list_open_orders(&self) -> Result<Vec<PreparationRequest>>;

    /// Lists the distinct fixed endpoints of a class, sorted.
    async fn list_fixed_endpoints(&self, class: RequestClass) -> Result<Vec<SpotName>>;

    /// Inserts a new request row (seeding).
    ///
    /// Fails with a conflict if the id already exists.
    async fn insert_request(&self, request: PreparationRequest) -> Result<()>;

    /// Replaces a request row wholesale.
    ///
    /// Fails with not-found if the row does not exist.
    async fn save_request(&self, request: &PreparationRequest) -> Result<()>;

    /// Sets every sibling of `keep` (same class, same fixed endpoint) to
    /// the inactive marker. Returns the number of rows changed.
    async fn deactivate_siblings(
        &self,
        class: RequestClass,
        fixed_endpoint: &SpotName,
        keep: &RequestId,
    ) -> Result<usize>;

    /// Restores every inactive sibling of `keep` to the idle pair.
    /// Returns the number of rows changed.
    async fn restore_inactive_siblings(
        &self,
        class: RequestClass,
        fixed_endpoint: &SpotName,
        keep: &RequestId,
        feeder_prefix: &str,
    ) -> Result<usize>;

    // --- Slot operations (CAS) ---

    /// Gets a slot row.
    async fn get_slot(&self, id: SlotId) -> Result<SharedSlot>;

    /// Lists both slot rows.
    async fn list_slots(&self) -> Result<Vec<SharedSlot>>;

    /// Finds the slot occupying a spot, if that spot is a buffer.
    async fn find_slot_by_spot(&self, spot: &SpotName) -> Result<Option<SharedSlot>>;

    /// Finds the slot bound to a request, if any.
    async fn find_slot_holding(&self, request: &RequestId) -> Result<Option<SharedSlot>>;

    /// Atomically binds a slot to a request if it is free.
    ///
    /// Re-acquiring a slot already bound to `request` is a no-op success
    /// ([`AcquireOutcome::AlreadyHeld`]), never a re-queue; a request can
    /// otherwise deadlock against itself during re-evaluation.
    async fn try_acquire_slot(
        &self,
        slot: SlotId,
        request: &RequestId,
        origin: &SpotName,
    ) -> Result<AcquireOutcome>;

    /// Atomically binds the preferred slot if free, otherwise the other
    /// slot if free. Returns the slot actually bound, or `None` when both
    /// are occupied. A slot already held by `request` counts as bound.
    async fn acquire_free_slot(
        &self,
        preferred: SlotId,
        request: &RequestId,
        origin: &SpotName,
    ) -> Result<Option<SharedSlot>>;

    /// Clears a slot's occupancy.
    async fn release_slot(&self, slot: SlotId) -> Result<()>;

    /// Unconditionally binds a slot to a request (manual correction path).
    async fn bind_slot(
        &self,
        slot: SlotId,
        request: &RequestId,
        origin: &SpotName,
    ) -> Result<()>;

    /// Returns how many slots are currently occupied.
    async fn occupied_slot_count(&self) -> Result<usize>;

    // --- Queue status broadcasts ---

    /// Promotes every request in `Queue` status whose fixed endpoint
    /// carries the feeder prefix back to its active pair. Returns the
    /// promoted ids.
    ///
    /// This is deliberately a broadcast, not a single-winner pop: all
    /// blocked requests become valid again once the backing buffer frees;
    /// the actual bottleneck resolves at the next acquisition.
    async fn promote_queued(&self, feeder_prefix: &str) -> Result<Vec<RequestId>>;

    /// If **both** slots are occupied, marks every idle feeder-lane
    /// request as `Queue`. Returns the number of rows changed.
    ///
    /// The occupancy check and the queue marking happen inside one
    /// transaction; the decision never rests on a stale read.
    async fn queue_idle_feeders_if_full(&self, feeder_prefix: &str) -> Result<usize>;

    // --- Manual override ---

    /// Executes a manual override as one atomic transaction.
    ///
    /// On any error the whole correction rolls back; the ledger and the
    /// slot table never disagree.
    async fn apply_reset(&self, spec: &ResetSpec) -> Result<ResetOutcome>;

    // --- Reference data ---

    /// Lists the seeded auxiliary tag catalog.
    async fn list_auxiliary_tags(&self) -> Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_outcome_is_held() {
        assert!(AcquireOutcome::Acquired.is_held());
        assert!(AcquireOutcome::AlreadyHeld.is_held());
        assert!(!AcquireOutcome::Occupied { held_by: None }.is_held());
    }

    #[test]
    fn latest_by_pair_prefers_newest() {
        let mut state = StoreState::default();
        let mut older = PreparationRequest::new(
            RequestClass::Part,
            SpotName::new("MB-01"),
            vec![SpotName::new("MB-FG-01")],
        )
        .expect("request");
        let mut newer = PreparationRequest::new(
            RequestClass::Part,
            SpotName::new("MB-01"),
            vec![SpotName::new("MB-FG-01")],
        )
        .expect("request");
        // Pin ids so creation order is unambiguous even within one tick.
        older.id = RequestId::from_ulid(ulid::Ulid::from_parts(1, 7));
        newer.id = RequestId::from_ulid(ulid::Ulid::from_parts(2, 7));
        let newer_id = newer.id;
        state.parts.insert(older.id, older);
        state.parts.insert(newer_id, newer);

        let found = state
            .latest_by_pair(
                RequestClass::Part,
                &SpotName::new("MB-01"),
                &SpotName::new("MB-FG-01"),
            )
            .expect("pair exists");
        assert_eq!(found.id, newer_id);
    }
}
