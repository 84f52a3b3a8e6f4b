//! In-memory store implementation.
//!
//! This module provides [`InMemoryStore`], an implementation of the
//! [`Store`] trait backed by a single `RwLock` over the whole
//! [`StoreState`]. Holding one lock makes every trait method — including
//! the composite ones — a serializable transaction, which is exactly the
//! isolation the slot arbiter and the manual override require.
//!
//! ## Limitations
//!
//! - **Single-process only**: state is not shared across processes
//! - **No durability**: all state is lost when the process exits

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use cartage_core::{RequestId, SlotId, SpotName};

use super::{AcquireOutcome, Store, StoreState};
use crate::error::{Error, Result};
use crate::request::{PreparationRequest, RequestClass};
use crate::slot::SharedSlot;
use crate::troubleshoot::{self, ResetOutcome, ResetSpec};

/// In-memory store.
///
/// ## Example
///
/// ```rust
/// use cartage_core::SpotName;
/// use cartage_flow::store::memory::InMemoryStore;
///
/// let store = InMemoryStore::new([
///     SpotName::new("MB-FG-01"),
///     SpotName::new("MB-FG-02"),
/// ]);
/// ```
#[derive(Debug)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

impl InMemoryStore {
    /// Creates a store with the two slot rows at the given buffer spots.
    #[must_use]
    pub fn new(buffer_spots: [SpotName; 2]) -> Self {
        let [buffer_a, buffer_b] = buffer_spots;
        let state = StoreState {
            slots: vec![
                SharedSlot::new(SlotId::BufferA, buffer_a),
                SharedSlot::new(SlotId::BufferB, buffer_b),
            ],
            ..StoreState::default()
        };
        Self {
            state: RwLock::new(state),
        }
    }

    /// Creates a store with a seeded tag catalog.
    #[must_use]
    pub fn with_tags(buffer_spots: [SpotName; 2], tags: Vec<String>) -> Self {
        let store = Self::new(buffer_spots);
        {
            let mut state = store.state.write().unwrap_or_else(PoisonError::into_inner);
            state.tags = tags;
        }
        store
    }

    /// Returns a snapshot of the whole state (tests and diagnostics).
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn snapshot(&self) -> Result<StoreState> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.clone())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_request(
        &self,
        class: RequestClass,
        id: &RequestId,
    ) -> Result<Option<PreparationRequest>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.requests(class).get(id).cloned())
    }

    async fn list_requests(&self, class: RequestClass) -> Result<Vec<PreparationRequest>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.requests(class).values().cloned().collect())
    }

    async fn list_open_orders(&self) -> Result<Vec<PreparationRequest>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .all_requests()
            .filter(|request| request.open_order.is_some())
            .cloned()
            .collect())
    }

    async fn list_fixed_endpoints(&self, class: RequestClass) -> Result<Vec<SpotName>> {
        let state = self.state.read().map_err(poison_err)?;
        let mut endpoints: Vec<SpotName> = state
            .requests(class)
            .values()
            .map(|request| request.fixed_endpoint.clone())
            .collect();
        endpoints.sort();
        endpoints.dedup();
        Ok(endpoints)
    }

    async fn insert_request(&self, request: PreparationRequest) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let collection = state.requests_mut(request.class);
        if collection.contains_key(&request.id) {
            return Err(Error::conflict(format!(
                "request {} already exists",
                request.id
            )));
        }
        collection.insert(request.id, request);
        Ok(())
    }

    async fn save_request(&self, request: &PreparationRequest) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let collection = state.requests_mut(request.class);
        match collection.get_mut(&request.id) {
            Some(row) => {
                *row = request.clone();
                Ok(())
            }
            None => Err(Error::not_found("request", request.id)),
        }
    }

    async fn deactivate_siblings(
        &self,
        class: RequestClass,
        fixed_endpoint: &SpotName,
        keep: &RequestId,
    ) -> Result<usize> {
        let mut state = self.state.write().map_err(poison_err)?;
        let mut changed = 0;
        for request in state.requests_mut(class).values_mut() {
            if &request.id != keep
                && &request.fixed_endpoint == fixed_endpoint
                && !request.is_inactive()
            {
                request.deactivate();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn restore_inactive_siblings(
        &self,
        class: RequestClass,
        fixed_endpoint: &SpotName,
        keep: &RequestId,
        feeder_prefix: &str,
    ) -> Result<usize> {
        let mut state = self.state.write().map_err(poison_err)?;
        let mut changed = 0;
        for request in state.requests_mut(class).values_mut() {
            if &request.id != keep
                && &request.fixed_endpoint == fixed_endpoint
                && request.is_inactive()
            {
                request.restore_idle(feeder_prefix);
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn get_slot(&self, id: SlotId) -> Result<SharedSlot> {
        let state = self.state.read().map_err(poison_err)?;
        state
            .slots
            .iter()
            .find(|slot| slot.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("slot", id))
    }

    async fn list_slots(&self) -> Result<Vec<SharedSlot>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.slots.clone())
    }

    async fn find_slot_by_spot(&self, spot: &SpotName) -> Result<Option<SharedSlot>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.slot_by_spot(spot).cloned())
    }

    async fn find_slot_holding(&self, request: &RequestId) -> Result<Option<SharedSlot>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state
            .slots
            .iter()
            .find(|slot| slot.held_by(request))
            .cloned())
    }

    async fn try_acquire_slot(
        &self,
        slot: SlotId,
        request: &RequestId,
        origin: &SpotName,
    ) -> Result<AcquireOutcome> {
        let mut state = self.state.write().map_err(poison_err)?;
        let slot = state
            .slots
            .iter_mut()
            .find(|row| row.id == slot)
            .ok_or_else(|| Error::not_found("slot", slot))?;

        if slot.held_by(request) {
            return Ok(AcquireOutcome::AlreadyHeld);
        }
        if !slot.is_free() {
            return Ok(AcquireOutcome::Occupied {
                held_by: slot.bound_request,
            });
        }
        slot.bind(*request, origin.clone());
        Ok(AcquireOutcome::Acquired)
    }

    async fn acquire_free_slot(
        &self,
        preferred: SlotId,
        request: &RequestId,
        origin: &SpotName,
    ) -> Result<Option<SharedSlot>> {
        let mut state = self.state.write().map_err(poison_err)?;
        for candidate in [preferred, preferred.other()] {
            let Some(slot) = state.slots.iter_mut().find(|row| row.id == candidate) else {
                continue;
            };
            if slot.held_by(request) {
                return Ok(Some(slot.clone()));
            }
            if slot.is_free() {
                slot.bind(*request, origin.clone());
                return Ok(Some(slot.clone()));
            }
        }
        Ok(None)
    }

    async fn release_slot(&self, slot: SlotId) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let slot = state
            .slots
            .iter_mut()
            .find(|row| row.id == slot)
            .ok_or_else(|| Error::not_found("slot", slot))?;
        slot.clear();
        Ok(())
    }

    async fn bind_slot(
        &self,
        slot: SlotId,
        request: &RequestId,
        origin: &SpotName,
    ) -> Result<()> {
        let mut state = self.state.write().map_err(poison_err)?;
        let slot = state
            .slots
            .iter_mut()
            .find(|row| row.id == slot)
            .ok_or_else(|| Error::not_found("slot", slot))?;
        slot.bind(*request, origin.clone());
        Ok(())
    }

    async fn occupied_slot_count(&self) -> Result<usize> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.occupied_count())
    }

    async fn promote_queued(&self, feeder_prefix: &str) -> Result<Vec<RequestId>> {
        let mut state = self.state.write().map_err(poison_err)?;
        Ok(state.promote_queued(feeder_prefix))
    }

    async fn queue_idle_feeders_if_full(&self, feeder_prefix: &str) -> Result<usize> {
        let mut state = self.state.write().map_err(poison_err)?;
        Ok(state.queue_idle_feeders_if_full(feeder_prefix))
    }

    async fn apply_reset(&self, spec: &ResetSpec) -> Result<ResetOutcome> {
        let mut state = self.state.write().map_err(poison_err)?;
        // The planner performs all fallible lookups before mutating, so an
        // error leaves the locked state exactly as it was.
        troubleshoot::apply_to_state(&mut state, spec)
    }

    async fn list_auxiliary_tags(&self) -> Result<Vec<String>> {
        let state = self.state.read().map_err(poison_err)?;
        Ok(state.tags.clone())
    }
}
