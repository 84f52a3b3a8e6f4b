//! Manual override: operator-triggered force-correction of ledger state.
//!
//! When automation stalls (a lost order, a carrier moved by hand), the
//! operator names a (near, far) spot pair and the side the carrier is
//! physically at, and the override forces the matching request into the
//! exact status pair the normal flow would have produced at that point,
//! including the slot side effects the normal flow would have applied.
//!
//! The operator only knows spot names, so the request is looked up by its
//! pair, taking the most recent match. For buffer far endpoints at side
//! [`LegSide::Far`] the slot's bound request id identifies the *exact*
//! occupant, since several requests can share the same far spot name over
//! time.
//!
//! The whole correction is one store transaction: the lookup, the status
//! write, and the slot rebinding either all commit or none do. The pure
//! planner [`apply_to_state`] encodes the semantics; store implementations
//! call it inside their transaction boundary.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cartage_core::{RequestId, SpotName};

use crate::error::{Error, Result};
use crate::request::{LegSide, PrepStatus, RequestClass, StatusPair, TaskDetail};
use crate::store::{Store, StoreState};

/// Arguments of one manual override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSpec {
    /// Which ledger the pair belongs to.
    pub class: RequestClass,
    /// The near (outbound origin) spot named by the operator.
    pub near: SpotName,
    /// The far (outbound destination) spot named by the operator.
    pub far: SpotName,
    /// Where the carrier physically is.
    pub side: LegSide,
    /// Feeder-lane prefix, for resting status and promotion.
    pub feeder_prefix: String,
}

/// What an override applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetOutcome {
    /// The corrected request.
    pub request_id: RequestId,
    /// The status pair that was applied.
    pub applied: StatusPair,
    /// Requests promoted out of `Queue` status by a slot release.
    pub promoted: Vec<RequestId>,
    /// Inactive siblings restored to the idle pair.
    pub siblings_restored: usize,
}

/// Applies an override to a materialized state inside a transaction.
///
/// All fallible lookups run before the first mutation, so an error leaves
/// the state untouched and the caller can simply not commit.
///
/// # Errors
///
/// - [`Error::NotFound`] if no request matches the pair
/// - [`Error::Integrity`] if a buffer-side reset cannot resolve the exact
///   occupant
pub fn apply_to_state(state: &mut StoreState, spec: &ResetSpec) -> Result<ResetOutcome> {
    let slot_id = state.slot_by_spot(&spec.far).map(|slot| slot.id);

    match (spec.side, slot_id) {
        (LegSide::Far, Some(slot_id)) => {
            // The carrier sits in the buffer: rebind the slot to the exact
            // occupant and give that request the arrived pair.
            let slot = state
                .slot_by_spot(&spec.far)
                .ok_or_else(|| Error::integrity("slot row disappeared during reset"))?;
            let target_id = match slot.bound_request {
                Some(id) => {
                    if !state.requests(spec.class).contains_key(&id) {
                        return Err(Error::integrity(format!(
                            "slot {} is bound to unknown request {id}",
                            slot.id
                        )));
                    }
                    id
                }
                None => state
                    .latest_by_pair(spec.class, &spec.near, &spec.far)
                    .map(|request| request.id)
                    .ok_or_else(|| {
                        Error::integrity(format!(
                            "slot at '{}' has no bound request and no {} request matches \
                             '{}' -> '{}'",
                            spec.far, spec.class, spec.near, spec.far
                        ))
                    })?,
            };

            let applied = StatusPair::new(PrepStatus::Waiting, PrepStatus::Ready);
            let origin = {
                let request = state
                    .requests_mut(spec.class)
                    .get_mut(&target_id)
                    .ok_or_else(|| Error::integrity("occupant row vanished during reset"))?;
                request.force_pair(applied);
                request.open_order = None;
                request.task_detail = Some(TaskDetail::OutboundCreated);
                request.near_spot().clone()
            };
            let slot = state
                .slots
                .iter_mut()
                .find(|slot| slot.id == slot_id)
                .ok_or_else(|| Error::integrity("slot row disappeared during reset"))?;
            slot.bind(target_id, origin);

            Ok(ResetOutcome {
                request_id: target_id,
                applied,
                promoted: Vec::new(),
                siblings_restored: 0,
            })
        }
        (LegSide::Far, None) => {
            let target_id = state
                .latest_by_pair(spec.class, &spec.near, &spec.far)
                .map(|request| request.id)
                .ok_or_else(|| pair_not_found(spec))?;

            let applied = StatusPair::new(PrepStatus::Waiting, PrepStatus::Ready);
            let request = state
                .requests_mut(spec.class)
                .get_mut(&target_id)
                .ok_or_else(|| pair_not_found(spec))?;
            request.force_pair(applied);
            request.open_order = None;
            request.task_detail = Some(TaskDetail::OutboundCreated);

            Ok(ResetOutcome {
                request_id: target_id,
                applied,
                promoted: Vec::new(),
                siblings_restored: 0,
            })
        }
        (LegSide::Near, slot_id) => {
            let target_id = state
                .latest_by_pair(spec.class, &spec.near, &spec.far)
                .map(|request| request.id)
                .ok_or_else(|| pair_not_found(spec))?;

            let (applied, fixed_endpoint) = {
                let request = state
                    .requests_mut(spec.class)
                    .get_mut(&target_id)
                    .ok_or_else(|| pair_not_found(spec))?;
                let applied = request.resting_pair(&spec.feeder_prefix);
                request.force_pair(applied);
                request.open_order = None;
                request.task_detail = Some(TaskDetail::Finish);
                (applied, request.fixed_endpoint.clone())
            };

            // Cycle complete at a buffer far endpoint: free the slot and
            // broadcast-promote, exactly like the reconciler would.
            let mut promoted = Vec::new();
            if let Some(slot_id) = slot_id {
                if let Some(slot) = state.slots.iter_mut().find(|slot| slot.id == slot_id) {
                    slot.clear();
                }
                promoted = state.promote_queued(&spec.feeder_prefix);
            }

            // A completed pack cycle re-opens the lane for its siblings.
            let mut siblings_restored = 0;
            if spec.class == RequestClass::Pack {
                for request in state.requests_mut(RequestClass::Pack).values_mut() {
                    if request.id != target_id
                        && request.fixed_endpoint == fixed_endpoint
                        && request.is_inactive()
                    {
                        request.restore_idle(&spec.feeder_prefix);
                        siblings_restored += 1;
                    }
                }
            }

            Ok(ResetOutcome {
                request_id: target_id,
                applied,
                promoted,
                siblings_restored,
            })
        }
    }
}

fn pair_not_found(spec: &ResetSpec) -> Error {
    Error::not_found(
        "request pair",
        format!("{} '{}' -> '{}'", spec.class, spec.near, spec.far),
    )
}

/// Operator-facing override entry point.
pub struct ManualOverride {
    store: Arc<dyn Store>,
    feeder_prefix: String,
}

impl ManualOverride {
    /// Creates an override handle.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, feeder_prefix: impl Into<String>) -> Self {
        Self {
            store,
            feeder_prefix: feeder_prefix.into(),
        }
    }

    /// Forces the request matching (near, far) into the status pair the
    /// normal flow would assign for the given side.
    ///
    /// # Errors
    ///
    /// Propagates lookup and integrity failures from the store; on error
    /// nothing has been committed.
    #[tracing::instrument(skip(self), fields(class = %class, near = %near, far = %far, side = %side))]
    pub async fn reset(
        &self,
        class: RequestClass,
        near: SpotName,
        far: SpotName,
        side: LegSide,
    ) -> Result<ResetOutcome> {
        let spec = ResetSpec {
            class,
            near,
            far,
            side,
            feeder_prefix: self.feeder_prefix.clone(),
        };
        let outcome = self.store.apply_reset(&spec).await?;
        tracing::info!(
            request_id = %outcome.request_id,
            applied = %outcome.applied,
            promoted = outcome.promoted.len(),
            "manual override applied"
        );
        crate::metrics::record_override(class);
        Ok(outcome)
    }
}
