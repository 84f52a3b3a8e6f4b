//! Operator-facing ledger operations.
//!
//! [`PreparationService`] is the write contract invoked by the (excluded)
//! presentation layer: candidate selection, readiness confirmation on
//! either side of the leg, tag maintenance, ad-hoc moves, and the read
//! contract backing the listing views.
//!
//! ## Decoupled dispatch
//!
//! Readiness confirmation commits its ledger write *before* calling the
//! fleet service, and the two are deliberately not one atomic unit: when
//! the fleet is unreachable the operator's intent must not be lost. The
//! caller sees an explicit [`MarkReadyOutcome::DispatchFailed`] partial
//! success ("update applied, dispatch not confirmed") and retries the
//! dispatch manually.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use cartage_core::{OrderId, RequestId, SpotDirectory, SpotName};

use crate::arbiter::SlotArbiter;
use crate::config::FlowConfig;
use crate::dispatch::DispatchClient;
use crate::error::{Error, Result};
use crate::request::{
    LegSide, OrderPhase, PreparationRequest, RequestClass, StatusPair,
};
use crate::slot::SharedSlot;
use crate::store::{AcquireOutcome, Store};
use crate::troubleshoot::{ManualOverride, ResetOutcome};

/// Result of a readiness confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum MarkReadyOutcome {
    /// The status change committed and the move order was issued.
    Dispatched {
        /// The order now in flight.
        order_id: OrderId,
        /// Set when the request was redirected to the other free buffer.
        #[serde(skip_serializing_if = "Option::is_none")]
        redirected_to: Option<SpotName>,
    },
    /// Both buffers are occupied; the request is blocked in `Queue`
    /// status and no order was issued.
    Queued,
    /// The status change committed but the fleet call failed.
    ///
    /// No order is in flight; the operator retries manually.
    DispatchFailed {
        /// The status pair that did commit.
        applied: StatusPair,
        /// The transport failure.
        error: String,
    },
}

impl MarkReadyOutcome {
    /// Returns true if an order is now in flight.
    #[must_use]
    pub const fn is_dispatched(&self) -> bool {
        matches!(self, Self::Dispatched { .. })
    }
}

/// The ledger read/write contract.
pub struct PreparationService {
    store: Arc<dyn Store>,
    dispatch: Arc<dyn DispatchClient>,
    directory: Arc<dyn SpotDirectory>,
    arbiter: SlotArbiter,
    config: FlowConfig,
}

impl PreparationService {
    /// Creates the service over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        dispatch: Arc<dyn DispatchClient>,
        directory: Arc<dyn SpotDirectory>,
        config: FlowConfig,
    ) -> Self {
        let arbiter = SlotArbiter::new(Arc::clone(&store), config.feeder_prefix.clone());
        Self {
            store,
            dispatch,
            directory,
            arbiter,
            config,
        }
    }

    /// Returns the slot arbiter backing this service.
    #[must_use]
    pub const fn arbiter(&self) -> &SlotArbiter {
        &self.arbiter
    }

    // --- Read contract ---

    /// Lists all requests of a class.
    ///
    /// Pack requests come back least-recently-served first, which is the
    /// order operators pick the next lane to serve in; never-served rows
    /// sort ahead of everything.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_requests(&self, class: RequestClass) -> Result<Vec<PreparationRequest>> {
        let mut requests = self.store.list_requests(class).await?;
        if class == RequestClass::Pack {
            requests.sort_by(|a, b| {
                a.last_served_at
                    .cmp(&b.last_served_at)
                    .then_with(|| a.id.cmp(&b.id))
            });
        }
        Ok(requests)
    }

    /// Lists both slot rows with their occupancy.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_slots(&self) -> Result<Vec<SharedSlot>> {
        self.store.list_slots().await
    }

    /// Lists the distinct fixed endpoints of a class, for view filtering.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_fixed_endpoints(&self, class: RequestClass) -> Result<Vec<SpotName>> {
        self.store.list_fixed_endpoints(class).await
    }

    /// Lists the seeded auxiliary tag catalog.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub async fn list_auxiliary_tags(&self) -> Result<Vec<String>> {
        self.store.list_auxiliary_tags().await
    }

    // --- Write contract ---

    /// Binds a different candidate endpoint and deactivates every sibling
    /// sharing the fixed endpoint, keeping at most one engaged.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown request or spot
    /// - [`Error::Validation`] for a spot outside the candidate list
    /// - [`Error::Conflict`] while an order is in flight
    #[tracing::instrument(skip(self), fields(class = %class, request = %id, candidate = %candidate))]
    pub async fn select_candidate(
        &self,
        class: RequestClass,
        id: &RequestId,
        candidate: SpotName,
    ) -> Result<()> {
        let mut request = self.require_request(class, id).await?;
        if !self.directory.contains(&candidate) {
            return Err(Error::not_found("spot", &candidate));
        }
        request.select(&candidate)?;
        // Selecting an idle sibling re-engages it.
        if request.is_inactive() {
            request.restore_idle(&self.config.feeder_prefix);
        }
        self.store.save_request(&request).await?;

        let deactivated = self
            .store
            .deactivate_siblings(class, &request.fixed_endpoint, id)
            .await?;
        if deactivated > 0 {
            tracing::info!(deactivated, "siblings deactivated");
        }
        Ok(())
    }

    /// Confirms carrier readiness on one side of the leg and issues the
    /// corresponding move order.
    ///
    /// `LegSide::Near` starts the outbound leg (gated by the slot arbiter
    /// when the far endpoint is a shared buffer); `LegSide::Far` starts
    /// the return leg and requires the far side to be `Ready`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown request
    /// - [`Error::Conflict`] for an inactive sibling
    /// - [`Error::InvalidStateTransition`] when the side cannot be
    ///   confirmed in the request's current state
    ///
    /// A fleet transport failure is **not** an error: it is reported as
    /// [`MarkReadyOutcome::DispatchFailed`] with the committed pair.
    #[tracing::instrument(skip(self), fields(class = %class, request = %id, side = %side))]
    pub async fn mark_ready(
        &self,
        class: RequestClass,
        id: &RequestId,
        side: LegSide,
    ) -> Result<MarkReadyOutcome> {
        let mut request = self.require_request(class, id).await?;
        if request.is_inactive() {
            return Err(Error::conflict(format!(
                "request {id} is an inactive sibling; select it first"
            )));
        }

        let phase = match side {
            LegSide::Near => OrderPhase::Outbound,
            LegSide::Far => OrderPhase::Return,
        };

        // Unknown endpoints reject the operation before any mutation.
        for spot in [request.near_spot(), &request.selected] {
            if !self.directory.contains(spot) {
                return Err(Error::not_found("spot", spot));
            }
        }

        let mut redirected_to = None;
        if phase == OrderPhase::Outbound {
            if let Some(slot_row) = self.store.find_slot_by_spot(request.far_spot()).await? {
                match self.acquire_for(&request, slot_row).await? {
                    Some(bound) => {
                        if &bound.spot != request.far_spot() {
                            request.select(&bound.spot)?;
                            redirected_to = Some(bound.spot.clone());
                        }
                    }
                    None => {
                        request.mark_queued()?;
                        self.store.save_request(&request).await?;
                        tracing::info!("both buffers occupied; request queued");
                        return Ok(MarkReadyOutcome::Queued);
                    }
                }
            }
        }

        // Commit the ledger half before talking to the fleet.
        request.begin_leg(phase, Utc::now())?;
        self.store.save_request(&request).await?;

        if redirected_to.is_some() || self.config.is_buffer_spot(request.far_spot()) {
            let queued = self
                .store
                .queue_idle_feeders_if_full(&self.config.feeder_prefix)
                .await?;
            if queued > 0 {
                tracing::info!(queued, "idle feeder lanes marked queued");
            }
        }

        let (origin_spot, dest_spot) = request.route(phase);
        let origin = self.directory.resolve(&origin_spot)?;
        let destination = self.directory.resolve(&dest_spot)?;

        match self.dispatch.submit_order(&origin, &destination).await {
            Ok(order_id) => {
                request.attach_order(order_id.clone(), phase, Utc::now())?;
                self.store.save_request(&request).await?;
                crate::metrics::record_submission(true);
                Ok(MarkReadyOutcome::Dispatched {
                    order_id,
                    redirected_to,
                })
            }
            Err(error) if error.is_dispatch_unavailable() => {
                crate::metrics::record_submission(false);
                tracing::warn!(%error, "status committed but dispatch failed");
                Ok(MarkReadyOutcome::DispatchFailed {
                    applied: request.status_pair(),
                    error: error.to_string(),
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Sets or clears the auxiliary tag of a feeder-lane request.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] for an unknown request
    /// - [`Error::Validation`] for a non-feeder request or a tag outside
    ///   the seeded catalog
    pub async fn set_auxiliary_tag(
        &self,
        class: RequestClass,
        id: &RequestId,
        tag: Option<String>,
    ) -> Result<()> {
        let mut request = self.require_request(class, id).await?;
        if !request
            .fixed_endpoint
            .has_prefix(&self.config.feeder_prefix)
        {
            return Err(Error::validation(format!(
                "auxiliary tags only apply to '{}' lanes",
                self.config.feeder_prefix
            )));
        }
        if let Some(tag) = &tag {
            let catalog = self.store.list_auxiliary_tags().await?;
            if !catalog.iter().any(|known| known == tag) {
                return Err(Error::validation(format!("unknown auxiliary tag '{tag}'")));
            }
        }
        request.auxiliary_tag = tag;
        self.store.save_request(&request).await
    }

    /// Issues an ad-hoc move order between two named spots.
    ///
    /// Touches no ledger row; both spots resolve through the directory.
    ///
    /// # Errors
    ///
    /// Spot lookups fail with not-found; fleet failures propagate as
    /// [`Error::DispatchUnavailable`] since nothing was committed.
    #[tracing::instrument(skip(self), fields(origin = %origin, destination = %destination))]
    pub async fn direct_move(
        &self,
        origin: &SpotName,
        destination: &SpotName,
    ) -> Result<OrderId> {
        let origin = self.directory.resolve(origin)?;
        let destination = self.directory.resolve(destination)?;
        let order_id = self.dispatch.submit_order(&origin, &destination).await?;
        crate::metrics::record_submission(true);
        Ok(order_id)
    }

    /// Forces a request (and its bound slot) into the state the normal
    /// flow would have produced, as one transaction.
    ///
    /// # Errors
    ///
    /// See [`ManualOverride::reset`].
    pub async fn manual_reset(
        &self,
        class: RequestClass,
        near: SpotName,
        far: SpotName,
        side: LegSide,
    ) -> Result<ResetOutcome> {
        ManualOverride::new(Arc::clone(&self.store), self.config.feeder_prefix.clone())
            .reset(class, near, far, side)
            .await
    }

    // --- Internals ---

    async fn require_request(
        &self,
        class: RequestClass,
        id: &RequestId,
    ) -> Result<PreparationRequest> {
        self.store
            .get_request(class, id)
            .await?
            .ok_or_else(|| Error::not_found("request", id))
    }

    /// Binds a buffer for the request, preferring its selected spot and
    /// redirecting to the other buffer only when that spot is also a
    /// seeded candidate known to the directory.
    async fn acquire_for(
        &self,
        request: &PreparationRequest,
        preferred: SharedSlot,
    ) -> Result<Option<SharedSlot>> {
        let other_spot = self.config.slot_spot(preferred.id.other());
        let may_redirect =
            request.candidates.contains(other_spot) && self.directory.contains(other_spot);

        if may_redirect {
            self.arbiter
                .acquire_preferring(preferred.id, &request.id, request.near_spot())
                .await
        } else {
            let outcome = self
                .arbiter
                .try_acquire(preferred.id, &request.id, request.near_spot())
                .await?;
            match outcome {
                AcquireOutcome::Acquired | AcquireOutcome::AlreadyHeld => {
                    Ok(Some(self.store.get_slot(preferred.id).await?))
                }
                AcquireOutcome::Occupied { .. } => Ok(None),
            }
        }
    }
}
