//! Preparation request records and their status state machine.
//!
//! This module provides:
//! - `PrepStatus`: the closed status vocabulary shared by both ledger sides
//! - `RequestClass`: which end of the transport leg is fixed
//! - `PreparationRequest`: one ledger row with its transition methods
//! - `OpenOrder` / `OrderPhase` / `TaskDetail`: in-flight order tracking
//!
//! ## Sides
//!
//! Every request binds a **near** side (the origin of the outbound leg,
//! where a carrier rests between cycles) to a **far** side (the outbound
//! destination). Part requests have a fixed near side and select the far
//! side from candidates; pack requests are mirrored, with a fixed far side
//! and a selectable near side. The state machine itself is identical for
//! both classes.
//!
//! ## Status cycle
//!
//! ```text
//!                   mark-ready (near)            order resolves
//!  ┌─────────────┐  dispatch outbound  ┌────────────┐  code 3/5  ┌────────────┐
//!  │ rest / Wait │────────────────────►│ Wait / Wait│───────────►│ Wait / Ready│
//!  └─────────────┘                     └────────────┘            └────────────┘
//!         ▲     │ buffer occupied            ▲                         │
//!         │     ▼                            │ dispatch return         │
//!         │  ┌──────────────┐                └─────────────────────────┘
//!         │  │ Queue / Wait │                      mark-ready (far)
//!         │  └──────────────┘
//!         │         │ buffer released (broadcast promotion)
//!         └─────────┴──────────── order resolves, code 3/5, return leg
//! ```
//!
//! "rest" is `InUse` for requests whose near endpoint carries the shared
//! buffer feeder prefix, `Prepare` for everything else.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cartage_core::{OrderId, RequestId, SpotName};

use crate::error::{Error, Result};

/// Closed status vocabulary for both sides of a request.
///
/// Replaces the observed free-text statuses (including an inactive marker
/// and inconsistent casing) with a tagged enumeration so invalid states
/// cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrepStatus {
    /// Resting: a carrier is parked here, ready to be prepared.
    Prepare,
    /// Nothing actionable on this side right now.
    Waiting,
    /// A carrier has arrived; the operator on this side may act.
    Ready,
    /// Resting variant for buffer feeder lanes: the lane is engaged.
    InUse,
    /// Eligible for dispatch but blocked on an occupied shared buffer.
    Queue,
    /// The carrier on this side has been emptied.
    Empty,
    /// Not the selected sibling for this fixed endpoint.
    Inactive,
}

impl PrepStatus {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Waiting => "waiting",
            Self::Ready => "ready",
            Self::InUse => "in_use",
            Self::Queue => "queue",
            Self::Empty => "empty",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for PrepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Which end of the transport leg is fixed for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestClass {
    /// Part carts: fixed origin, selectable destination.
    Part,
    /// Pack carts: selectable origin, fixed destination.
    Pack,
}

impl RequestClass {
    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::Part => "part",
            Self::Pack => "pack",
        }
    }
}

impl std::fmt::Display for RequestClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Which side of the leg an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegSide {
    /// The outbound origin side, where a carrier rests between cycles.
    Near,
    /// The outbound destination side.
    Far,
}

impl std::fmt::Display for LegSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Near => f.write_str("near"),
            Self::Far => f.write_str("far"),
        }
    }
}

/// Phase of an in-flight dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPhase {
    /// Moving the carrier from the near side to the far side.
    Outbound,
    /// Bringing the carrier back from the far side.
    Return,
}

impl std::fmt::Display for OrderPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Outbound => f.write_str("outbound"),
            Self::Return => f.write_str("return"),
        }
    }
}

/// Milestone marker carried across order lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskDetail {
    /// An outbound order has been created for this cycle.
    OutboundCreated,
    /// A return order has been created for this cycle.
    ReturnCreated,
    /// The most recent cycle ran to completion.
    Finish,
}

/// A dispatch order currently in flight for a request.
///
/// Present iff an order is open; discarded once the order resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenOrder {
    /// The dispatcher's order identifier.
    pub order_id: OrderId,
    /// Which leg the order serves.
    pub phase: OrderPhase,
    /// When the order was submitted.
    pub submitted_at: DateTime<Utc>,
}

/// The (near, far) status pair of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPair {
    /// Near-side status.
    pub near: PrepStatus,
    /// Far-side status.
    pub far: PrepStatus,
}

impl StatusPair {
    /// Creates a status pair.
    #[must_use]
    pub const fn new(near: PrepStatus, far: PrepStatus) -> Self {
        Self { near, far }
    }
}

impl std::fmt::Display for StatusPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.near, self.far)
    }
}

/// Direction a carrier is currently moving, derived from the open order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitDirection {
    /// Moving toward the far side.
    Outbound,
    /// Moving back toward the near side.
    Returning,
}

/// One preparation ledger row.
///
/// Rows are seeded once at configuration time and never deleted; only the
/// status fields, the selection, and the order tracking cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationRequest {
    /// Unique, stable identifier.
    pub id: RequestId,
    /// Which end of the leg is fixed.
    pub class: RequestClass,
    /// The spot that never changes for this request.
    pub fixed_endpoint: SpotName,
    /// Ordered alternatives for the other end of the leg (1–3 entries).
    pub candidates: Vec<SpotName>,
    /// The currently bound alternative; always one of `candidates`.
    pub selected: SpotName,
    /// Status of the outbound-origin side.
    pub status_near: PrepStatus,
    /// Status of the outbound-destination side.
    pub status_far: PrepStatus,
    /// The dispatch order currently in flight, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_order: Option<OpenOrder>,
    /// Milestone of the current or most recent cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_detail: Option<TaskDetail>,
    /// When this request was last activated (pack scheduling order).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_served_at: Option<DateTime<Utc>>,
    /// Free-form classification attribute, not interpreted by the core.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary_tag: Option<String>,
}

impl PreparationRequest {
    /// Creates a new idle request with the first candidate selected.
    ///
    /// # Errors
    ///
    /// Returns a validation error unless 1–3 candidates are given.
    pub fn new(
        class: RequestClass,
        fixed_endpoint: SpotName,
        candidates: Vec<SpotName>,
    ) -> Result<Self> {
        if candidates.is_empty() || candidates.len() > 3 {
            return Err(Error::validation(format!(
                "a request needs 1-3 candidate endpoints, got {}",
                candidates.len()
            )));
        }
        let selected = candidates[0].clone();
        Ok(Self {
            id: RequestId::generate(),
            class,
            fixed_endpoint,
            candidates,
            selected,
            status_near: PrepStatus::Prepare,
            status_far: PrepStatus::Waiting,
            open_order: None,
            task_detail: None,
            last_served_at: None,
            auxiliary_tag: None,
        })
    }

    /// Sets the auxiliary tag (builder style, for seeding).
    #[must_use]
    pub fn with_auxiliary_tag(mut self, tag: impl Into<String>) -> Self {
        self.auxiliary_tag = Some(tag.into());
        self
    }

    // --- Side accessors ---

    /// The spot on the near (outbound origin) side.
    #[must_use]
    pub const fn near_spot(&self) -> &SpotName {
        match self.class {
            RequestClass::Part => &self.fixed_endpoint,
            RequestClass::Pack => &self.selected,
        }
    }

    /// The spot on the far (outbound destination) side.
    #[must_use]
    pub const fn far_spot(&self) -> &SpotName {
        match self.class {
            RequestClass::Part => &self.selected,
            RequestClass::Pack => &self.fixed_endpoint,
        }
    }

    /// The (origin, destination) of the given leg.
    #[must_use]
    pub fn route(&self, phase: OrderPhase) -> (SpotName, SpotName) {
        match phase {
            OrderPhase::Outbound => (self.near_spot().clone(), self.far_spot().clone()),
            OrderPhase::Return => (self.far_spot().clone(), self.near_spot().clone()),
        }
    }

    /// The current (near, far) status pair.
    #[must_use]
    pub const fn status_pair(&self) -> StatusPair {
        StatusPair {
            near: self.status_near,
            far: self.status_far,
        }
    }

    /// True if this row matches an operator-supplied (near, far) pair.
    #[must_use]
    pub fn matches_pair(&self, near: &SpotName, far: &SpotName) -> bool {
        self.near_spot() == near && self.far_spot() == far
    }

    /// True if this request is the non-selected sibling marker.
    #[must_use]
    pub fn is_inactive(&self) -> bool {
        self.status_near == PrepStatus::Inactive
    }

    /// Direction the carrier is currently moving, if an order is open.
    #[must_use]
    pub fn transit_direction(&self) -> Option<TransitDirection> {
        self.open_order.as_ref().map(|order| match order.phase {
            OrderPhase::Outbound => TransitDirection::Outbound,
            OrderPhase::Return => TransitDirection::Returning,
        })
    }

    /// The resting near-side status for this request.
    ///
    /// Buffer feeder lanes rest at `InUse`; everything else at `Prepare`.
    #[must_use]
    pub fn resting_near(&self, feeder_prefix: &str) -> PrepStatus {
        if self.near_spot().has_prefix(feeder_prefix) {
            PrepStatus::InUse
        } else {
            PrepStatus::Prepare
        }
    }

    /// The idle pair this request returns to after a completed cycle.
    #[must_use]
    pub fn resting_pair(&self, feeder_prefix: &str) -> StatusPair {
        StatusPair::new(self.resting_near(feeder_prefix), PrepStatus::Waiting)
    }

    /// The pair after the outbound leg resolves: operator acts at far end.
    #[must_use]
    pub const fn arrived_pair() -> StatusPair {
        StatusPair::new(PrepStatus::Waiting, PrepStatus::Ready)
    }

    // --- Selection ---

    /// Binds a different candidate endpoint.
    ///
    /// # Errors
    ///
    /// Rejects candidates outside the seeded list, and any change while a
    /// dispatch order is in flight.
    pub fn select(&mut self, candidate: &SpotName) -> Result<()> {
        if !self.candidates.contains(candidate) {
            return Err(Error::validation(format!(
                "'{candidate}' is not a candidate endpoint of request {}",
                self.id
            )));
        }
        if self.open_order.is_some() {
            return Err(Error::conflict(format!(
                "request {} has an order in flight; candidate cannot change",
                self.id
            )));
        }
        self.selected = candidate.clone();
        Ok(())
    }

    // --- Transitions ---

    /// Marks the request blocked on an occupied shared buffer.
    ///
    /// # Errors
    ///
    /// Fails if a dispatch order is already in flight.
    pub fn mark_queued(&mut self) -> Result<()> {
        self.ensure_no_open_order("mark_queued")?;
        self.status_near = PrepStatus::Queue;
        self.status_far = PrepStatus::Waiting;
        Ok(())
    }

    /// Commits the status change for a leg about to be dispatched.
    ///
    /// This is the ledger-local half of dispatching: it runs (and is
    /// persisted) before the fleet call, so the operator-visible state
    /// survives a dispatcher outage. Pack requests stamp their activation
    /// time here on the outbound leg.
    ///
    /// # Errors
    ///
    /// Fails if an order is already open, or if a return leg is begun
    /// while the far side is not `Ready`.
    pub fn begin_leg(&mut self, phase: OrderPhase, now: DateTime<Utc>) -> Result<()> {
        self.ensure_no_open_order("begin_leg")?;
        if phase == OrderPhase::Return && self.status_far != PrepStatus::Ready {
            return Err(Error::InvalidStateTransition {
                request_id: self.id,
                message: format!(
                    "return leg requires far side ready, found {}",
                    self.status_far
                ),
            });
        }
        if phase == OrderPhase::Outbound && self.class == RequestClass::Pack {
            self.last_served_at = Some(now);
        }
        self.status_near = PrepStatus::Waiting;
        self.status_far = PrepStatus::Waiting;
        Ok(())
    }

    /// Records a successfully submitted dispatch order.
    ///
    /// # Errors
    ///
    /// Fails if an order is already open.
    pub fn attach_order(
        &mut self,
        order_id: OrderId,
        phase: OrderPhase,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_no_open_order("attach_order")?;
        self.open_order = Some(OpenOrder {
            order_id,
            phase,
            submitted_at: now,
        });
        self.task_detail = Some(match phase {
            OrderPhase::Outbound => TaskDetail::OutboundCreated,
            OrderPhase::Return => TaskDetail::ReturnCreated,
        });
        Ok(())
    }

    /// Applies the terminal transition for the open outbound order.
    ///
    /// The far side becomes `Ready` and the order is cleared pending the
    /// return leg.
    ///
    /// # Errors
    ///
    /// Fails unless an outbound order is open.
    pub fn complete_outbound(&mut self) -> Result<()> {
        self.take_order(OrderPhase::Outbound)?;
        self.status_near = PrepStatus::Waiting;
        self.status_far = PrepStatus::Ready;
        Ok(())
    }

    /// Applies the terminal transition for the open return order.
    ///
    /// The near side returns to its resting status, the far side to
    /// `Waiting`, and the cycle is marked finished.
    ///
    /// # Errors
    ///
    /// Fails unless a return order is open.
    pub fn complete_return(&mut self, feeder_prefix: &str) -> Result<()> {
        self.take_order(OrderPhase::Return)?;
        self.status_near = self.resting_near(feeder_prefix);
        self.status_far = PrepStatus::Waiting;
        self.task_detail = Some(TaskDetail::Finish);
        Ok(())
    }

    /// Rolls the request back to its pre-dispatch pair.
    ///
    /// Used when terminal sub-status 5 is configured to mean a cancelled
    /// order: an outbound cancellation restores the resting pair, a return
    /// cancellation restores the arrived pair.
    ///
    /// # Errors
    ///
    /// Fails unless an order is open.
    pub fn roll_back_open_order(&mut self, feeder_prefix: &str) -> Result<OrderPhase> {
        let phase = match self.open_order.as_ref() {
            Some(order) => order.phase,
            None => {
                return Err(Error::InvalidStateTransition {
                    request_id: self.id,
                    message: "no open order to roll back".to_string(),
                })
            }
        };
        self.open_order = None;
        match phase {
            OrderPhase::Outbound => {
                let pair = self.resting_pair(feeder_prefix);
                self.status_near = pair.near;
                self.status_far = pair.far;
            }
            OrderPhase::Return => {
                self.status_near = PrepStatus::Waiting;
                self.status_far = PrepStatus::Ready;
            }
        }
        Ok(phase)
    }

    /// Marks this request as the non-selected sibling.
    pub fn deactivate(&mut self) {
        self.status_near = PrepStatus::Inactive;
        self.status_far = PrepStatus::Inactive;
        self.open_order = None;
    }

    /// Restores an inactive sibling to the idle pair.
    pub fn restore_idle(&mut self, feeder_prefix: &str) {
        let pair = self.resting_pair(feeder_prefix);
        self.status_near = pair.near;
        self.status_far = pair.far;
    }

    /// Overwrites the status pair (manual override only).
    pub fn force_pair(&mut self, pair: StatusPair) {
        self.status_near = pair.near;
        self.status_far = pair.far;
    }

    fn ensure_no_open_order(&self, op: &str) -> Result<()> {
        if let Some(order) = &self.open_order {
            return Err(Error::InvalidStateTransition {
                request_id: self.id,
                message: format!("{op} with order {} still in flight", order.order_id),
            });
        }
        Ok(())
    }

    fn take_order(&mut self, expected: OrderPhase) -> Result<OpenOrder> {
        match self.open_order.take() {
            Some(order) if order.phase == expected => Ok(order),
            Some(order) => {
                let phase = order.phase;
                self.open_order = Some(order);
                Err(Error::InvalidStateTransition {
                    request_id: self.id,
                    message: format!("expected open {expected} order, found {phase}"),
                })
            }
            None => Err(Error::InvalidStateTransition {
                request_id: self.id,
                message: format!("expected open {expected} order, found none"),
            }),
        }
    }
}
