//! # cartage-flow
//!
//! Coordination core for carrier movement between named physical locations
//! serviced by an external AMR fleet dispatcher.
//!
//! This crate implements the preparation domain, providing:
//!
//! - **Preparation Ledger**: part and pack request records whose status
//!   pairs cycle through a closed state machine
//! - **Slot Arbitration**: single-occupant mutual exclusion over the two
//!   shared buffer destinations, with broadcast promotion of queued
//!   requests on release
//! - **Reconciliation**: a non-overlapping periodic pass that polls every
//!   open dispatch order and advances ledger state on completion
//! - **Manual Override**: a transactional correction path that reproduces
//!   the normal flow's invariants when automation stalls
//!
//! ## Core Concepts
//!
//! - **Request**: one seeded ledger row binding a fixed endpoint to a
//!   selectable candidate endpoint; never deleted, only cycled
//! - **Slot**: one of the two shared buffers; the only contended resource
//! - **Order**: an ephemeral move order issued to the fleet dispatcher,
//!   tracked on its owning request until it resolves
//!
//! ## Guarantees
//!
//! - **Race-free acquisition**: slot acquisition is an atomic check-and-set
//!   against the store; two requests can never both observe a free slot
//! - **Decoupled dispatch**: ledger writes commit before the fleet call, so
//!   operator intent survives a dispatcher outage
//! - **Single-pass reconciliation**: passes never overlap; a slow poll
//!   delays but never double-processes an order

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]

pub mod arbiter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod reconciler;
pub mod request;
pub mod seed;
pub mod service;
pub mod slot;
pub mod store;
pub mod troubleshoot;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::arbiter::{AcquireOutcome, SlotArbiter};
    pub use crate::config::{FlowConfig, TerminalCodePolicy};
    pub use crate::dispatch::{DispatchClient, OrderProgress};
    pub use crate::error::{Error, Result};
    pub use crate::reconciler::{PassSummary, Reconciler};
    pub use crate::request::{
        LegSide, OrderPhase, PrepStatus, PreparationRequest, RequestClass, StatusPair,
    };
    pub use crate::service::{MarkReadyOutcome, PreparationService};
    pub use crate::slot::SharedSlot;
    pub use crate::store::{memory::InMemoryStore, Store};
    pub use crate::troubleshoot::ManualOverride;
}
