//! Move-order dispatch abstraction.
//!
//! This module provides:
//!
//! - [`DispatchClient`]: trait for submitting and polling move orders
//! - [`OrderProgress`]: typed interpretation of the fleet's sub-status codes
//! - [`fleet::FleetClient`]: HTTP client for the external fleet service
//! - [`memory::InMemoryDispatchClient`]: scriptable fake for tests
//!
//! ## Design Principles
//!
//! - **Pull only**: the fleet service exposes no push channel; order state
//!   is learned exclusively by polling
//! - **No cancellation**: once issued, an order runs to whatever terminal
//!   state the fleet reports
//! - **Typed codes**: the wire's numeric sub-status codes are mapped into
//!   a closed enum at the boundary; unrecognized codes stay inert

pub mod fleet;
pub mod memory;

use async_trait::async_trait;

use cartage_core::{NetworkAddress, OrderId};

use crate::error::Result;

/// Typed interpretation of the fleet's order sub-status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderProgress {
    /// Code 1: the robot is en route.
    EnRoute,
    /// Code 2: the robot is executing the handover.
    Executing,
    /// Code 3: the order completed.
    Complete,
    /// Code 5: terminal, semantics configurable (completed vs cancelled).
    Terminated,
    /// Any other code; reconciliation ignores it.
    Unrecognized(i32),
}

impl OrderProgress {
    /// Maps a wire sub-status code.
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            1 => Self::EnRoute,
            2 => Self::Executing,
            3 => Self::Complete,
            5 => Self::Terminated,
            other => Self::Unrecognized(other),
        }
    }

    /// Returns true if the order has reached a terminal code.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Terminated)
    }

    /// Returns a label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(self) -> &'static str {
        match self {
            Self::EnRoute => "en_route",
            Self::Executing => "executing",
            Self::Complete => "complete",
            Self::Terminated => "terminated",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

impl std::fmt::Display for OrderProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unrecognized(code) => write!(f, "unrecognized({code})"),
            other => f.write_str(other.as_label()),
        }
    }
}

/// Client for the external fleet dispatch service.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync`; the reconciler and operator handlers
/// share one client.
#[async_trait]
pub trait DispatchClient: Send + Sync {
    /// Issues a move order from `origin` to `destination`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::Error::DispatchUnavailable`] on
    /// transport or timeout errors. Callers that have already committed a
    /// ledger write must surface this as a partial success, not roll back.
    async fn submit_order(
        &self,
        origin: &NetworkAddress,
        destination: &NetworkAddress,
    ) -> Result<OrderId>;

    /// Polls the current progress of an order.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::error::Error::DispatchUnavailable`] on
    /// transport errors; an anomalous but well-formed response maps to
    /// [`OrderProgress::Unrecognized`] instead of an error.
    async fn poll_order(&self, order: &OrderId) -> Result<OrderProgress>;
}
