//! Periodic reconciliation of open dispatch orders.
//!
//! The fleet service exposes only a pull-status endpoint, so ledger state
//! advances through a periodic poll: one pass enumerates every request
//! with an open order, polls each, and applies the terminal transition
//! when an order resolves — including slot release, queue promotion, and
//! sibling restore on the return leg.
//!
//! ## Non-overlap
//!
//! Passes never overlap. The loop body is guarded by a non-blocking
//! in-flight lock; a tick (or an externally triggered run) that fires
//! while a pass is still executing is skipped rather than serialized, so
//! one order can never be double-processed within an interval.
//!
//! ## Failure containment
//!
//! A failed poll is logged and skips that order; a failed pass is logged
//! and does not stop the timer. A single bad order must not starve
//! reconciliation of the rest.

use std::sync::Arc;

use serde::Serialize;

use crate::arbiter::SlotArbiter;
use crate::config::{FlowConfig, TerminalCodePolicy};
use crate::dispatch::{DispatchClient, OrderProgress};
use crate::error::Result;
use crate::request::{OrderPhase, PreparationRequest, RequestClass};
use crate::store::Store;

/// What one pass did.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    /// Orders polled.
    pub polled: usize,
    /// Requests advanced by a terminal code.
    pub advanced: usize,
    /// Requests rolled back under the terminal-code-5 policy.
    pub rolled_back: usize,
    /// Orders whose poll or transition failed (retried next pass).
    pub failures: usize,
}

enum Applied {
    NoChange,
    Advanced,
    RolledBack,
}

/// The background reconciliation loop.
pub struct Reconciler {
    store: Arc<dyn Store>,
    dispatch: Arc<dyn DispatchClient>,
    arbiter: SlotArbiter,
    config: FlowConfig,
    in_flight: tokio::sync::Mutex<()>,
}

impl Reconciler {
    /// Creates a reconciler over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        dispatch: Arc<dyn DispatchClient>,
        config: FlowConfig,
    ) -> Self {
        let arbiter = SlotArbiter::new(Arc::clone(&store), config.feeder_prefix.clone());
        Self {
            store,
            dispatch,
            arbiter,
            config,
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    /// Runs one pass, unless a pass is already in flight.
    ///
    /// Returns `None` when skipped. Per-order failures are counted in the
    /// summary, not surfaced as errors.
    pub async fn tick(&self) -> Option<PassSummary> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            tracing::debug!("previous pass still in flight; tick skipped");
            crate::metrics::record_pass("skipped", 0);
            return None;
        };
        Some(self.run_pass().await)
    }

    /// Runs passes forever at the configured interval.
    pub async fn run(&self) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Some(summary) = self.tick().await {
                if summary.advanced > 0 || summary.failures > 0 {
                    tracing::info!(
                        polled = summary.polled,
                        advanced = summary.advanced,
                        rolled_back = summary.rolled_back,
                        failures = summary.failures,
                        "reconciliation pass finished"
                    );
                }
            }
        }
    }

    async fn run_pass(&self) -> PassSummary {
        let _timing = crate::metrics::TimingGuard::pass();
        let mut summary = PassSummary::default();

        let open = match self.store.list_open_orders().await {
            Ok(open) => open,
            Err(error) => {
                tracing::error!(%error, "failed to enumerate open orders");
                summary.failures += 1;
                return summary;
            }
        };
        crate::metrics::record_pass("completed", open.len());

        for request in open {
            summary.polled += 1;
            let request_id = request.id;
            match self.poll_and_apply(request).await {
                Ok(Applied::NoChange) => {}
                Ok(Applied::Advanced) => summary.advanced += 1,
                Ok(Applied::RolledBack) => summary.rolled_back += 1,
                Err(error) => {
                    summary.failures += 1;
                    tracing::warn!(request = %request_id, %error, "order reconciliation failed");
                }
            }
        }
        summary
    }

    async fn poll_and_apply(&self, request: PreparationRequest) -> Result<Applied> {
        let Some(order) = request.open_order.clone() else {
            return Ok(Applied::NoChange);
        };

        let progress = self.dispatch.poll_order(&order.order_id).await?;
        crate::metrics::record_poll(progress.as_label());

        match progress {
            OrderProgress::EnRoute | OrderProgress::Executing => Ok(Applied::NoChange),
            OrderProgress::Unrecognized(code) => {
                tracing::debug!(order = %order.order_id, code, "unrecognized sub-status ignored");
                Ok(Applied::NoChange)
            }
            OrderProgress::Complete => {
                self.advance(request, order.phase).await?;
                Ok(Applied::Advanced)
            }
            OrderProgress::Terminated => match self.config.terminal_code_policy {
                TerminalCodePolicy::CompleteAsSuccess => {
                    self.advance(request, order.phase).await?;
                    Ok(Applied::Advanced)
                }
                TerminalCodePolicy::RollBack => {
                    self.roll_back(request).await?;
                    Ok(Applied::RolledBack)
                }
            },
        }
    }

    /// Applies the terminal transition for a resolved order.
    #[tracing::instrument(skip(self, request), fields(request = %request.id, phase = %phase))]
    async fn advance(&self, mut request: PreparationRequest, phase: OrderPhase) -> Result<()> {
        match phase {
            OrderPhase::Outbound => {
                request.complete_outbound()?;
                self.store.save_request(&request).await?;
            }
            OrderPhase::Return => {
                request.complete_return(&self.config.feeder_prefix)?;
                self.store.save_request(&request).await?;

                // A completed shared-slot cycle frees the buffer and
                // re-evaluates everything blocked on it.
                if let Some(slot) = self.store.find_slot_holding(&request.id).await? {
                    self.arbiter.release(slot.id).await?;
                }

                // A completed pack cycle re-opens the lane for siblings.
                if request.class == RequestClass::Pack {
                    self.store
                        .restore_inactive_siblings(
                            RequestClass::Pack,
                            &request.fixed_endpoint,
                            &request.id,
                            &self.config.feeder_prefix,
                        )
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Rolls a cancelled order back to its pre-dispatch state.
    async fn roll_back(&self, mut request: PreparationRequest) -> Result<()> {
        let phase = request.roll_back_open_order(&self.config.feeder_prefix)?;
        self.store.save_request(&request).await?;

        // A cancelled outbound leg never parked a carrier in the buffer.
        if phase == OrderPhase::Outbound {
            if let Some(slot) = self.store.find_slot_holding(&request.id).await? {
                self.arbiter.release(slot.id).await?;
            }
        }
        tracing::info!(request = %request.id, %phase, "order rolled back by terminal-code policy");
        Ok(())
    }
}
