//! Observability infrastructure shared by cartage services.
//!
//! Structured logging with consistent spans. Services call
//! [`init_logging`] once at startup; tests may call it freely since
//! repeated initialization is a no-op.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: controls log levels (e.g., `info`, `cartage_flow=debug`)
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for ledger operations with standard fields.
#[must_use]
pub fn ledger_span(operation: &str, request_id: &str) -> Span {
    tracing::info_span!("ledger", op = operation, request_id = request_id)
}

/// Creates a span for one reconciliation pass.
#[must_use]
pub fn reconcile_span(open_orders: usize) -> Span {
    tracing::info_span!("reconcile", open_orders = open_orders)
}
