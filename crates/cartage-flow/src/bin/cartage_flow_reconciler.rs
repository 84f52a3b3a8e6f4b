//! Cartage flow reconciler service.
//!
//! Seeds the ledger from a configuration document, then polls open
//! dispatch orders at a fixed interval. Exposes a health endpoint and a
//! manually triggered pass for operations.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use cartage_core::observability::{init_logging, LogFormat};
use cartage_flow::config::FlowConfig;
use cartage_flow::dispatch::fleet::FleetClient;
use cartage_flow::dispatch::DispatchClient;
use cartage_flow::error::{Error, Result};
use cartage_flow::reconciler::{PassSummary, Reconciler};
use cartage_flow::seed::Seed;
use cartage_flow::store::memory::InMemoryStore;
use cartage_flow::store::Store;

#[derive(Clone)]
struct AppState {
    reconciler: Arc<Reconciler>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
struct ApiError {
    message: String,
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self {
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RunResponse {
    skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<PassSummary>,
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

async fn run_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<RunResponse>, ApiError> {
    let summary = state.reconciler.tick().await;
    Ok(Json(RunResponse {
        skipped: summary.is_none(),
        summary,
    }))
}

fn required_env(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| Error::from(cartage_core::Error::configuration(format!("missing {key}"))))
}

fn resolve_port() -> Result<u16> {
    match std::env::var("PORT") {
        Ok(port) => port.parse::<u16>().map_err(|_| {
            Error::from(cartage_core::Error::configuration("invalid PORT"))
        }),
        Err(_) => Ok(8080),
    }
}

fn log_format_from_env() -> LogFormat {
    match std::env::var("CARTAGE_LOG_FORMAT") {
        Ok(value) if value.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

fn load_config() -> Result<FlowConfig> {
    let mut config = match std::env::var("CARTAGE_CONFIG_FILE") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                Error::from(cartage_core::Error::configuration(format!(
                    "cannot read {path}: {e}"
                )))
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                Error::from(cartage_core::Error::configuration(format!(
                    "invalid config {path}: {e}"
                )))
            })?
        }
        Err(_) => FlowConfig::default(),
    };
    if let Ok(url) = std::env::var("CARTAGE_FLEET_URL") {
        config.fleet.base_url = url;
    }
    if let Ok(interval) = std::env::var("CARTAGE_POLL_INTERVAL_SECS") {
        config.poll_interval_secs = interval.parse().map_err(|_| {
            Error::from(cartage_core::Error::configuration(
                "invalid CARTAGE_POLL_INTERVAL_SECS",
            ))
        })?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging(log_format_from_env());

    let config = load_config()?;
    let seed_path = required_env("CARTAGE_SEED_FILE")?;
    let seed_raw = std::fs::read_to_string(&seed_path).map_err(|e| {
        Error::from(cartage_core::Error::configuration(format!(
            "cannot read {seed_path}: {e}"
        )))
    })?;
    let seed = Seed::from_json(&seed_raw)?;

    if let Ok(listen) = std::env::var("CARTAGE_METRICS_PORT") {
        let port: u16 = listen.parse().map_err(|_| {
            Error::from(cartage_core::Error::configuration(
                "invalid CARTAGE_METRICS_PORT",
            ))
        })?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .map_err(|e| {
                Error::from(cartage_core::Error::configuration(format!(
                    "metrics exporter: {e}"
                )))
            })?;
    }

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::with_tags(
        config.buffer_spots(),
        seed.tags.clone(),
    ));
    let seeded = seed.populate(store.as_ref(), &config.feeder_prefix).await?;
    tracing::info!(seeded, spots = seed.spots.len(), "ledger seeded");

    let dispatch: Arc<dyn DispatchClient> = Arc::new(FleetClient::new(config.fleet.clone()));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&store),
        Arc::clone(&dispatch),
        config.clone(),
    ));

    {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move {
            reconciler.run().await;
        });
    }
    tracing::info!(
        interval_secs = config.poll_interval_secs,
        "reconciliation loop started"
    );

    let state = AppState { reconciler };
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/run", post(run_handler))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], resolve_port()?));
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        Error::from(cartage_core::Error::configuration(format!(
            "failed to bind: {e}"
        )))
    })?;

    axum::serve(listener, app).await.map_err(|e| {
        Error::from(cartage_core::Error::configuration(format!(
            "server error: {e}"
        )))
    })
}
