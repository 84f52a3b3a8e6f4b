//! HTTP client for the external fleet dispatch service.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cartage_core::{NetworkAddress, OrderId};

use super::{DispatchClient, OrderProgress};
use crate::config::FleetConfig;
use crate::error::{Error, Result};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Envelope code the fleet service uses for a well-formed answer.
const FLEET_OK: i64 = 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddTaskRequest<'a> {
    model_process_code: &'a str,
    from_system: &'a str,
    order_id: &'a str,
    task_order_detail: Vec<TaskPathEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskPathEntry {
    task_path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusRequest<'a> {
    order_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Option<StatusData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusData {
    #[serde(default)]
    task_order_detail: Vec<SubTaskEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubTaskEntry {
    #[serde(default)]
    sub_task_status: i32,
}

/// HTTP client for the fleet dispatcher.
///
/// Orders are identified by ids generated on the caller's side and carried
/// through submission and polling; the fleet echoes them back but never
/// assigns its own.
#[derive(Clone)]
pub struct FleetClient {
    config: FleetConfig,
    client: reqwest::Client,
}

impl FleetClient {
    /// Creates a new client from fleet wire settings.
    #[must_use]
    pub fn new(config: FleetConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    fn add_task_url(&self) -> String {
        format!("{}/taskOrder/addTask", self.config.base_url.trim_end_matches('/'))
    }

    fn status_url(&self) -> String {
        format!(
            "{}/out/task/getTaskOrderStatus",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl DispatchClient for FleetClient {
    async fn submit_order(
        &self,
        origin: &NetworkAddress,
        destination: &NetworkAddress,
    ) -> Result<OrderId> {
        let order_id = OrderId::generate();
        let payload = AddTaskRequest {
            model_process_code: &self.config.process_code,
            from_system: &self.config.from_system,
            order_id: order_id.as_str(),
            task_order_detail: vec![TaskPathEntry {
                task_path: format!("{origin},{destination}"),
            }],
        };

        let response = self
            .client
            .post(self.add_task_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                Error::dispatch_unavailable_with_source("order submission failed", e)
            })?;

        if !response.status().is_success() {
            return Err(Error::dispatch_unavailable(format!(
                "order submission rejected ({})",
                response.status()
            )));
        }

        Ok(order_id)
    }

    async fn poll_order(&self, order: &OrderId) -> Result<OrderProgress> {
        let payload = StatusRequest {
            order_id: order.as_str(),
        };

        let response = self
            .client
            .post(self.status_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::dispatch_unavailable_with_source("status poll failed", e))?;

        if !response.status().is_success() {
            return Err(Error::dispatch_unavailable(format!(
                "status poll rejected ({})",
                response.status()
            )));
        }

        let envelope: StatusEnvelope = response.json().await.map_err(|e| {
            Error::dispatch_unavailable_with_source("invalid status response", e)
        })?;

        if envelope.code != FLEET_OK {
            tracing::debug!(order = %order, code = envelope.code, "anomalous status envelope");
            return Ok(OrderProgress::Unrecognized(0));
        }
        let sub_status = envelope
            .data
            .and_then(|data| data.task_order_detail.into_iter().next())
            .map(|entry| entry.sub_task_status);
        match sub_status {
            Some(code) => Ok(OrderProgress::from_code(code)),
            None => Ok(OrderProgress::Unrecognized(0)),
        }
    }
}
