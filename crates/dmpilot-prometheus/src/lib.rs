// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for dmpilot.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. Metrics are
//! rendered as Prometheus text by [`PrometheusAdapter::render`], which the
//! gateway serves on `GET /metrics`.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use dmpilot_core::traits::PluginAdapter;
use dmpilot_core::types::{AdapterType, HealthStatus};
use dmpilot_core::DmpilotError;

pub use recording::{
    record_ai_call, record_batch, record_denial, record_queue_rejection, record_reply_dispatched,
    record_send_failure, record_webhook_delivery,
};

/// Installs the Prometheus recorder and renders its snapshot.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call errors.
    pub fn new() -> Result<Self, DmpilotError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            DmpilotError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Wrap a handle from a recorder built elsewhere (tests, embedding).
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, DmpilotError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DmpilotError> {
        Ok(())
    }
}
