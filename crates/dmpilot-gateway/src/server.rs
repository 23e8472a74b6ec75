// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    routing::{get, post},
    Router,
};
use dmpilot_config::model::{InstagramConfig, ServerConfig};
use dmpilot_core::{DmpilotError, StorageAdapter};
use dmpilot_pipeline::WorkQueue;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::billing;
use crate::handlers;
use crate::webhook;

/// Health state for the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: Instant,
    /// Prometheus text renderer; `None` when the exporter is disabled.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

impl HealthState {
    pub fn new(prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>) -> Self {
        Self {
            start_time: Instant::now(),
            prometheus_render,
        }
    }
}

/// Secrets the webhook endpoint checks deliveries against.
#[derive(Clone)]
pub struct WebhookSecrets {
    pub verify_token: Option<String>,
    /// App secret for `X-Hub-Signature-256`. Without one every delivery is
    /// rejected.
    pub signing_secret: Option<String>,
}

impl WebhookSecrets {
    pub fn from_config(config: &InstagramConfig) -> Self {
        Self {
            verify_token: config.verify_token.clone().filter(|t| !t.is_empty()),
            signing_secret: config.signing_secret().map(str::to_string),
        }
    }
}

impl std::fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSecrets")
            .field("verify_token", &self.verify_token.as_ref().map(|_| "[redacted]"))
            .field(
                "signing_secret",
                &self.signing_secret.as_ref().map(|_| "[redacted]"),
            )
            .finish()
    }
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub secrets: Arc<WebhookSecrets>,
    /// Producer side of the worker pool.
    pub queue: WorkQueue,
    /// Used by the billing endpoint only; webhook deliveries never touch
    /// storage on the request path.
    pub storage: Arc<dyn StorageAdapter>,
    pub health: HealthState,
}

/// All gateway routes:
/// - GET/POST /webhook
/// - POST /webhook/billing
/// - GET /health
/// - GET /metrics
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route(
            "/webhook",
            get(webhook::subscription_handshake).post(webhook::receive_delivery),
        )
        .route("/webhook/billing", post(billing::receive_billing_event))
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until `cancel` fires, then stop accepting connections
/// and let in-flight requests finish.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), DmpilotError> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DmpilotError::Channel {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| DmpilotError::Channel {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Gateway server stopped");
    Ok(())
}
