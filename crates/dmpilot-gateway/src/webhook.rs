// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `/webhook`: the subscription handshake and message deliveries.
//!
//! A delivery is verified, parsed, and normalized on the request path,
//! then handed to the worker queue. Past verification the response is
//! always `200 EVENT_RECEIVED`, including when the queue is full: the
//! platform retries non-2xx responses, and retries would only add load.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use dmpilot_instagram::{normalize, verify_signature, SubscriptionQuery, WebhookPayload, SIGNATURE_HEADER};
use dmpilot_pipeline::{metrics, EnqueueError};
use tracing::{debug, info, warn};

use crate::server::GatewayState;

pub const ACK_BODY: &str = "EVENT_RECEIVED";

/// GET /webhook
pub async fn subscription_handshake(
    State(state): State<GatewayState>,
    Query(query): Query<SubscriptionQuery>,
) -> Response {
    match dmpilot_instagram::verify_subscription(&query, state.secrets.verify_token.as_deref()) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(mode = ?query.mode, "webhook subscription rejected");
            StatusCode::FORBIDDEN.into_response()
        }
    }
}

/// POST /webhook
pub async fn receive_delivery(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let Some(secret) = state.secrets.signing_secret.as_deref() else {
        warn!("no app secret configured, rejecting delivery");
        metrics::webhook_delivery("rejected");
        return StatusCode::FORBIDDEN.into_response();
    };
    if !verify_signature(&body, signature, Some(secret)) {
        warn!(has_signature = signature.is_some(), "webhook signature mismatch");
        metrics::webhook_delivery("rejected");
        return StatusCode::FORBIDDEN.into_response();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "webhook body is not valid JSON");
            metrics::webhook_delivery("malformed");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let batches = normalize(&payload);
    if batches.is_empty() {
        debug!("delivery carried no text messages");
        metrics::webhook_delivery("empty");
        return ack();
    }

    let mut shed = 0usize;
    for (sender_id, batch) in batches {
        match state.queue.try_enqueue(batch) {
            Ok(()) => debug!(sender_id = %sender_id, "batch queued"),
            Err(EnqueueError::Full) => shed += 1,
            Err(EnqueueError::Closed) => {
                warn!(sender_id = %sender_id, "worker pool shutting down, batch dropped");
                shed += 1;
            }
        }
    }
    if shed > 0 {
        warn!(shed, "delivery acknowledged with batches shed");
        metrics::webhook_delivery("shed");
    } else {
        metrics::webhook_delivery("accepted");
    }
    ack()
}

fn ack() -> Response {
    (StatusCode::OK, ACK_BODY).into_response()
}
