// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `POST /webhook/billing`: idempotent receipt of billing provider events.
//!
//! Only the claim is handled here. Syncing subscription state from the
//! event belongs to the billing service.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct BillingEvent {
    pub id: String,
    #[serde(rename = "type", default)]
    pub event_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BillingAck {
    pub status: &'static str,
}

pub async fn receive_billing_event(
    State(state): State<GatewayState>,
    Json(event): Json<BillingEvent>,
) -> (StatusCode, Json<BillingAck>) {
    if event.id.is_empty() {
        return (StatusCode::BAD_REQUEST, Json(BillingAck { status: "missing_id" }));
    }
    match state.storage.claim_billing_event(&event.id).await {
        Ok(true) => {
            info!(event_id = %event.id, event_type = ?event.event_type, "billing event accepted");
            (StatusCode::OK, Json(BillingAck { status: "accepted" }))
        }
        Ok(false) => {
            info!(event_id = %event.id, "duplicate billing event ignored");
            (StatusCode::OK, Json(BillingAck { status: "duplicate" }))
        }
        Err(e) => {
            error!(event_id = %event.id, error = %e, "billing event claim failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(BillingAck { status: "error" }),
            )
        }
    }
}
