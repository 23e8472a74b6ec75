// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder collects these;
//! with no recorder installed every call is a no-op.

use metrics::{describe_counter, describe_histogram};

/// Register all dmpilot metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "dmpilot_webhook_deliveries_total",
        "Webhook deliveries by outcome"
    );
    describe_counter!(
        "dmpilot_batches_processed_total",
        "Sender batches processed by outcome"
    );
    describe_counter!(
        "dmpilot_admission_denials_total",
        "Batches denied by admission gate"
    );
    describe_counter!("dmpilot_ai_calls_total", "AI provider calls by outcome");
    describe_counter!(
        "dmpilot_replies_dispatched_total",
        "Replies confirmed sent to the platform"
    );
    describe_counter!(
        "dmpilot_send_failures_total",
        "Outbound sends rejected or failed"
    );
    describe_counter!(
        "dmpilot_queue_rejections_total",
        "Batches dropped because the worker queue was full"
    );
    describe_histogram!(
        "dmpilot_ai_latency_seconds",
        "AI provider call latency in seconds"
    );
}

pub fn record_webhook_delivery(outcome: &'static str) {
    metrics::counter!("dmpilot_webhook_deliveries_total", "outcome" => outcome).increment(1);
}

pub fn record_batch(outcome: &'static str) {
    metrics::counter!("dmpilot_batches_processed_total", "outcome" => outcome).increment(1);
}

pub fn record_denial(gate: &'static str) {
    metrics::counter!("dmpilot_admission_denials_total", "gate" => gate).increment(1);
}

pub fn record_ai_call(outcome: &'static str, seconds: f64) {
    metrics::counter!("dmpilot_ai_calls_total", "outcome" => outcome).increment(1);
    metrics::histogram!("dmpilot_ai_latency_seconds").record(seconds);
}

pub fn record_reply_dispatched() {
    metrics::counter!("dmpilot_replies_dispatched_total").increment(1);
}

pub fn record_send_failure() {
    metrics::counter!("dmpilot_send_failures_total").increment(1);
}

pub fn record_queue_rejection() {
    metrics::counter!("dmpilot_queue_rejections_total").increment(1);
}
