// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric hooks. Compiled to no-ops without the `prometheus` feature.

#[cfg(feature = "prometheus")]
use dmpilot_prometheus::recording;

#[inline]
pub fn webhook_delivery(_outcome: &'static str) {
    #[cfg(feature = "prometheus")]
    recording::record_webhook_delivery(_outcome);
}

#[inline]
pub fn batch(_outcome: &'static str) {
    #[cfg(feature = "prometheus")]
    recording::record_batch(_outcome);
}

#[inline]
pub fn denial(_gate: &'static str) {
    #[cfg(feature = "prometheus")]
    recording::record_denial(_gate);
}

#[inline]
pub fn ai_call(_outcome: &'static str, _seconds: f64) {
    #[cfg(feature = "prometheus")]
    recording::record_ai_call(_outcome, _seconds);
}

#[inline]
pub fn reply_dispatched() {
    #[cfg(feature = "prometheus")]
    recording::record_reply_dispatched();
}

#[inline]
pub fn send_failure() {
    #[cfg(feature = "prometheus")]
    recording::record_send_failure();
}

#[inline]
pub fn queue_rejection() {
    #[cfg(feature = "prometheus")]
    recording::record_queue_rejection();
}
