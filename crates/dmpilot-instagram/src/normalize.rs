// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns a webhook delivery into per-sender batches.

use std::collections::BTreeMap;

use dmpilot_core::types::{InboundEvent, SenderBatch};
use tracing::debug;

use crate::payload::WebhookPayload;

/// Group the delivery's text messages by sender.
///
/// Skipped without error:
/// - entries with no `messaging` array
/// - echoes of the account's own outbound messages
/// - events with no text (attachments, reactions, read receipts)
/// - events with no sender id
///
/// An empty map means there is nothing to do for this delivery.
pub fn normalize(payload: &WebhookPayload) -> BTreeMap<String, SenderBatch> {
    let mut by_sender: BTreeMap<String, Vec<InboundEvent>> = BTreeMap::new();

    for entry in &payload.entry {
        let Some(events) = &entry.messaging else {
            continue;
        };
        let page_id = entry.id.clone().unwrap_or_default();

        for event in events {
            let Some(message) = &event.message else {
                continue;
            };
            if message.is_echo {
                continue;
            }
            let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) else {
                continue;
            };
            let Some(sender) = event.sender.as_ref().filter(|s| !s.id.is_empty()) else {
                continue;
            };

            debug!(sender_id = %sender.id, len = text.len(), "inbound message");
            by_sender
                .entry(sender.id.clone())
                .or_default()
                .push(InboundEvent {
                    sender_id: sender.id.clone(),
                    recipient_id: event
                        .recipient
                        .as_ref()
                        .map(|r| r.id.clone())
                        .unwrap_or_default(),
                    page_id: page_id.clone(),
                    text: text.to_string(),
                    timestamp: event.timestamp.unwrap_or(0),
                    message_id: message.mid.clone().filter(|m| !m.is_empty()),
                });
        }
    }

    by_sender
        .into_iter()
        .map(|(sender, events)| {
            let batch = SenderBatch::new(sender.clone(), events);
            (sender, batch)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(value: serde_json::Value) -> WebhookPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn groups_by_sender_and_orders_by_timestamp() {
        let payload = parse(serde_json::json!({
            "object": "instagram",
            "entry": [{
                "id": "page-1",
                "time": 1700000000,
                "messaging": [
                    {"sender": {"id": "u1"}, "recipient": {"id": "biz"}, "timestamp": 30, "message": {"mid": "m3", "text": "third"}},
                    {"sender": {"id": "u2"}, "recipient": {"id": "biz"}, "timestamp": 10, "message": {"mid": "m9", "text": "other"}},
                    {"sender": {"id": "u1"}, "recipient": {"id": "biz"}, "timestamp": 10, "message": {"mid": "m1", "text": "first"}}
                ]
            }]
        }));

        let batches = normalize(&payload);
        assert_eq!(batches.len(), 2);

        let u1 = &batches["u1"];
        let texts: Vec<&str> = u1.events().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "third"]);
        assert_eq!(u1.routing_event().unwrap().page_id, "page-1");
        assert_eq!(u1.routing_event().unwrap().recipient_id, "biz");
    }

    #[test]
    fn skips_echoes_attachments_and_entries_without_messaging() {
        let payload = parse(serde_json::json!({
            "entry": [
                {"id": "page-1", "changes": [{"field": "comments"}]},
                {"id": "page-1", "messaging": [
                    {"sender": {"id": "biz"}, "recipient": {"id": "u1"}, "timestamp": 1, "message": {"mid": "e1", "text": "our reply", "is_echo": true}},
                    {"sender": {"id": "u1"}, "recipient": {"id": "biz"}, "timestamp": 2, "message": {"mid": "a1", "attachments": [{"type": "image"}]}},
                    {"sender": {"id": "u1"}, "recipient": {"id": "biz"}, "timestamp": 3, "read": {"mid": "x"}},
                    {"sender": {"id": "u1"}, "recipient": {"id": "biz"}, "timestamp": 4, "message": {"mid": "r1", "text": ""}}
                ]}
            ]
        }));
        assert!(normalize(&payload).is_empty());
    }

    #[test]
    fn missing_timestamp_and_mid_default() {
        let payload = parse(serde_json::json!({
            "entry": [{"id": "p", "messaging": [
                {"sender": {"id": "u1"}, "message": {"text": "hi"}}
            ]}]
        }));
        let batches = normalize(&payload);
        let event = &batches["u1"].events()[0];
        assert_eq!(event.timestamp, 0);
        assert_eq!(event.message_id, None);
        assert_eq!(event.recipient_id, "");
    }

    #[test]
    fn empty_payload_yields_nothing() {
        assert!(normalize(&parse(serde_json::json!({}))).is_empty());
    }
}
