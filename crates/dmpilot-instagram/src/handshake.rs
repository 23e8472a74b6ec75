// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook subscription handshake (`GET /webhook`).

use serde::Deserialize;

/// Query parameters the platform sends when registering the webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Returns the challenge to echo back, or `None` to reject with 403.
///
/// Rejects when no verify token is configured.
pub fn verify_subscription(query: &SubscriptionQuery, expected_token: Option<&str>) -> Option<String> {
    let expected = expected_token.filter(|t| !t.is_empty())?;
    if query.mode.as_deref() != Some("subscribe") {
        return None;
    }
    if query.verify_token.as_deref() != Some(expected) {
        return None;
    }
    query.challenge.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(mode: &str, token: &str, challenge: &str) -> SubscriptionQuery {
        SubscriptionQuery {
            mode: Some(mode.into()),
            verify_token: Some(token.into()),
            challenge: Some(challenge.into()),
        }
    }

    #[test]
    fn matching_token_echoes_challenge() {
        let q = query("subscribe", "tok", "1158201444");
        assert_eq!(verify_subscription(&q, Some("tok")).as_deref(), Some("1158201444"));
    }

    #[test]
    fn wrong_token_or_mode_rejects() {
        assert!(verify_subscription(&query("subscribe", "nope", "c"), Some("tok")).is_none());
        assert!(verify_subscription(&query("unsubscribe", "tok", "c"), Some("tok")).is_none());
    }

    #[test]
    fn unconfigured_token_rejects_everything() {
        assert!(verify_subscription(&query("subscribe", "", "c"), Some("")).is_none());
        assert!(verify_subscription(&query("subscribe", "tok", "c"), None).is_none());
    }

    #[test]
    fn query_deserializes_dotted_names() {
        let q: SubscriptionQuery = serde_json::from_value(serde_json::json!({
            "hub.mode": "subscribe",
            "hub.verify_token": "tok",
            "hub.challenge": "42"
        }))
        .unwrap();
        assert_eq!(q.challenge.as_deref(), Some("42"));
    }
}
