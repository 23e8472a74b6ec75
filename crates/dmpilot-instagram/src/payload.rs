// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook delivery schema. Unknown fields are ignored.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    /// The page (business account) the entry belongs to.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub messaging: Option<Vec<MessagingEvent>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagingEvent {
    #[serde(default)]
    pub sender: Option<Party>,
    #[serde(default)]
    pub recipient: Option<Party>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub message: Option<MessagePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Party {
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub is_echo: bool,
}
