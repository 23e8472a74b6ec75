// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed persona settings for a connection.
//!
//! Settings are stored as a JSON document per connection and validated
//! here, at the point where they leave storage. Every field is optional
//! with an explicit default so older documents keep loading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::DmpilotError;

/// Persona shown to the AI provider when no settings exist for a connection.
pub const FALLBACK_PERSONALITY: &str =
    "You must still act like a real human. Keep responses short and conversational.";

/// A promotional link the persona may mention.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromoLink {
    pub url: String,
    pub title: Option<String>,
}

/// A short description of one of the account's posts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostHighlight {
    pub description: String,
}

/// Persona and moderation settings for one connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaSettings {
    pub bot_name: Option<String>,
    pub bot_age: Option<String>,
    pub bot_location: Option<String>,
    pub bot_occupation: Option<String>,
    pub bot_personality: Option<String>,
    pub avoid_topics: Option<String>,
    pub links: Vec<PromoLink>,
    pub posts: Vec<PostHighlight>,
    /// Sample replies keyed `conv_example_{n}_reply_{m}`.
    pub conversation_samples: BTreeMap<String, String>,
    /// Usernames whose messages never get a reply.
    pub blocked_users: Vec<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl PersonaSettings {
    /// Parses and normalizes a stored settings document.
    ///
    /// Blank strings become `None`, links without a URL and posts without a
    /// description are dropped, and blocked usernames are lowercased with a
    /// leading `@` removed.
    pub fn from_json(raw: &str) -> Result<Self, DmpilotError> {
        let parsed: PersonaSettings =
            serde_json::from_str(raw).map_err(|e| DmpilotError::Storage {
                source: Box::new(e),
            })?;
        Ok(parsed.normalized())
    }

    /// Settings used when a connection has none stored.
    pub fn fallback() -> Self {
        Self {
            bot_personality: Some(FALLBACK_PERSONALITY.to_string()),
            ..Self::default()
        }
    }

    fn normalized(mut self) -> Self {
        for field in [
            &mut self.bot_name,
            &mut self.bot_age,
            &mut self.bot_location,
            &mut self.bot_occupation,
            &mut self.bot_personality,
            &mut self.avoid_topics,
        ] {
            *field = field
                .take()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
        }

        self.links.retain(|l| !l.url.trim().is_empty());
        for link in &mut self.links {
            link.url = link.url.trim().to_string();
            link.title = link
                .title
                .take()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());
        }

        self.posts.retain(|p| !p.description.trim().is_empty());
        for post in &mut self.posts {
            post.description = post.description.trim().to_string();
        }

        self.conversation_samples
            .retain(|_, reply| !reply.trim().is_empty());

        self.blocked_users = self
            .blocked_users
            .iter()
            .map(|u| normalize_username(u))
            .filter(|u| !u.is_empty())
            .collect();

        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            self.temperature = None;
        }

        self
    }

    /// True if `username` is on the block list (case-insensitive, `@` optional).
    pub fn is_blocked(&self, username: &str) -> bool {
        let wanted = normalize_username(username);
        !wanted.is_empty() && self.blocked_users.iter().any(|u| *u == wanted)
    }
}

/// Lowercases a username and strips surrounding whitespace and a leading `@`.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_document() {
        let raw = r#"{
            "bot_name": " Mia ",
            "bot_age": "24",
            "links": [{"url": "https://linktr.ee/mia", "title": "Linktree"}, {"url": "  "}],
            "posts": [{"description": "beach shoot"}, {"description": ""}],
            "conversation_samples": {"conv_example_1_reply_1": "haha thanks", "conv_example_1_reply_2": " "},
            "blocked_users": ["@Spammer", "troll "]
        }"#;
        let settings = PersonaSettings::from_json(raw).unwrap();
        assert_eq!(settings.bot_name.as_deref(), Some("Mia"));
        assert_eq!(settings.links.len(), 1);
        assert_eq!(settings.posts.len(), 1);
        assert_eq!(settings.conversation_samples.len(), 1);
        assert_eq!(settings.blocked_users, vec!["spammer", "troll"]);
    }

    #[test]
    fn missing_fields_default() {
        let settings = PersonaSettings::from_json("{}").unwrap();
        assert_eq!(settings, PersonaSettings::default());
    }

    #[test]
    fn malformed_document_is_a_storage_error() {
        let err = PersonaSettings::from_json("{not json").unwrap_err();
        assert!(matches!(err, DmpilotError::Storage { .. }));
    }

    #[test]
    fn out_of_range_temperature_is_dropped() {
        let settings = PersonaSettings::from_json(r#"{"temperature": 7.5}"#).unwrap();
        assert!(settings.temperature.is_none());
    }

    #[test]
    fn block_list_matching_ignores_case_and_at_sign() {
        let settings = PersonaSettings {
            blocked_users: vec!["spammer".into()],
            ..Default::default()
        };
        assert!(settings.is_blocked("@SPAMMER"));
        assert!(!settings.is_blocked("friend"));
        assert!(!settings.is_blocked(""));
    }

    #[test]
    fn fallback_uses_neutral_personality() {
        let settings = PersonaSettings::fallback();
        assert_eq!(settings.bot_personality.as_deref(), Some(FALLBACK_PERSONALITY));
        assert!(settings.bot_name.is_none());
    }
}
