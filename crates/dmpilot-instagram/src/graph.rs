// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graph API channel: outbound text sends and sender username lookup.

use std::time::Duration;

use async_trait::async_trait;
use dmpilot_config::model::InstagramConfig;
use dmpilot_core::traits::{ChannelAdapter, PluginAdapter};
use dmpilot_core::types::{AdapterType, HealthStatus, TenantConnection};
use dmpilot_core::DmpilotError;
use reqwest::Url;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphErrorResponse {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// [`ChannelAdapter`] for the Instagram Messaging API.
///
/// The access token travels as a query parameter, so request errors are
/// stripped of their URL before they are logged or returned.
#[derive(Debug, Clone)]
pub struct GraphChannel {
    client: reqwest::Client,
    base_url: String,
    send_timeout: Duration,
    lookup_timeout: Duration,
}

impl GraphChannel {
    pub fn new(config: &InstagramConfig) -> Result<Self, DmpilotError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| DmpilotError::Channel {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/{}",
                config.graph_base_url.trim_end_matches('/'),
                config.api_version
            ),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            lookup_timeout: Duration::from_secs(config.lookup_timeout_secs),
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, DmpilotError> {
        Url::parse_with_params(&format!("{}/{path}", self.base_url), params).map_err(|e| {
            DmpilotError::Channel {
                message: format!("invalid Graph API URL: {e}"),
                source: None,
            }
        })
    }
}

fn credential(connection: &TenantConnection) -> Result<&str, DmpilotError> {
    if connection.send_credential.is_empty() {
        return Err(DmpilotError::Channel {
            message: "connection has no access token".into(),
            source: None,
        });
    }
    Ok(&connection.send_credential)
}

fn request_error(context: &str, e: reqwest::Error) -> DmpilotError {
    let e = e.without_url();
    DmpilotError::Channel {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

async fn status_error(context: &str, response: reqwest::Response) -> DmpilotError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = match serde_json::from_str::<GraphErrorResponse>(&body) {
        Ok(err) => match err.error.code {
            Some(code) => format!("{} (code {code})", err.error.message),
            None => err.error.message,
        },
        Err(_) => "unknown API error".to_string(),
    };
    DmpilotError::Channel {
        message: format!("{context} returned {status}: {detail}"),
        source: None,
    }
}

#[async_trait]
impl PluginAdapter for GraphChannel {
    fn name(&self) -> &str {
        "instagram"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, DmpilotError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), DmpilotError> {
        debug!("Graph channel shutting down");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for GraphChannel {
    async fn send_text(
        &self,
        connection: &TenantConnection,
        recipient_id: &str,
        text: &str,
    ) -> Result<(), DmpilotError> {
        let token = credential(connection)?;
        let url = self.url(
            &format!("{}/messages", connection.platform_page_id),
            &[("access_token", token)],
        )?;
        let payload = json!({
            "recipient": {"id": recipient_id},
            "message": {"text": text},
        });

        let response = self
            .client
            .post(url)
            .timeout(self.send_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_error("send request failed", e))?;

        if !response.status().is_success() {
            let err = status_error("send", response).await;
            warn!(recipient_id, error = %err, "outbound send rejected");
            return Err(err);
        }

        info!(
            recipient_id,
            connection_id = ?connection.connection_id,
            "reply sent"
        );
        Ok(())
    }

    async fn fetch_username(
        &self,
        connection: &TenantConnection,
        sender_id: &str,
    ) -> Result<Option<String>, DmpilotError> {
        let token = credential(connection)?;
        let url = self.url(
            sender_id,
            &[("fields", "username"), ("access_token", token)],
        )?;

        let response = self
            .client
            .get(url)
            .timeout(self.lookup_timeout)
            .send()
            .await
            .map_err(|e| request_error("profile lookup failed", e))?;

        if !response.status().is_success() {
            return Err(status_error("profile lookup", response).await);
        }

        let profile: ProfileResponse = response
            .json()
            .await
            .map_err(|e| request_error("profile lookup returned invalid JSON", e))?;

        Ok(profile
            .username
            .map(|u| u.trim().to_lowercase())
            .filter(|u| !u.is_empty()))
    }
}
