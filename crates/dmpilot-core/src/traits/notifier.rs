// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hook invoked when a tenant's reply quota runs low.

use async_trait::async_trait;
use tracing::info;

use crate::error::DmpilotError;
use crate::types::QuotaWarning;

/// Receives low-quota warnings after a successful quota increment.
#[async_trait]
pub trait QuotaNotifier: Send + Sync + 'static {
    async fn quota_warning(&self, warning: &QuotaWarning) -> Result<(), DmpilotError>;
}

/// Notifier that only writes the warning to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl QuotaNotifier for LogNotifier {
    async fn quota_warning(&self, warning: &QuotaWarning) -> Result<(), DmpilotError> {
        info!(
            user_id = warning.user_id,
            remaining = warning.remaining,
            threshold = warning.threshold,
            has_email = warning.email.is_some(),
            "reply quota warning due"
        );
        Ok(())
    }
}
