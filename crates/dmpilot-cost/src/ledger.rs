// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-tenant, per-day AI spend ledger persisted to SQLite.
//!
//! One row per `(tenant_key, day)`. Rows only ever grow: reservations and
//! reconciliations both add, and a new day starts a new row.

use dmpilot_core::DmpilotError;
use dmpilot_storage::database::map_tr_err;
use tracing::debug;

/// Daily spend ledger backed by the `ai_budget_ledger` table.
#[derive(Clone)]
pub struct BudgetLedger {
    conn: tokio_rusqlite::Connection,
}

impl BudgetLedger {
    /// Create a ledger on an existing connection whose schema is migrated.
    pub fn new(conn: tokio_rusqlite::Connection) -> Self {
        Self { conn }
    }

    /// Atomically add a reservation and return the day's new total.
    ///
    /// Counts one request against the day. The upsert and the read of the
    /// resulting total are a single statement.
    pub async fn reserve(
        &self,
        tenant_key: &str,
        day: &str,
        amount_usd: f64,
    ) -> Result<f64, DmpilotError> {
        let tenant_key = tenant_key.to_string();
        let day = day.to_string();
        let total = self
            .conn
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "INSERT INTO ai_budget_ledger (tenant_key, day, accumulated_cost_usd, requests_count)
                     VALUES (?1, ?2, ?3, 1)
                     ON CONFLICT(tenant_key, day) DO UPDATE SET
                         accumulated_cost_usd = accumulated_cost_usd + excluded.accumulated_cost_usd,
                         requests_count = requests_count + 1,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     RETURNING accumulated_cost_usd",
                    rusqlite::params![tenant_key, day, amount_usd],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)?;
        debug!(amount_usd, total, "budget reserved");
        Ok(total)
    }

    /// Add a positive correction to the day's total. Non-positive amounts are ignored.
    pub async fn add(&self, tenant_key: &str, day: &str, amount_usd: f64) -> Result<(), DmpilotError> {
        if amount_usd <= 0.0 || amount_usd.is_nan() {
            return Ok(());
        }
        let tenant_key = tenant_key.to_string();
        let day = day.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO ai_budget_ledger (tenant_key, day, accumulated_cost_usd)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(tenant_key, day) DO UPDATE SET
                         accumulated_cost_usd = accumulated_cost_usd + excluded.accumulated_cost_usd,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    rusqlite::params![tenant_key, day, amount_usd],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Accumulated spend for the tenant on `day` (0.0 if no row).
    pub async fn daily_total(&self, tenant_key: &str, day: &str) -> Result<f64, DmpilotError> {
        let tenant_key = tenant_key.to_string();
        let day = day.to_string();
        self.conn
            .call(move |conn| {
                let total: f64 = conn.query_row(
                    "SELECT COALESCE(SUM(accumulated_cost_usd), 0.0) FROM ai_budget_ledger
                     WHERE tenant_key = ?1 AND day = ?2",
                    rusqlite::params![tenant_key, day],
                    |row| row.get(0),
                )?;
                Ok(total)
            })
            .await
            .map_err(map_tr_err)
    }
}
