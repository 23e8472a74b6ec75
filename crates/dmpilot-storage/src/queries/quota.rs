// SPDX-FileCopyrightText: 2026 Dmpilot Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reply quota reads, monthly rollover, and the atomic reply-count increment.
//!
//! Every mutation here is one conditional `UPDATE`. Concurrent workers and
//! replicas can race freely; the `WHERE` clause decides who wins.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use dmpilot_core::types::{
    PlanAllotments, QuotaBucket, QuotaState, QuotaWarning, ReplyCountUpdate,
};
use dmpilot_core::DmpilotError;
use rusqlite::{params, OptionalExtension};
use tracing::{info, warn};

use crate::database::Database;
use crate::queries::format_timestamp;

/// Remaining-reply band that triggers the early warning.
const EARLY_WARNING_CEILING: i64 = 100;
const EARLY_WARNING_FLOOR: i64 = 51;

/// Minimum spacing between two warnings for the same threshold.
const WARNING_COOLDOWN_HOURS: i64 = 24;

fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// Read the owner's quota after applying a due monthly rollover.
///
/// Rollover only happens for owners with an active subscription: the used
/// monthly counter returns to zero and the limit becomes the plan's base
/// allotment. The update is guarded on `last_monthly_reset` being before
/// the current month, so concurrent attempts apply at most once.
pub async fn quota_state(
    db: &Database,
    user_id: i64,
    allotments: PlanAllotments,
    now: DateTime<Utc>,
) -> Result<Option<QuotaState>, DmpilotError> {
    let now_ts = format_timestamp(now);
    let month_start_ts = format_timestamp(month_start(now));

    db.connection()
        .call(move |conn| {
            let plan: Option<String> = conn
                .query_row(
                    "SELECT plan_type FROM subscriptions
                     WHERE user_id = ?1 AND status = 'active'
                     ORDER BY id DESC LIMIT 1",
                    params![user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(plan) = plan {
                let base_limit = if plan == "standard" {
                    allotments.standard_monthly
                } else {
                    allotments.starter_monthly
                };
                let rolled = conn.execute(
                    "UPDATE users
                     SET replies_sent_monthly = 0,
                         replies_limit_monthly = ?1,
                         last_monthly_reset = ?2
                     WHERE id = ?3
                       AND (last_monthly_reset IS NULL OR last_monthly_reset < ?4)",
                    params![base_limit, now_ts, user_id, month_start_ts],
                )?;
                if rolled > 0 {
                    info!(user_id, plan = %plan, base_limit, "monthly reply allotment rolled over");
                }
            }

            let state = conn
                .query_row(
                    "SELECT id, replies_sent_monthly, replies_limit_monthly, replies_purchased,
                            replies_used_purchased, bot_paused, last_monthly_reset, email
                     FROM users WHERE id = ?1",
                    params![user_id],
                    |row| {
                        Ok(QuotaState {
                            user_id: row.get(0)?,
                            monthly_used: row.get(1)?,
                            monthly_limit: row.get(2)?,
                            purchased_total: row.get(3)?,
                            purchased_used: row.get(4)?,
                            paused: row.get::<_, i64>(5)? != 0,
                            last_reset: row.get(6)?,
                            email: row.get(7)?,
                        })
                    },
                )
                .optional()?;
            Ok(state)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Consume one reply: the monthly allotment first, then purchased replies.
///
/// Returns `None` when neither bucket had capacity. When a low-quota
/// warning is due, the warning marker on the user row is claimed with a
/// conditional update, so only one caller per cooldown receives it.
pub async fn increment_reply_count(
    db: &Database,
    user_id: i64,
    warning_threshold: i64,
    now: DateTime<Utc>,
) -> Result<Option<ReplyCountUpdate>, DmpilotError> {
    let now_ts = format_timestamp(now);
    let cooldown_ts = format_timestamp(now - Duration::hours(WARNING_COOLDOWN_HOURS));

    db.connection()
        .call(move |conn| {
            let bucket = if conn.execute(
                "UPDATE users SET replies_sent_monthly = replies_sent_monthly + 1
                 WHERE id = ?1 AND replies_sent_monthly < replies_limit_monthly",
                params![user_id],
            )? > 0
            {
                QuotaBucket::Monthly
            } else if conn.execute(
                "UPDATE users SET replies_used_purchased = replies_used_purchased + 1
                 WHERE id = ?1 AND replies_used_purchased < replies_purchased",
                params![user_id],
            )? > 0
            {
                QuotaBucket::Purchased
            } else {
                warn!(user_id, "reply count not incremented: no remaining capacity");
                return Ok(None);
            };

            let (remaining, email): (i64, Option<String>) = conn.query_row(
                "SELECT MAX(0, (replies_limit_monthly + replies_purchased)
                              - (replies_sent_monthly + replies_used_purchased)),
                        email
                 FROM users WHERE id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            info!(user_id, %bucket, remaining, "reply count incremented");

            let warning = match warning_threshold_for(remaining, warning_threshold) {
                Some(threshold) => {
                    let claimed = conn.execute(
                        "UPDATE users
                         SET last_warning_sent_at = ?1, last_warning_threshold = ?2
                         WHERE id = ?3
                           AND (last_warning_threshold IS NOT ?2
                                OR last_warning_sent_at IS NULL
                                OR last_warning_sent_at < ?4)",
                        params![now_ts, threshold, user_id, cooldown_ts],
                    )?;
                    (claimed > 0).then(|| QuotaWarning {
                        user_id,
                        email,
                        remaining,
                        threshold,
                    })
                }
                None => None,
            };

            Ok(Some(ReplyCountUpdate {
                bucket,
                remaining,
                warning,
            }))
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The warning threshold `remaining` falls under, if any.
pub fn warning_threshold_for(remaining: i64, warning_threshold: i64) -> Option<i64> {
    if remaining > 0 && remaining <= warning_threshold {
        Some(warning_threshold)
    } else if (EARLY_WARNING_FLOOR..=EARLY_WARNING_CEILING).contains(&remaining) {
        Some(EARLY_WARNING_CEILING)
    } else {
        None
    }
}
