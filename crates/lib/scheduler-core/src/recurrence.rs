//! Cron next-run computation.
//!
//! Accepts standard 5-field Unix cron expressions (minute, hour,
//! day-of-month, month, day-of-week) and converts them to the 6-field
//! format (with seconds) the `cron` crate expects.

use std::str::FromStr;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CronError {
    #[error("invalid cron expression '{expression}': {reason}")]
    Invalid { expression: String, reason: String },
    #[error("cron expression '{0}' has no upcoming occurrence")]
    Exhausted(String),
}

/// Prepend a seconds field to 5-field expressions.
fn normalize_cron_expr(cron_expr: &str) -> String {
    let fields: Vec<&str> = cron_expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", cron_expr)
    } else {
        cron_expr.to_string()
    }
}

fn parse(cron_expr: &str) -> Result<::cron::Schedule, CronError> {
    ::cron::Schedule::from_str(&normalize_cron_expr(cron_expr)).map_err(|e| CronError::Invalid {
        expression: cron_expr.to_string(),
        reason: e.to_string(),
    })
}

/// First occurrence strictly after `after`.
pub fn next_cron_run_after(
    cron_expr: &str,
    after: DateTime<Utc>,
) -> Result<DateTime<Utc>, CronError> {
    parse(cron_expr)?
        .after(&after)
        .next()
        .ok_or_else(|| CronError::Exhausted(cron_expr.to_string()))
}
