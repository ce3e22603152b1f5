//! Cron schedule evaluation.

use chrono::{DateTime, Utc};
use cron::Schedule;
use neonhub_core::{Error, Result};
use std::str::FromStr;

/// Next occurrence of `expression` strictly after `after`.
///
/// Accepts both classic five-field cron expressions and the six/seven
/// field form with a seconds column; five-field expressions fire at
/// second zero.
pub fn next_run(expression: &str, after: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let normalized = normalize(expression);
    let schedule = Schedule::from_str(&normalized).map_err(|e| Error::InvalidSchedule {
        expression: expression.to_string(),
        reason: e.to_string(),
    })?;
    schedule
        .after(&after)
        .next()
        .ok_or_else(|| Error::InvalidSchedule {
            expression: expression.to_string(),
            reason: "no upcoming occurrence".to_string(),
        })
}

fn normalize(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}
