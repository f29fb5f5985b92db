//! Cron expression handling.
//! Supports the standard 5-field form: "MIN HOUR DOM MON DOW".
//! Example: "0 2 * * *" = every day at 02:00 UTC.
//!
//! Parsing and occurrence search are delegated to `croner`; this module pins
//! the accepted shape and gives the rest of the crate two small entry points.

use chrono::{DateTime, Utc};
use croner::Cron;

/// Check an expression before it is persisted. Returns a human-readable reason on failure.
pub fn validate(expression: &str) -> Result<(), String> {
    parse(expression).map(|_| ())
}

/// Compute the first occurrence strictly after `after`.
pub fn next_run_from_cron(expression: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let cron = match parse(expression) {
        Ok(cron) => cron,
        Err(reason) => {
            tracing::warn!("Invalid cron expression: '{}' ({})", expression, reason);
            return None;
        }
    };
    cron.find_next_occurrence(&after, false).ok()
}

fn parse(expression: &str) -> Result<Cron, String> {
    let trimmed = expression.trim();
    let fields = trimmed.split_whitespace().count();
    if fields != 5 {
        return Err(format!(
            "need 5 fields: MIN HOUR DOM MON DOW, got {}",
            fields
        ));
    }
    Cron::new(trimmed).parse().map_err(|e| e.to_string())
}
