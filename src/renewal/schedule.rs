// Cron schedule handling for the renewal sweep
//
// Configuration uses classic five-field expressions (minute hour day-of-month
// month day-of-week). The cron crate wants a seconds field, so parsing
// prepends one. Missed fire times while the engine was down coalesce into a
// single sweep: one pass over the store covers every renewal that became due
// in the gap.

use crate::error::EngineError;
use crate::Result;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Validate a five-field cron expression
pub fn validate_expression(expr: &str) -> Result<()> {
    to_schedule(expr).map(|_| ())
}

fn to_schedule(expr: &str) -> Result<Schedule> {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        return Err(EngineError::invalid(format!(
            "Cron expression must have 5 fields (minute hour day month weekday), got {}",
            fields
        )));
    }
    Schedule::from_str(&format!("0 {}", expr))
        .map_err(|e| EngineError::invalid(format!("Invalid cron expression '{}': {}", expr, e)))
}

/// Next fire time strictly after the given instant
pub fn next_fire(expr: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let schedule = to_schedule(expr)?;
    Ok(schedule.after(&after).next())
}

/// Number of fire times in (after, until], capped to keep downtime gaps cheap
pub fn fires_between(expr: &str, after: DateTime<Utc>, until: DateTime<Utc>) -> Result<usize> {
    let schedule = to_schedule(expr)?;
    Ok(schedule
        .after(&after)
        .take_while(|t| *t <= until)
        .take(1000)
        .count())
}

/// Whether at least one fire time was missed between the instants. Callers
/// run exactly one sweep when this is true, however many fires were skipped.
pub fn sweep_due(expr: &str, last_checked: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool> {
    Ok(fires_between(expr, last_checked, now)? > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_valid_five_field_expressions() {
        assert!(validate_expression("30 3 * * *").is_ok());
        assert!(validate_expression("*/15 * * * *").is_ok());
        assert!(validate_expression("0 0 1 * 0").is_ok());
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        assert_eq!(validate_expression("30 3 * *").unwrap_err().kind(), "InvalidInput");
        assert_eq!(
            validate_expression("0 30 3 * * *").unwrap_err().kind(),
            "InvalidInput"
        );
    }

    #[test]
    fn test_garbage_rejected() {
        let err = validate_expression("not a cron at all").unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }

    #[test]
    fn test_next_fire() {
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let next = next_fire("30 3 * * *", after).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 11, 3, 30, 0).unwrap());
    }

    #[test]
    fn test_missed_fires_coalesce_to_one_sweep() {
        let last = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap();

        // Three daily fires missed while down
        assert_eq!(fires_between("30 3 * * *", last, now).unwrap(), 3);
        // The consumer still only asks a yes/no question
        assert!(sweep_due("30 3 * * *", last, now).unwrap());

        let no_gap = Utc.with_ymd_and_hms(2026, 3, 1, 1, 0, 0).unwrap();
        assert!(!sweep_due("30 3 * * *", last, no_gap).unwrap());
    }
}
