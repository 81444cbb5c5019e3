//! Cron expression helpers.
//!
//! Expressions use the Quartz layout with a leading seconds field and an
//! optional trailing year: `sec min hour day-of-month month day-of-week [year]`.
//! All evaluation happens in UTC.
//!
//! Supported per field: values, names (`JAN`, `MON`), ranges, lists, steps,
//! `*` and `?`. Quartz's calendar modifiers `L`, `W` and `#` are rejected
//! with a reason naming the modifier.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Result, SchedulerError};

/// Parse `expression` into a schedule.
///
/// Quartz's `?` ("no specific value") is accepted in the day fields and read
/// as `*`.
pub fn parse_cron(expression: &str) -> Result<Schedule> {
    let invalid = |reason: String| SchedulerError::InvalidCronExpression {
        expression: expression.to_string(),
        reason,
    };
    if let Some(reason) = unsupported_modifier(expression) {
        return Err(invalid(reason.to_string()));
    }
    Schedule::from_str(&normalize(expression)).map_err(|e| invalid(e.to_string()))
}

fn unsupported_modifier(expression: &str) -> Option<&'static str> {
    let fields: Vec<&str> = expression.split_whitespace().collect();
    let has = |index: usize, marks: &[char]| {
        fields
            .get(index)
            .is_some_and(|f| f.chars().any(|c| marks.contains(&c.to_ascii_uppercase())))
    };
    // No month or weekday name contains L, W (day of month) or #.
    if has(3, &['L', 'W']) {
        return Some("day-of-month modifiers `L` and `W` are not supported");
    }
    if has(5, &['L', '#']) {
        return Some("day-of-week modifiers `L` and `#` are not supported");
    }
    None
}

fn normalize(expression: &str) -> String {
    expression
        .split_whitespace()
        .map(|field| if field == "?" { "*" } else { field })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_cron_expression(expression: &str) -> bool {
    parse_cron(expression).is_ok()
}

/// Next fire time strictly after now, or `None` when the expression is
/// invalid or has no future occurrence.
pub fn next_fire_time(expression: &str) -> Option<DateTime<Utc>> {
    next_fire_after(&parse_cron(expression).ok()?, Utc::now())
}

/// The next `count` fire times after now.
pub fn next_fire_times(expression: &str, count: usize) -> Result<Vec<DateTime<Utc>>> {
    let schedule = parse_cron(expression)?;
    Ok(schedule.after(&Utc::now()).take(count).collect())
}

pub(crate) fn next_fire_after(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn accepts_quartz_expressions() {
        assert!(validate_cron_expression("0 0/5 * * * ?"));
        assert!(validate_cron_expression("0 30 9 ? * MON-FRI"));
        assert!(validate_cron_expression("*/10 * * * * *"));
        assert!(validate_cron_expression("0 0 12 1 JAN ? 2099"));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(!validate_cron_expression(""));
        assert!(!validate_cron_expression("not a cron"));
        assert!(!validate_cron_expression("0 61 * * * *"));
        assert!(!validate_cron_expression("0 0 25 * * *"));

        match parse_cron("0 0 25 * * *") {
            Err(SchedulerError::InvalidCronExpression { expression, reason }) => {
                assert_eq!(expression, "0 0 25 * * *");
                assert!(!reason.is_empty());
            }
            other => panic!("expected InvalidCronExpression, got {other:?}"),
        }
    }

    #[test]
    fn quartz_calendar_modifiers_are_rejected_with_a_reason() {
        for expression in [
            "0 0 0 L * ?",
            "0 0 12 15W * ?",
            "0 0 12 LW * ?",
            "0 0 12 ? * 6#3",
            "0 0 12 ? * 6L",
        ] {
            match parse_cron(expression) {
                Err(SchedulerError::InvalidCronExpression { reason, .. }) => {
                    assert!(reason.contains("not supported"), "{expression}: {reason}")
                }
                other => panic!("{expression}: expected rejection, got {other:?}"),
            }
        }
        // Names that merely contain the letters stay valid.
        assert!(validate_cron_expression("0 0 12 ? JUL WED"));
        assert!(validate_cron_expression("0 0 12 ? * 2"));
    }

    #[test]
    fn next_fire_is_strictly_after() {
        let schedule = parse_cron("0 0 * * * ?").unwrap();
        let on_the_hour = Utc.with_ymd_and_hms(2030, 1, 1, 10, 0, 0).unwrap();
        let next = next_fire_after(&schedule, on_the_hour).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2030, 1, 1, 11, 0, 0).unwrap());
    }

    #[test]
    fn next_fire_times_are_ascending() {
        let times = next_fire_times("0/15 * * * * ?", 4).unwrap();
        assert_eq!(times.len(), 4);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert!(times.iter().all(|t| t.second() % 15 == 0));
        assert!(times[0] > Utc::now() - chrono::Duration::seconds(1));
    }

    #[test]
    fn invalid_or_exhausted_expressions_have_no_next_fire() {
        assert!(next_fire_time("garbage").is_none());
        assert!(next_fire_time("0 0 0 1 1 ? 2001").is_none());
        assert!(next_fire_time("0 0 0 1 1 ? 2099").is_some());
    }
}
