//! Parsing of the times and intervals an operator types when creating a job.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use cron::Schedule;

/// How a recurring job repeats.
///
/// Cron expressions are validated here. Human intervals (`"5 minutes"`,
/// `"1.5 hours"`, `"one hour"`) are the execution engine's to interpret and
/// are kept as typed.
#[derive(Debug, Clone)]
pub enum RepeatInterval {
    Cron(Schedule),
    Human(String),
}

impl RepeatInterval {
    /// When a job created with this interval and no explicit start first runs.
    pub fn first_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            RepeatInterval::Cron(schedule) => schedule.after(&now).next().unwrap_or(now),
            RepeatInterval::Human(_) => now,
        }
    }
}

fn unit_millis(unit: &str) -> Option<f64> {
    let millis = match unit {
        "ms" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0 * 1_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 60.0 * 60.0 * 1_000.0,
        "d" | "day" | "days" => 24.0 * 60.0 * 60.0 * 1_000.0,
        "w" | "week" | "weeks" => 7.0 * 24.0 * 60.0 * 60.0 * 1_000.0,
        _ => return None,
    };
    Some(millis)
}

/// `"5 minutes"`, `"1.5 hours"`, `"90s"` or a bare number of milliseconds.
fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim().to_lowercase();
    let split = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(input.len());
    let (count, unit) = input.split_at(split);
    let count: f64 = count.parse().ok()?;
    let unit = unit.trim();
    let per_unit = if unit.is_empty() { 1.0 } else { unit_millis(unit)? };

    let millis = (count * per_unit).round();
    if !millis.is_finite() || millis <= 0.0 || millis > i64::MAX as f64 / 2.0 {
        return None;
    }
    Some(Duration::milliseconds(millis as i64))
}

/// Cron lines carry wildcards, steps or ranges, or are five or more purely
/// numeric fields. `"1 hour and 30 minutes"` is neither.
fn looks_like_cron(input: &str) -> bool {
    let fields: Vec<&str> = input.split_whitespace().collect();
    if fields.len() < 5 {
        return false;
    }
    input.contains(|c: char| c == '*' || c == '/' || c == '?')
        || fields
            .iter()
            .all(|field| field.starts_with(|c: char| c.is_ascii_digit()))
}

/// Five-field crontab lines are accepted and run at second zero. Anything
/// that is not cron is kept verbatim as a human interval.
pub fn parse_interval(input: &str) -> Result<RepeatInterval, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty repeat interval".into());
    }
    if !looks_like_cron(input) {
        return Ok(RepeatInterval::Human(input.to_owned()));
    }

    let expression = if input.split_whitespace().count() == 5 {
        format!("0 {}", input)
    } else {
        input.to_owned()
    };
    Schedule::from_str(&expression)
        .map(RepeatInterval::Cron)
        .map_err(|err| format!("invalid cron expression {:?}: {}", input, err))
}

/// `"now"`, an RFC 3339 timestamp, `"YYYY-MM-DD HH:MM:SS"` in UTC, or
/// `"in <interval>"` relative to `now`.
pub fn parse_when(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("now") {
        return Ok(now);
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }
    if let Ok(at) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&at));
    }
    if let Some(relative) = input.strip_prefix("in ") {
        if let Some(offset) = parse_duration(relative) {
            if let Some(at) = now.checked_add_signed(offset) {
                return Ok(at);
            }
        }
    }
    Err(format!("invalid schedule {:?}", input))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn human_intervals_are_kept_verbatim() {
        for input in ["5 minutes", "1.5 hours", "one hour", "1 hour and 30 minutes", "60000"] {
            match parse_interval(input) {
                Ok(RepeatInterval::Human(text)) => assert_eq!(text, input),
                other => panic!("{} parsed as {:?}", input, other),
            }
        }
    }

    #[test]
    fn cron_intervals() {
        for input in ["*/5 * * * *", "0 */5 * * * *", "*/5 * * * * *", "0 30 9 * * Mon-Fri", "0 0 1 1 *"] {
            assert!(
                matches!(parse_interval(input), Ok(RepeatInterval::Cron(_))),
                "{}",
                input
            );
        }
    }

    #[test]
    fn broken_cron_and_blank_intervals_are_rejected() {
        for input in ["", "   ", "61 * * * *", "*/5 * * *x * *"] {
            assert!(parse_interval(input).is_err(), "{}", input);
        }
    }

    #[test]
    fn cron_jobs_first_run_at_their_next_slot() {
        let daily = parse_interval("0 0 * * *").unwrap();
        assert_eq!(
            daily.first_run(now()),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()
        );

        let every_five = parse_interval("*/5 * * * *").unwrap();
        assert_eq!(
            every_five.first_run(now()),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 5, 0).unwrap()
        );

        assert_eq!(parse_interval("1.5 hours").unwrap().first_run(now()), now());
    }

    #[test]
    fn one_off_times() {
        assert_eq!(parse_when("now", now()).unwrap(), now());
        assert_eq!(
            parse_when("2024-03-02T08:30:00+02:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 6, 30, 0).unwrap()
        );
        assert_eq!(
            parse_when("2024-03-02 08:30:00", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 2, 8, 30, 0).unwrap()
        );
        assert_eq!(
            parse_when("in 10 minutes", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 10, 0).unwrap()
        );
        assert_eq!(
            parse_when("in 1.5 hours", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 13, 30, 0).unwrap()
        );
        assert!(parse_when("tomorrow-ish", now()).is_err());
        assert!(parse_when("in 0 minutes", now()).is_err());
    }
}
