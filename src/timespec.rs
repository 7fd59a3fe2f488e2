// src/timespec.rs

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Parses a time-window bound relative to `now`.
///
/// Accepts `N day(s)|week(s)|month(s)|year(s) ago` (a month is 30 days, a
/// year 365), `now`, RFC 3339, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`.
/// Naive forms are read as local time.
pub fn parse_time_bound(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let phrase = input.trim().to_lowercase();
    if phrase == "now" {
        return Ok(now);
    }
    if phrase.ends_with("ago") {
        return parse_relative(&phrase)
            .and_then(|ago| now.checked_sub_signed(ago))
            .ok_or_else(|| Error::Config(format!("unrecognized relative time {input:?}")));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(input.trim()) {
        return Ok(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(input.trim(), "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| Error::Config(format!("unrecognized time {input:?}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| Error::Config(format!("time {input:?} does not exist locally")))
}

fn parse_relative(phrase: &str) -> Option<Duration> {
    let mut words = phrase.split_whitespace();
    let count: u32 = words.next()?.parse().ok()?;
    let unit = words.next()?;
    if words.next()? != "ago" || words.next().is_some() {
        return None;
    }
    let days_per_unit = match unit.strip_suffix('s').unwrap_or(unit) {
        "day" => 1,
        "week" => 7,
        "month" => 30,
        "year" => 365,
        _ => return None,
    };
    let days = i64::from(count).checked_mul(days_per_unit)?;
    Duration::try_days(days)
}

/// Author dates as written by `%aI`, or the older `--date=iso` form.
pub fn parse_commit_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_relative_phrases() {
        assert_eq!(
            parse_time_bound("3 days ago", now()).unwrap(),
            now() - Duration::days(3)
        );
        assert_eq!(
            parse_time_bound("1 Week ago", now()).unwrap(),
            now() - Duration::days(7)
        );
        assert_eq!(
            parse_time_bound("2 months ago", now()).unwrap(),
            now() - Duration::days(60)
        );
        assert_eq!(
            parse_time_bound("1 year ago", now()).unwrap(),
            now() - Duration::days(365)
        );
    }

    #[test]
    fn test_bad_relative_phrase_is_config_error() {
        for bad in ["last year", "three days ago", "2 fortnights ago", "yesterday"] {
            assert!(
                matches!(parse_time_bound(bad, now()), Err(Error::Config(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_out_of_range_relative_phrase_is_config_error() {
        for bad in [
            "300000 years ago",
            "99999999999999999 days ago",
            "4294967295 years ago",
            "-3 days ago",
            "3 dayss ago",
        ] {
            assert!(
                matches!(parse_time_bound(bad, now()), Err(Error::Config(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_absolute_forms() {
        assert_eq!(
            parse_time_bound("2024-01-02T03:04:05+00:00", now()).unwrap(),
            "2024-01-02T03:04:05Z".parse::<DateTime<Utc>>().unwrap()
        );
        assert!(parse_time_bound("2024-01-02 03:04:05", now()).is_ok());
        assert!(parse_time_bound("2024-01-02", now()).is_ok());
        assert_eq!(parse_time_bound("now", now()).unwrap(), now());
    }

    #[test]
    fn test_commit_date_forms() {
        let iso = parse_commit_date("2024-03-01T10:00:00+03:00").unwrap();
        let legacy = parse_commit_date("2024-03-01 10:00:00 +0300").unwrap();
        assert_eq!(iso, legacy);
        assert!(parse_commit_date("not a date").is_none());
    }
}
