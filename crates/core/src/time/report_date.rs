use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Strict `YYYY-MM-DD`. chrono alone accepts unpadded fields like `2026-3-2`.
pub fn parse_report_date(s: &str) -> anyhow::Result<NaiveDate> {
    let s = s.trim();
    anyhow::ensure!(
        s.len() == 10 && s.as_bytes()[4] == b'-' && s.as_bytes()[7] == b'-',
        "date must be YYYY-MM-DD (got {s:?})"
    );
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .with_context(|| format!("date must be a valid calendar date (got {s:?})"))
}

/// Explicit date when given, otherwise "today" at the configured UTC offset.
pub fn resolve_report_date(
    date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
    tz_offset_hours: i32,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = date_arg {
        return parse_report_date(s);
    }

    let offset = FixedOffset::east_opt(tz_offset_hours * 3600)
        .with_context(|| format!("invalid report tz offset ({tz_offset_hours}h)"))?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn explicit_date_wins() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap();
        let d = resolve_report_date(Some("2025-12-31"), now, 9).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 12, 31).unwrap());
    }

    #[test]
    fn offset_can_move_the_day_forward() {
        // 2026-01-05 20:00 UTC is already 2026-01-06 at +9.
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 20, 0, 0).unwrap();
        assert_eq!(
            resolve_report_date(None, now, 9).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 6).unwrap()
        );
        assert_eq!(
            resolve_report_date(None, now, 0).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
        );
    }

    #[test]
    fn negative_offset_can_move_the_day_back() {
        let now = Utc.with_ymd_and_hms(2026, 1, 5, 3, 0, 0).unwrap();
        assert_eq!(
            resolve_report_date(None, now, -5).unwrap(),
            NaiveDate::from_ymd_opt(2026, 1, 4).unwrap()
        );
    }

    #[test]
    fn rejects_loose_or_impossible_dates() {
        for bad in ["2026-3-2", "03/02/2026", "2026-02-30", "", "2026-03-02T00:00:00Z"] {
            assert!(parse_report_date(bad).is_err(), "accepted {bad:?}");
        }
        assert!(parse_report_date(" 2026-03-02 ").is_ok());
    }
}
