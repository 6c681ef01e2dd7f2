use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc, Weekday};

const CET_OFFSET_SECS: i32 = 3600;
const CEST_OFFSET_SECS: i32 = 2 * 3600;

// EU summer time switches at 01:00 UTC on the last Sunday of March/October.
const DST_SWITCH_HOUR_UTC: u32 = 1;

/// History date for a run: an explicit `YYYY-MM-DD` wins, otherwise the
/// Stockholm civil date of `now_utc`.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date {s:?}, expected YYYY-MM-DD"));
    }

    let offset = stockholm_offset(now_utc)?;
    Ok(now_utc.with_timezone(&offset).date_naive())
}

pub fn stockholm_offset(now_utc: DateTime<Utc>) -> anyhow::Result<FixedOffset> {
    let year = now_utc.year();
    let summer_start = switch_instant(year, 3)?;
    let summer_end = switch_instant(year, 10)?;

    let secs = if now_utc >= summer_start && now_utc < summer_end {
        CEST_OFFSET_SECS
    } else {
        CET_OFFSET_SECS
    };
    FixedOffset::east_opt(secs).context("invalid Stockholm offset")
}

fn switch_instant(year: i32, month: u32) -> anyhow::Result<DateTime<Utc>> {
    let day = last_sunday(year, month)?;
    Utc.with_ymd_and_hms(year, month, day.day(), DST_SWITCH_HOUR_UTC, 0, 0)
        .single()
        .with_context(|| format!("invalid DST switch instant for {year}-{month:02}"))
}

fn last_sunday(year: i32, month: u32) -> anyhow::Result<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let mut date = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .with_context(|| format!("invalid month {year}-{month:02}"))?
        - Duration::days(1);
    while date.weekday() != Weekday::Sun {
        date = date - Duration::days(1);
    }
    Ok(date)
}
