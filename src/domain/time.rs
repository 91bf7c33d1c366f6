use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike};
use chrono_tz::Tz;

/// Resolves a wall-clock time in `tz` to its earliest instant. Inside a fold
/// that is the first of the two readings; inside a gap the wall time is read
/// with the offsets on both sides of the transition and the earlier one wins.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Tz> {
    if let Some(resolved) = tz.from_local_datetime(&local).earliest() {
        return resolved;
    }
    let earliest_utc = [local - Duration::days(1), local + Duration::days(1)]
        .iter()
        .map(|reference| {
            let offset = tz.offset_from_utc_datetime(reference).fix();
            local - Duration::seconds(i64::from(offset.local_minus_utc()))
        })
        .min()
        .unwrap_or(local);
    tz.from_utc_datetime(&earliest_utc)
}

/// Re-expresses a wall time authored in `from` as wall time in `to`.
pub fn convert_local(local: NaiveDateTime, from: Tz, to: Tz) -> NaiveDateTime {
    resolve_local(from, local).with_timezone(&to).naive_local()
}

/// Keeps the date of `moved` and the time-of-day of `original`.
pub fn with_time_of_day(moved: NaiveDateTime, original: NaiveDateTime) -> NaiveDateTime {
    moved.date().and_time(original.time())
}

pub fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

/// Rounds up to the next full hour; exact hours move forward too.
pub fn next_full_hour(local: NaiveDateTime) -> NaiveDateTime {
    let truncated = local
        .date()
        .and_hms_opt(local.hour(), 0, 0)
        .unwrap_or(local);
    truncated + Duration::hours(1)
}
