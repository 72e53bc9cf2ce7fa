//! Wall-clock helpers shared by the zone gate and the session scheduler.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Weekday};
use chrono_tz::Tz;

/// Pins a wall-clock date and time to an instant in `tz`.
///
/// Ambiguous times (DST fall-back) resolve to the earlier instant. Times
/// skipped by a spring-forward jump resolve to the same wall time one hour later.
pub fn localize(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t,
        LocalResult::Ambiguous(a, b) => a.min(b),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}

/// Days needed to move `date` onto the following Monday; zero on weekdays.
///
/// With Monday as 0, this is `7 - weekday` for Saturday (2) and Sunday (1).
pub fn days_to_monday(date: NaiveDate) -> i64 {
    match date.weekday() {
        Weekday::Sat | Weekday::Sun => 7 - i64::from(date.weekday().num_days_from_monday()),
        _ => 0,
    }
}

/// Rolls an instant that falls on a weekend forward to Monday at the same wall-clock time.
pub fn roll_past_weekend(instant: DateTime<Tz>) -> DateTime<Tz> {
    let days = days_to_monday(instant.date_naive());
    if days == 0 {
        return instant;
    }
    localize(&instant.timezone(), instant.date_naive() + Duration::days(days), instant.time())
}

/// The previous trading day's close: yesterday at `close`, moved back to
/// Friday when yesterday was a Saturday or Sunday.
pub fn milestone_instant(now: DateTime<Tz>, close: NaiveTime) -> DateTime<Tz> {
    let yesterday = now.date_naive() - Duration::days(1);
    let back = match yesterday.weekday() {
        Weekday::Sat => 1,
        Weekday::Sun => 2,
        _ => 0,
    };
    localize(&now.timezone(), yesterday - Duration::days(back), close)
}
