use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

const TIME_FORMATS: [&str; 3] = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

/// Parses `D/M/YYYY`, zero padding optional. ISO `YYYY-MM-DD` is accepted as well.
pub fn parse_dmy_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let parts: Vec<&str> = s.split('/').map(str::trim).collect();
    if let [day, month, year] = parts.as_slice() {
        let day = day.parse::<u32>().ok()?;
        let month = month.parse::<u32>().ok()?;
        let year = year.parse::<i32>().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    TIME_FORMATS.iter().find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

/// Resolve a local wall-clock time in `tz` to UTC. Ambiguous times (DST fall-back) take the
/// earlier instant, times inside a DST gap don't exist and return `None`.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt1, _) => Some(dt1.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

pub fn parse_local_datetime(date: &str, time: &str, tz: Tz) -> Option<DateTime<Utc>> {
    let date = parse_dmy_date(date)?;
    let time = parse_time(time)?;
    resolve_local(date.and_time(time), tz)
}

/// UTC instant of local midnight of `date` in `tz`. Where midnight falls into a DST gap the
/// day starts at the first whole hour that exists.
pub fn day_start(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    (0..24).find_map(|h| resolve_local(date.and_hms_opt(h, 0, 0)?, tz))
}

pub fn local_date(dt: DateTime<Utc>, tz: Tz) -> NaiveDate {
    dt.with_timezone(&tz).date_naive()
}

/// Whole seconds between two instants, rounded half away from zero.
pub fn elapsed_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds() as f64;
    (millis / 1000.0).round() as i64
}
