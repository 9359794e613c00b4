//! Schedule-to-time resolution.
//!
//! Every calculator takes the seed's offset as "local" and reads the rule's
//! date and clock strings in it. Unparsable input is always
//! [`ScheduleError::Invalid`]; nothing here falls back to a default time.

mod daily;
mod interval;
mod monthly;
mod weekly;

use std::cmp::Ordering;

use chrono::{Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Weekday};
use tracing::debug;

use crate::error::{Result, ScheduleError};
use crate::types::{Schedule, Timestamp, TurnMode};

const DATE_FORMAT: &str = "%m/%d/%Y";
const CLOCK_FORMAT: &str = "%H:%M";

/// Compute the next fire time of `schedule` relative to `seed`.
///
/// The result may equal `seed` when the seed sits exactly on a daily, weekly
/// or monthly slot; it is never earlier than `seed` once the schedule has
/// started.
pub fn resolve(schedule: &Schedule, seed: &Timestamp) -> Result<Timestamp> {
    let next = match schedule.turn_mode {
        TurnMode::Seconds | TurnMode::Minutes | TurnMode::Hours => {
            interval::resolve(schedule, seed)
        }
        TurnMode::Daily => daily::resolve(schedule, seed),
        TurnMode::Weekly => weekly::resolve(schedule, seed),
        TurnMode::Monthly => monthly::resolve(schedule, seed),
    }?;
    debug!(schedule_id = %schedule.id, mode = %schedule.turn_mode, %seed, %next, "schedule resolved");
    Ok(next)
}

/// Whether `seed` is at or past the schedule's end bound.
///
/// Without an `end_date` a schedule never expires. With one, the bound is
/// `end_date end_time` (second tail per turn mode), or `end_date start_time:59`
/// when no end time is set.
pub fn is_expired(schedule: &Schedule, seed: &Timestamp) -> Result<bool> {
    let end_date = schedule.end_date.trim();
    if end_date.is_empty() {
        return Ok(false);
    }

    let date = parse_date(end_date)?;
    let clock = if schedule.end_time.trim().is_empty() {
        parse_clock(&schedule.start_time, 59)?
    } else {
        parse_clock(&schedule.end_time, schedule.turn_mode.end_second())?
    };
    let end = at(seed.offset(), date, clock)?;
    Ok(compare(seed, &end) != Ordering::Less)
}

/// [`resolve`] followed by [`is_expired`]: the fire time a job can actually
/// be armed with.
pub fn next_fire(schedule: &Schedule, seed: &Timestamp) -> Result<Timestamp> {
    let next = resolve(schedule, seed)?;
    if is_expired(schedule, seed)? {
        return Err(ScheduleError::Expired);
    }
    Ok(next)
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Order two instants, treating sub-microsecond differences as equal.
pub(crate) fn compare(a: &Timestamp, b: &Timestamp) -> Ordering {
    let delta = *a - *b;
    match delta.num_microseconds() {
        Some(us) => us.cmp(&0),
        None => delta.cmp(&Duration::zero()),
    }
}

pub(crate) fn invalid(reason: impl Into<String>) -> ScheduleError {
    ScheduleError::Invalid(reason.into())
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .map_err(|e| invalid(format!("bad date {raw:?}: {e}")))
}

/// Parse an `HH:MM` clock and pin its seconds to `second`.
pub(crate) fn parse_clock(raw: &str, second: u32) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), CLOCK_FORMAT)
        .ok()
        .and_then(|t| t.with_second(second))
        .ok_or_else(|| invalid(format!("bad clock time {raw:?}")))
}

/// Combine a local date and clock in `offset`.
pub(crate) fn at(offset: &FixedOffset, date: NaiveDate, clock: NaiveTime) -> Result<Timestamp> {
    offset
        .from_local_datetime(&date.and_time(clock))
        .single()
        .ok_or_else(|| invalid(format!("{date} {clock} is not representable")))
}

/// The configured start instant, read in `offset`.
pub(crate) fn start_instant(schedule: &Schedule, offset: &FixedOffset) -> Result<Timestamp> {
    let date = parse_date(&schedule.start_date)?;
    let clock = parse_clock(&schedule.start_time, 0)?;
    at(offset, date, clock)
}

/// `base` moved by `delta`; a missing delta or an unrepresentable result is
/// [`ScheduleError::Invalid`].
pub(crate) fn advance(base: &Timestamp, delta: Option<Duration>) -> Result<Timestamp> {
    delta
        .and_then(|delta| base.checked_add_signed(delta))
        .ok_or_else(|| invalid("next fire time out of range"))
}

/// `base` moved by `days` whole days, same failure rules as [`advance`].
pub(crate) fn advance_date(base: NaiveDate, days: Option<i64>) -> Result<NaiveDate> {
    days.and_then(Duration::try_days)
        .and_then(|delta| base.checked_add_signed(delta))
        .ok_or_else(|| invalid("next fire date out of range"))
}

pub(crate) fn positive_interval(schedule: &Schedule) -> Result<i64> {
    if schedule.interval <= 0 {
        return Err(invalid(format!(
            "interval must be positive, got {}",
            schedule.interval
        )));
    }
    Ok(schedule.interval)
}

pub(crate) fn weekday_from_code(code: &str) -> Option<Weekday> {
    match code.trim() {
        "0" => Some(Weekday::Sun),
        "1" => Some(Weekday::Mon),
        "2" => Some(Weekday::Tue),
        "3" => Some(Weekday::Wed),
        "4" => Some(Weekday::Thu),
        "5" => Some(Weekday::Fri),
        "6" => Some(Weekday::Sat),
        _ => None,
    }
}

/// Parse a `select_at` list of weekday codes into sorted Sunday-based
/// offsets. Unknown items are ignored.
pub(crate) fn parse_weekdays(select_at: &str) -> Vec<u32> {
    let mut days: Vec<u32> = select_at
        .split(',')
        .filter_map(weekday_from_code)
        .map(|w| w.num_days_from_sunday())
        .collect();
    days.sort_unstable();
    days.dedup();
    days
}

/// Parse a `select_at` list of month numbers (`1`..`12`). Unknown items are
/// ignored.
pub(crate) fn parse_months(select_at: &str) -> Vec<u32> {
    let mut months: Vec<u32> = select_at
        .split(',')
        .filter_map(|item| item.trim().parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m))
        .collect();
    months.sort_unstable();
    months.dedup();
    months
}

/// Sunday opening the week that contains `date`.
pub(crate) fn week_sunday(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_sunday()))
}

pub(crate) fn days_in_month(date: NaiveDate) -> u32 {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}


#[cfg(test)]
mod tests {
    use super::testutil::{rule, ts};
    use super::*;

    #[test]
    fn compare_ignores_sub_microsecond_noise() {
        let a = ts("01/01/2024 00:00:00");
        let b = a + Duration::nanoseconds(999);
        assert_eq!(compare(&a, &b), Ordering::Equal);
        assert_eq!(compare(&a, &(a + Duration::microseconds(2))), Ordering::Less);
        assert_eq!(compare(&(a + Duration::seconds(1)), &a), Ordering::Greater);
    }

    #[test]
    fn clock_requires_hours_and_minutes() {
        assert!(parse_clock("09:30", 0).is_ok());
        assert!(parse_clock("9:30am", 0).is_err());
        assert!(parse_clock("", 0).is_err());
        assert_eq!(parse_clock("23:59", 59).unwrap().second(), 59);
    }

    #[test]
    fn weekdays_are_sorted_and_deduplicated() {
        assert_eq!(parse_weekdays("3,1, 3,x,9"), vec![1, 3]);
        assert!(parse_weekdays("").is_empty());
    }

    #[test]
    fn months_outside_calendar_are_dropped() {
        assert_eq!(parse_months("12,0,13,1"), vec![1, 12]);
    }

    #[test]
    fn month_lengths() {
        let feb_leap = NaiveDate::from_ymd_opt(2024, 2, 10).unwrap();
        let feb = NaiveDate::from_ymd_opt(2023, 2, 10).unwrap();
        let dec = NaiveDate::from_ymd_opt(2023, 12, 31).unwrap();
        assert_eq!(days_in_month(feb_leap), 29);
        assert_eq!(days_in_month(feb), 28);
        assert_eq!(days_in_month(dec), 31);
    }

    #[test]
    fn without_end_date_never_expires() {
        let schedule = rule(TurnMode::Daily, 1, "01/01/2024", "09:00");
        assert!(!is_expired(&schedule, &ts("01/01/2099 00:00:00")).unwrap());
    }

    #[test]
    fn expiry_uses_end_time_with_mode_tail() {
        let mut schedule = rule(TurnMode::Minutes, 5, "01/01/2024", "09:00");
        schedule.end_date = "01/31/2024".to_string();
        schedule.end_time = "18:00".to_string();

        assert!(!is_expired(&schedule, &ts("01/31/2024 18:00:30")).unwrap());
        assert!(is_expired(&schedule, &ts("01/31/2024 18:00:59")).unwrap());

        schedule.turn_mode = TurnMode::Seconds;
        assert!(is_expired(&schedule, &ts("01/31/2024 18:00:00")).unwrap());
    }

    #[test]
    fn expiry_falls_back_to_start_time() {
        let mut schedule = rule(TurnMode::Daily, 1, "01/01/2024", "09:00");
        schedule.end_date = "01/10/2024".to_string();
        assert!(!is_expired(&schedule, &ts("01/10/2024 09:00:58")).unwrap());
        assert!(is_expired(&schedule, &ts("01/10/2024 09:00:59")).unwrap());
    }

    #[test]
    fn malformed_end_date_is_invalid() {
        let mut schedule = rule(TurnMode::Daily, 1, "01/01/2024", "09:00");
        schedule.end_date = "2024-01-10".to_string();
        assert!(matches!(
            is_expired(&schedule, &ts("01/01/2024 00:00:00")),
            Err(ScheduleError::Invalid(_))
        ));
    }

    #[test]
    fn next_fire_reports_expiry() {
        let mut schedule = rule(TurnMode::Daily, 1, "01/01/2024", "09:00");
        schedule.end_date = "01/02/2024".to_string();
        assert_eq!(
            next_fire(&schedule, &ts("01/05/2024 00:00:00")),
            Err(ScheduleError::Expired)
        );
        assert_eq!(
            next_fire(&schedule, &ts("01/01/2024 10:00:00")).unwrap(),
            ts("01/02/2024 09:00:00")
        );
    }
}
