use std::cmp::Ordering;

use chrono::{Datelike, Duration, NaiveDate};

use super::{
    advance, advance_date, at, compare, invalid, parse_clock, parse_weekdays, positive_interval,
    start_instant, week_sunday,
};
use crate::error::Result;
use crate::types::{Schedule, Timestamp};

/// Selected weekdays of every `interval`-th week, counting weeks
/// Sunday-to-Saturday from the week containing `start_date`.
pub(super) fn resolve(schedule: &Schedule, seed: &Timestamp) -> Result<Timestamp> {
    let days = parse_weekdays(&schedule.select_at);
    let Some(&first_day) = days.first() else {
        return Err(invalid(format!(
            "no weekdays selected in {:?}",
            schedule.select_at
        )));
    };

    let offset = seed.offset();
    let start = start_instant(schedule, offset)?;
    let interval = positive_interval(schedule)?;

    let first = first_occurrence(&start, &days, interval)?;
    if compare(seed, &first) == Ordering::Less {
        return Ok(first);
    }

    let clock = parse_clock(&schedule.start_time, 0)?;
    let start_sunday = week_sunday(start.date_naive());
    let today = seed.date_naive();
    let seed_sunday = week_sunday(today);
    let weeks = (seed_sunday - start_sunday).num_days() / 7;

    let date = if weeks % interval != 0 {
        let ahead = (weeks / interval + 1)
            .checked_mul(interval)
            .and_then(|week| week.checked_mul(7))
            .and_then(|n| n.checked_add(i64::from(first_day)));
        advance_date(start_sunday, ahead)?
    } else {
        let weekday = today.weekday().num_days_from_sunday();
        if days.contains(&weekday) {
            let slot = at(offset, today, clock)?;
            if compare(seed, &slot) == Ordering::Less {
                return Ok(slot);
            }
        }
        later_this_cycle(seed_sunday, &days, weekday, interval)?
    };
    at(offset, date, clock)
}

/// The earliest slot on or after `start` that falls on a selected weekday.
fn first_occurrence(start: &Timestamp, days: &[u32], interval: i64) -> Result<Timestamp> {
    let start_weekday = i64::from(start.weekday().num_days_from_sunday());
    let ahead = match days.iter().map(|&d| i64::from(d)).find(|&d| d >= start_weekday) {
        Some(d) => Some(d - start_weekday),
        None => cycle_offset(days, interval).map(|n| n - start_weekday),
    };
    advance(start, ahead.and_then(Duration::try_days))
}

/// Next selected day after `weekday` in the current week, else the first
/// selected day of the next cycle.
fn later_this_cycle(
    sunday: NaiveDate,
    days: &[u32],
    weekday: u32,
    interval: i64,
) -> Result<NaiveDate> {
    let ahead = match days.iter().find(|&&d| d > weekday) {
        Some(&d) => Some(i64::from(d)),
        None => cycle_offset(days, interval),
    };
    advance_date(sunday, ahead)
}

/// Days from a cycle's Sunday to the first selected day `interval` weeks on.
fn cycle_offset(days: &[u32], interval: i64) -> Option<i64> {
    let first = i64::from(*days.first()?);
    interval.checked_mul(7)?.checked_add(first)
}
