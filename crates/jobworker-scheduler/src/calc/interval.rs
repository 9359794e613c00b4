use std::cmp::Ordering;

use chrono::{Duration, NaiveTime};

use super::{advance, at, compare, invalid, parse_clock, positive_interval, start_instant};
use crate::error::Result;
use crate::types::{Schedule, Timestamp};

/// Fixed-period ticks anchored at the start instant, clamped to a daily
/// `start_time`..`end_time` window. A blank `end_time` leaves the window open
/// until midnight.
pub(super) fn resolve(schedule: &Schedule, seed: &Timestamp) -> Result<Timestamp> {
    let offset = seed.offset();
    let start = start_instant(schedule, offset)?;
    if compare(seed, &start) == Ordering::Less {
        return Ok(start);
    }

    let unit = schedule
        .turn_mode
        .unit_seconds()
        .ok_or_else(|| invalid(format!("{} is not an interval mode", schedule.turn_mode)))?;
    let period = positive_interval(schedule)?
        .checked_mul(unit)
        .ok_or_else(|| invalid("interval overflows"))?;

    let elapsed = (*seed - start).num_seconds();
    let ticks = (elapsed / period).checked_add(1);
    let next = advance(
        &start,
        ticks
            .and_then(|n| n.checked_mul(period))
            .and_then(Duration::try_seconds),
    )?;

    let today = seed.date_naive();
    let today_start = at(offset, today, parse_clock(&schedule.start_time, 0)?)?;
    if compare(&next, &today_start) == Ordering::Less {
        return Ok(today_start);
    }

    let today_end = if schedule.end_time.trim().is_empty() {
        let tomorrow = today
            .succ_opt()
            .ok_or_else(|| invalid("date out of range"))?;
        at(offset, tomorrow, NaiveTime::MIN)?
    } else {
        at(
            offset,
            today,
            parse_clock(&schedule.end_time, schedule.turn_mode.end_second())?,
        )?
    };
    if compare(&next, &today_end) != Ordering::Less {
        return advance(&today_start, Duration::try_days(1));
    }
    Ok(next)
}
