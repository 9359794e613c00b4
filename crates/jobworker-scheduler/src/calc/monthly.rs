use std::cmp::Ordering;

use chrono::{Datelike, Duration, NaiveDate};

use super::{
    advance, at, compare, days_in_month, invalid, parse_clock, parse_months, start_instant,
    weekday_from_code,
};
use crate::error::Result;
use crate::types::{MonthlyOf, Schedule, Timestamp};

/// Upper bound on the forward day scan. Eight years always covers a leap day
/// in any selected month.
const MAX_SCAN_DAYS: i64 = 366 * 8 + 1;

/// Which day of a month a monthly schedule fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayRule {
    /// Calendar day (`1..=31`).
    Exact(u32),
    /// Days counted back from month-end, `-1` being the last day.
    FromEnd(u32),
    /// `nth` occurrence of a weekday (`0`=Sunday); `nth == 0` is the last one.
    Weekday { nth: u32, weekday: u32 },
}

impl DayRule {
    fn parse(of: &MonthlyOf) -> Result<Self> {
        match of.day {
            0 => {
                let (nth, weekday) = of
                    .week
                    .trim()
                    .split_once(':')
                    .ok_or_else(|| invalid(format!("bad monthly week {:?}", of.week)))?;
                let nth = nth
                    .trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n <= 5)
                    .ok_or_else(|| invalid(format!("bad week ordinal in {:?}", of.week)))?;
                let weekday = weekday_from_code(weekday)
                    .ok_or_else(|| invalid(format!("bad weekday in {:?}", of.week)))?;
                Ok(DayRule::Weekday {
                    nth,
                    weekday: weekday.num_days_from_sunday(),
                })
            }
            d @ 1..=31 => Ok(DayRule::Exact(d.unsigned_abs())),
            d @ -31..=-1 => Ok(DayRule::FromEnd(d.unsigned_abs())),
            d => Err(invalid(format!("monthly day {d} out of range"))),
        }
    }

    fn matches(&self, date: NaiveDate) -> bool {
        let day = date.day();
        match *self {
            DayRule::Exact(d) => day == d,
            DayRule::FromEnd(back) => days_in_month(date) + 1 == day + back,
            DayRule::Weekday { nth, weekday } => {
                if date.weekday().num_days_from_sunday() != weekday {
                    return false;
                }
                if nth == 0 {
                    day + 7 > days_in_month(date)
                } else {
                    (day - 1) / 7 + 1 == nth
                }
            }
        }
    }
}

/// First day on or after the effective start that lies in a selected month
/// and satisfies the [`DayRule`].
pub(super) fn resolve(schedule: &Schedule, seed: &Timestamp) -> Result<Timestamp> {
    let months = parse_months(&schedule.select_at);
    if months.is_empty() {
        return Err(invalid(format!(
            "no months selected in {:?}",
            schedule.select_at
        )));
    }
    let rule = DayRule::parse(&schedule.monthly_of)?;

    let offset = seed.offset();
    let mut from = start_instant(schedule, offset)?;
    if compare(seed, &from) == Ordering::Greater {
        from = at(
            offset,
            seed.date_naive(),
            parse_clock(&schedule.start_time, 0)?,
        )?;
        if compare(seed, &from) == Ordering::Greater {
            from = advance(&from, Duration::try_days(1))?;
        }
    }

    (0..MAX_SCAN_DAYS)
        .map_while(|n| from.checked_add_signed(Duration::days(n)))
        .find(|candidate| {
            let date = candidate.date_naive();
            months.contains(&date.month()) && rule.matches(date)
        })
        .ok_or_else(|| invalid("no matching day in selected months"))
}
