use std::cmp::Ordering;

use chrono::Duration;

use super::{advance, at, compare, parse_clock, positive_interval, start_instant};
use crate::error::Result;
use crate::types::{Schedule, Timestamp};

/// Every `interval` days at `start_time`, counted from `start_date`.
pub(super) fn resolve(schedule: &Schedule, seed: &Timestamp) -> Result<Timestamp> {
    let offset = seed.offset();
    let start = start_instant(schedule, offset)?;
    if compare(seed, &start) == Ordering::Less {
        return Ok(start);
    }

    let interval = positive_interval(schedule)?;
    let slot = at(
        offset,
        seed.date_naive(),
        parse_clock(&schedule.start_time, 0)?,
    )?;
    let diff_days = (slot - start).num_days();

    if diff_days % interval != 0 || compare(seed, &slot) == Ordering::Greater {
        let days = (diff_days / interval)
            .checked_add(1)
            .and_then(|n| n.checked_mul(interval));
        return advance(&start, days.and_then(Duration::try_days));
    }
    Ok(slot)
}

#[cfg(test)]
mod tests {
    use super::super::testutil::{rule, ts};
    use super::*;
    use crate::error::ScheduleError;
    use crate::types::TurnMode;

    #[test]
    fn off_cycle_day_jumps_to_next_aligned_day() {
        let schedule = rule(TurnMode::Daily, 2, "01/01/2024", "09:00");
        assert_eq!(
            resolve(&schedule, &ts("01/02/2024 10:00:00")).unwrap(),
            ts("01/03/2024 09:00:00")
        );
    }

    #[test]
    fn aligned_day_before_slot_fires_today() {
        let schedule = rule(TurnMode::Daily, 2, "01/01/2024", "09:00");
        assert_eq!(
            resolve(&schedule, &ts("01/03/2024 08:00:00")).unwrap(),
            ts("01/03/2024 09:00:00")
        );
        assert_eq!(
            resolve(&schedule, &ts("01/03/2024 09:00:00")).unwrap(),
            ts("01/03/2024 09:00:00")
        );
    }

    #[test]
    fn passed_slot_advances_a_full_interval() {
        let schedule = rule(TurnMode::Daily, 2, "01/01/2024", "09:00");
        assert_eq!(
            resolve(&schedule, &ts("01/03/2024 09:30:00")).unwrap(),
            ts("01/05/2024 09:00:00")
        );
    }

    #[test]
    fn every_day_rolls_to_tomorrow() {
        let schedule = rule(TurnMode::Daily, 1, "01/01/2024", "09:00");
        assert_eq!(
            resolve(&schedule, &ts("02/29/2024 23:00:00")).unwrap(),
            ts("03/01/2024 09:00:00")
        );
    }

    #[test]
    fn before_start_returns_start() {
        let schedule = rule(TurnMode::Daily, 3, "01/10/2024", "09:00");
        assert_eq!(
            resolve(&schedule, &ts("01/01/2024 00:00:00")).unwrap(),
            ts("01/10/2024 09:00:00")
        );
    }

    #[test]
    fn oversized_interval_is_invalid() {
        let schedule = rule(TurnMode::Daily, i64::MAX / 2, "01/01/2024", "09:00");
        assert!(matches!(
            resolve(&schedule, &ts("01/05/2024 10:00:00")),
            Err(ScheduleError::Invalid(_))
        ));
        // The start day itself still resolves.
        assert_eq!(
            resolve(&schedule, &ts("01/01/2024 09:00:00")).unwrap(),
            ts("01/01/2024 09:00:00")
        );
    }
}
