use chrono::{Datelike, Duration, FixedOffset, Months, NaiveDate, TimeZone};
use jobworker_scheduler::{is_expired, resolve, MonthlyOf, Schedule, Timestamp, TurnMode};
use proptest::prelude::*;

fn origin() -> Timestamp {
    FixedOffset::east_opt(-5 * 3_600)
        .unwrap()
        .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .unwrap()
}

fn schedule(turn_mode: TurnMode, interval: i64) -> Schedule {
    Schedule {
        id: "prop".to_string(),
        turn_mode,
        interval,
        start_date: "01/01/2024".to_string(),
        start_time: "00:00".to_string(),
        ..Schedule::default()
    }
}

/// Interval rules whose period divides a day evenly.
fn arb_interval_rule() -> impl Strategy<Value = Schedule> {
    prop_oneof![
        prop::sample::select(vec![1i64, 5, 10, 15, 30, 45])
            .prop_map(|n| schedule(TurnMode::Seconds, n)),
        prop::sample::select(vec![1i64, 5, 15, 20, 30, 90])
            .prop_map(|n| schedule(TurnMode::Minutes, n)),
        prop::sample::select(vec![1i64, 2, 3, 4, 6, 12])
            .prop_map(|n| schedule(TurnMode::Hours, n)),
    ]
}

fn arb_weekdays() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::btree_set(0u32..7, 1..=4).prop_map(|set| set.into_iter().collect())
}

fn arb_months() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::btree_set(1u32..=12, 1..=6).prop_map(|set| set.into_iter().collect())
}

fn month_len(date: NaiveDate) -> u32 {
    let first = date.with_day(1).unwrap();
    (first + Months::new(1)).pred_opt().unwrap().day()
}

fn join(items: &[u32]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

proptest! {
    #[test]
    fn interval_ticks_are_exactly_periodic(
        rule in arb_interval_rule(),
        offset_secs in 0i64..(10 * 86_400),
    ) {
        let period = rule.interval * rule.turn_mode.unit_seconds().unwrap();
        let seed = origin() + Duration::seconds(offset_secs);

        let mut previous = resolve(&rule, &seed).unwrap();
        prop_assert!(previous > seed);
        for _ in 0..5 {
            let next = resolve(&rule, &previous).unwrap();
            prop_assert_eq!((next - previous).num_seconds(), period);
            previous = next;
        }
    }

    #[test]
    fn weekly_never_returns_the_past_and_lands_on_selected_day(
        days in arb_weekdays(),
        interval in 1i64..5,
        start_offset in 0i64..60,
        seed_offset_mins in 0i64..(800 * 1_440),
    ) {
        let start = origin() + Duration::days(start_offset);
        let rule = Schedule {
            turn_mode: TurnMode::Weekly,
            interval,
            start_date: start.format("%m/%d/%Y").to_string(),
            start_time: "09:30".to_string(),
            select_at: join(&days),
            ..Schedule::default()
        };
        let seed = origin() + Duration::minutes(seed_offset_mins);

        let next = resolve(&rule, &seed).unwrap();
        prop_assert!(next >= seed);
        prop_assert!(days.contains(&next.weekday().num_days_from_sunday()));
    }

    #[test]
    fn monthly_fixed_day_never_returns_the_past(
        months in arb_months(),
        day in 1i32..=28,
        seed_offset_mins in 0i64..(800 * 1_440),
    ) {
        let rule = Schedule {
            turn_mode: TurnMode::Monthly,
            start_date: "01/01/2024".to_string(),
            start_time: "06:00".to_string(),
            select_at: join(&months),
            monthly_of: MonthlyOf { day, week: String::new() },
            ..Schedule::default()
        };
        let seed = origin() + Duration::minutes(seed_offset_mins);

        let next = resolve(&rule, &seed).unwrap();
        prop_assert!(next >= seed);
        prop_assert_eq!(next.day(), day.unsigned_abs());
        prop_assert!(months.contains(&next.month()));
    }

    #[test]
    fn monthly_weekday_lands_on_the_requested_occurrence(
        months in arb_months(),
        nth in 0u32..=4,
        weekday in 0u32..7,
        seed_offset_mins in 0i64..(800 * 1_440),
    ) {
        let rule = Schedule {
            turn_mode: TurnMode::Monthly,
            start_date: "01/01/2024".to_string(),
            start_time: "06:00".to_string(),
            select_at: join(&months),
            monthly_of: MonthlyOf { day: 0, week: format!("{nth}:{weekday}") },
            ..Schedule::default()
        };
        let seed = origin() + Duration::minutes(seed_offset_mins);

        let next = resolve(&rule, &seed).unwrap();
        prop_assert!(next >= seed);
        prop_assert!(months.contains(&next.month()));
        prop_assert_eq!(next.weekday().num_days_from_sunday(), weekday);
        let day = next.day();
        if nth == 0 {
            prop_assert!(day + 7 > month_len(next.date_naive()));
        } else {
            prop_assert_eq!((day - 1) / 7 + 1, nth);
        }
    }

    #[test]
    fn expiry_is_monotonic(
        end_offset in 0i64..365,
        first in 0i64..(400 * 1_440),
        gap in 0i64..(30 * 1_440),
    ) {
        let mut rule = schedule(TurnMode::Daily, 1);
        rule.end_date = (origin() + Duration::days(end_offset)).format("%m/%d/%Y").to_string();

        let early = origin() + Duration::minutes(first);
        let late = early + Duration::minutes(gap);
        if is_expired(&rule, &early).unwrap() {
            prop_assert!(is_expired(&rule, &late).unwrap());
        }
    }
}
