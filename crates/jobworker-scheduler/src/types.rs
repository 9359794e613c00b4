use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// An instant pinned to the fixed offset it was observed in.
pub type Timestamp = DateTime<FixedOffset>;

/// Recurrence granularity of a [`Schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    Seconds,
    Minutes,
    #[serde(alias = "hourly")]
    Hours,
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl TurnMode {
    /// Length of one `interval` unit for the sub-daily modes.
    pub fn unit_seconds(&self) -> Option<i64> {
        match self {
            TurnMode::Seconds => Some(1),
            TurnMode::Minutes => Some(60),
            TurnMode::Hours => Some(3_600),
            TurnMode::Daily | TurnMode::Weekly | TurnMode::Monthly => None,
        }
    }

    /// Second appended to an `HH:MM` end bound.
    ///
    /// Second-granular schedules stop at `HH:MM:00`; coarser ones stay
    /// runnable through the whole final minute.
    pub fn end_second(&self) -> u32 {
        match self {
            TurnMode::Seconds => 0,
            _ => 59,
        }
    }
}

impl std::fmt::Display for TurnMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TurnMode::Seconds => "seconds",
            TurnMode::Minutes => "minutes",
            TurnMode::Hours => "hours",
            TurnMode::Daily => "daily",
            TurnMode::Weekly => "weekly",
            TurnMode::Monthly => "monthly",
        };
        write!(f, "{s}")
    }
}

/// Day addressing for monthly schedules.
///
/// `day > 0` selects that calendar day, `day < 0` counts back from month-end
/// (`-1` is the last day). `day == 0` switches to `week`, written `N:W` where
/// `W` is a weekday (`0`=Sunday) and `N` its occurrence in the month, `0`
/// meaning the last one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyOf {
    #[serde(default)]
    pub day: i32,
    #[serde(default)]
    pub week: String,
}

/// A recurrence rule attached to a job.
///
/// Dates are `MM/DD/YYYY`, clock times `HH:MM`, both read as local wall-clock
/// in the offset of whatever seed the rule is resolved against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    pub turn_mode: TurnMode,
    #[serde(default = "default_interval")]
    pub interval: i64,
    pub start_date: String,
    pub start_time: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub end_time: String,
    /// Comma-separated weekdays (weekly) or months (monthly).
    #[serde(default)]
    pub select_at: String,
    #[serde(default)]
    pub monthly_of: MonthlyOf,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            id: String::new(),
            enabled: true,
            turn_mode: TurnMode::default(),
            interval: default_interval(),
            start_date: String::new(),
            start_time: String::new(),
            end_date: String::new(),
            end_time: String::new(),
            select_at: String::new(),
            monthly_of: MonthlyOf::default(),
        }
    }
}

fn bool_true() -> bool {
    true
}

fn default_interval() -> i64 {
    1
}
