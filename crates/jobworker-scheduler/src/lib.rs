//! `jobworker-scheduler`: calendar arithmetic for job recurrence rules.
//!
//! # Overview
//!
//! A [`Schedule`] describes when a job recurs. [`calc::resolve`] turns a
//! schedule plus a seed instant into the next fire time; [`calc::is_expired`]
//! tells whether the schedule's end bound has passed. Both are pure: no I/O,
//! no shared state.
//!
//! All arithmetic happens in the fixed UTC offset carried by the seed, so a
//! schedule written in local wall-clock terms stays DST-naive.
//!
//! # Turn modes
//!
//! | Mode       | `interval` means | Extra fields                       |
//! |------------|------------------|------------------------------------|
//! | `seconds`  | seconds per tick | `end_time` closes the daily window |
//! | `minutes`  | minutes per tick | `end_time` closes the daily window |
//! | `hours`    | hours per tick   | `end_time` closes the daily window |
//! | `daily`    | days per cycle   |                                    |
//! | `weekly`   | weeks per cycle  | `select_at` = weekdays (`0`=Sunday) |
//! | `monthly`  | unused           | `select_at` = months, `monthly_of` |

pub mod calc;
pub mod clock;
pub mod error;
pub mod types;

pub use calc::{is_expired, next_fire, resolve};
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{Result, ScheduleError};
pub use types::{MonthlyOf, Schedule, Timestamp, TurnMode};
