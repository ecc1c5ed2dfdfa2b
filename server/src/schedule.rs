//! Daily job scheduling.
//!
//! Jobs are described by a cron-style expression restricted to a fixed time of
//! day, e.g. `"30 9 * * *"` for 09:30 every day. Fire times are evaluated in
//! the server's local timezone.
//!
//! # Example
//!
//! ```rust,no_run
//! use timify_server::schedule::{spawn_daily_job, DailySchedule};
//!
//! #[tokio::main]
//! async fn main() {
//!     let schedule: DailySchedule = "59 23 * * *".parse().expect("valid schedule");
//!     let handle = spawn_daily_job("reset", schedule, || println!("midnight-ish"));
//!     handle.await.ok();
//! }
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeDelta, TimeZone};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Longest single sleep while waiting for a fire time. Bounds how late a job
/// runs after the wall clock jumps.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Errors that can occur when parsing a schedule expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// The expression does not have exactly five fields.
    #[error("expected 5 fields (minute hour day month weekday), got {0}")]
    FieldCount(usize),

    /// A field is not a number.
    #[error("invalid {field} field: '{value}'")]
    InvalidField { field: &'static str, value: String },

    /// A field is outside its allowed range.
    #[error("{field} {value} out of range (max {max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },

    /// Only `*` is supported for day, month and weekday.
    #[error("unsupported {field} field: '{value}' (only '*' is supported)")]
    Unsupported { field: &'static str, value: String },
}

/// A job that fires once a day at `hour:minute` local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    hour: u32,
    minute: u32,
}

impl DailySchedule {
    /// Creates a schedule for `hour:minute`.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::OutOfRange`] if `hour > 23` or `minute > 59`.
    pub fn new(hour: u32, minute: u32) -> Result<Self, ScheduleError> {
        if hour > 23 {
            return Err(ScheduleError::OutOfRange {
                field: "hour",
                value: hour,
                max: 23,
            });
        }
        if minute > 59 {
            return Err(ScheduleError::OutOfRange {
                field: "minute",
                value: minute,
                max: 59,
            });
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Returns the first fire time strictly after `now`, in `now`'s timezone.
    ///
    /// A fire time that falls in a DST gap moves one hour later on the wall
    /// clock; an ambiguous one resolves to the earlier instant.
    pub fn next_after<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        let tz = now.timezone();
        let today = now.date_naive();

        for offset in 0..=2 {
            let Some(date) = today.checked_add_days(Days::new(offset)) else {
                break;
            };
            if let Some(candidate) = self.resolve_on(&tz, date) {
                if candidate > *now {
                    return candidate;
                }
            }
        }

        now.clone() + TimeDelta::days(1)
    }

    fn resolve_on<Tz: TimeZone>(&self, tz: &Tz, date: NaiveDate) -> Option<DateTime<Tz>> {
        let local = date.and_time(NaiveTime::from_hms_opt(self.hour, self.minute, 0)?);
        tz.from_local_datetime(&local)
            .earliest()
            .or_else(|| tz.from_local_datetime(&(local + TimeDelta::hours(1))).earliest())
    }
}

impl FromStr for DailySchedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::FieldCount(fields.len()));
        }

        let minute = parse_number("minute", fields[0])?;
        let hour = parse_number("hour", fields[1])?;

        for (field, value) in [("day", fields[2]), ("month", fields[3]), ("weekday", fields[4])] {
            if value != "*" {
                return Err(ScheduleError::Unsupported {
                    field,
                    value: value.to_string(),
                });
            }
        }

        Self::new(hour, minute)
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} * * *", self.minute, self.hour)
    }
}

fn parse_number(field: &'static str, value: &str) -> Result<u32, ScheduleError> {
    value.parse().map_err(|_| ScheduleError::InvalidField {
        field,
        value: value.to_string(),
    })
}

/// Spawns a background task that runs `job` every day at `schedule`.
///
/// The task runs for the lifetime of the runtime; abort the returned handle
/// to stop it.
pub fn spawn_daily_job<F>(name: &'static str, schedule: DailySchedule, job: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    spawn_daily_job_with_clock(name, schedule, job, Local::now)
}

/// Like [`spawn_daily_job`], reading wall-clock time from `clock`.
pub fn spawn_daily_job_with_clock<F, C, Tz>(
    name: &'static str,
    schedule: DailySchedule,
    job: F,
    clock: C,
) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
    C: Fn() -> DateTime<Tz> + Send + Sync + 'static,
    Tz: TimeZone + Send + 'static,
    Tz::Offset: Send + Sync + fmt::Display,
{
    tokio::spawn(async move {
        let mut last_fired: Option<DateTime<Tz>> = None;

        loop {
            let next = next_fire(&schedule, &clock(), last_fired.as_ref());
            debug!(job = name, next_run = %next.to_rfc3339(), "Scheduled job waiting");

            wait_until(&next, &clock).await;

            info!(job = name, schedule = %schedule, "Running scheduled job");
            job();
            last_fired = Some(next);
        }
    })
}

/// Next fire time after both `now` and the last fire time, so a backward
/// clock step never replays a fire time that already ran.
fn next_fire<Tz: TimeZone>(
    schedule: &DailySchedule,
    now: &DateTime<Tz>,
    last_fired: Option<&DateTime<Tz>>,
) -> DateTime<Tz> {
    match last_fired {
        Some(last) if last > now => schedule.next_after(last),
        _ => schedule.next_after(now),
    }
}

/// Sleeps until `clock` reaches `target`, re-reading it at least every
/// [`MAX_SLEEP`].
async fn wait_until<C, Tz>(target: &DateTime<Tz>, clock: &C)
where
    C: Fn() -> DateTime<Tz>,
    Tz: TimeZone,
{
    loop {
        let remaining = target.clone().signed_duration_since(clock());
        let Ok(remaining) = remaining.to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        sleep(remaining.min(MAX_SLEEP)).await;
    }
}
