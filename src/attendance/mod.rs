//! Client-side attendance: clock-state reconciliation, the interval poller,
//! and the elapsed-time ticker for the clock widget.

mod elapsed;
mod reconcile;
mod sync;

use chrono::{Local, NaiveDateTime};

pub use elapsed::{ElapsedTicker, ELAPSED_REFRESH};
pub use reconcile::{format_elapsed, reconcile, todays_record, ClockState};
pub use sync::{
    AttendanceSnapshot, AttendanceSync, AttendanceView, PollOutcome, PollerHandle,
    DEFAULT_POLL_INTERVAL,
};

/// Source of the worker's local wall-clock time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// The machine's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl WallClock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
