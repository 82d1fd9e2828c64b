//! Derive a worker's clock state from server records.
//!
//! There is no persisted "clocked in" flag. The state is recomputed from
//! today's record on every load and poll, so a crashed session or a second
//! device can never leave the client disagreeing with the server.

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::model::AttendanceRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockState {
    #[default]
    NotClockedIn,
    ClockedIn {
        since: NaiveDateTime,
    },
}

impl ClockState {
    pub fn is_clocked_in(&self) -> bool {
        matches!(self, ClockState::ClockedIn { .. })
    }

    pub fn since(&self) -> Option<NaiveDateTime> {
        match self {
            ClockState::ClockedIn { since } => Some(*since),
            ClockState::NotClockedIn => None,
        }
    }

    /// Time on the clock as of `now`; never negative.
    pub fn elapsed(&self, now: NaiveDateTime) -> Option<Duration> {
        self.since()
            .map(|since| (now - since).max(Duration::zero()))
    }
}

/// The worker's record for `today`, if any.
pub fn todays_record(
    records: &[AttendanceRecord],
    worker_id: i64,
    today: NaiveDate,
) -> Option<&AttendanceRecord> {
    records
        .iter()
        .find(|r| r.worker_id == worker_id && r.date == today)
}

/// Clocked in iff today's record has a clock-in and no clock-out.
pub fn reconcile(records: &[AttendanceRecord], worker_id: i64, today: NaiveDate) -> ClockState {
    match todays_record(records, worker_id, today) {
        Some(AttendanceRecord {
            clock_in: Some(clock_in),
            clock_out: None,
            ..
        }) => ClockState::ClockedIn {
            since: today.and_time(*clock_in),
        },
        _ => ClockState::NotClockedIn,
    }
}

/// `3h 05m` style rendering for the clock widget.
pub fn format_elapsed(elapsed: Duration) -> String {
    let minutes = elapsed.num_minutes().max(0);
    format!("{}h {:02}m", minutes / 60, minutes % 60)
}
