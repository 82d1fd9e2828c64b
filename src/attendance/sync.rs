//! Poll-driven attendance synchronizer.
//!
//! # Sequencing
//! - One poll at a time. A timer tick that lands while a poll is in flight
//!   is dropped (`MissedTickBehavior::Skip`); a direct `poll_once` call made
//!   meanwhile returns [`PollOutcome::Skipped`].
//! - One clock write at a time.
//! - A poll that started before a clock write landed is discarded as
//!   [`PollOutcome::Stale`] and a follow-up poll is requested.
//! - Each applied poll replaces the snapshot and the derived clock state. The
//!   notes draft is never written by a poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::{watch, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconcile::{reconcile, ClockState};
use super::WallClock;
use crate::client::{ClientError, FarmApi};
use crate::model::{AttendanceEntry, AttendanceRecord, AttendanceReport, AttendanceStatus};
use crate::util::{non_blank, truncate_to_seconds};

/// Poll period used by the dashboards.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// One day's attendance as last fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceSnapshot {
    pub date: NaiveDate,
    pub report: AttendanceReport,
    pub fetched_at: DateTime<Utc>,
}

/// Everything an attendance widget renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceView {
    pub snapshot: Option<AttendanceSnapshot>,
    pub clock: ClockState,
    /// Notes for the next clock write, as the worker is typing them
    pub notes_draft: String,
    /// Last poll or write failure; cleared by the next applied poll
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied,
    /// Another poll was already in flight
    Skipped,
    /// A clock write landed mid-poll; the result was dropped
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClockAction {
    In,
    Out,
}

struct Inner<A: ?Sized> {
    api: Arc<A>,
    /// Whose clock widget this is; `None` for a manager overview
    worker_id: Option<i64>,
    wall: Arc<dyn WallClock>,
    view: RwLock<AttendanceView>,
    poll_lock: Mutex<()>,
    write_lock: Mutex<()>,
    /// Bumped after every successful clock write
    writes: AtomicU64,
    refresh: Notify,
    clock_tx: watch::Sender<ClockState>,
}

/// Shared handle to the attendance view of one client session.
pub struct AttendanceSync<A: FarmApi + ?Sized> {
    inner: Arc<Inner<A>>,
}

impl<A: FarmApi + ?Sized> Clone for AttendanceSync<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: FarmApi + ?Sized + 'static> AttendanceSync<A> {
    pub fn new(api: Arc<A>, worker_id: Option<i64>, wall: Arc<dyn WallClock>) -> Self {
        let (clock_tx, _) = watch::channel(ClockState::NotClockedIn);
        Self {
            inner: Arc::new(Inner {
                api,
                worker_id,
                wall,
                view: RwLock::new(AttendanceView::default()),
                poll_lock: Mutex::new(()),
                write_lock: Mutex::new(()),
                writes: AtomicU64::new(0),
                refresh: Notify::new(),
                clock_tx,
            }),
        }
    }

    pub async fn view(&self) -> AttendanceView {
        self.inner.view.read().await.clone()
    }

    pub async fn clock(&self) -> ClockState {
        self.inner.view.read().await.clock
    }

    /// Receiver that sees every change of the derived clock state.
    pub fn clock_updates(&self) -> watch::Receiver<ClockState> {
        self.inner.clock_tx.subscribe()
    }

    pub fn wall_clock(&self) -> Arc<dyn WallClock> {
        Arc::clone(&self.inner.wall)
    }

    pub async fn set_notes(&self, notes: impl Into<String>) {
        self.inner.view.write().await.notes_draft = notes.into();
    }

    /// Ask the running poller for a poll as soon as the current one is done.
    pub fn refresh_now(&self) {
        self.inner.refresh.notify_one();
    }

    /// Fetch today's attendance and reconcile the clock state against it.
    pub async fn poll_once(&self) -> Result<PollOutcome, ClientError> {
        let Ok(_in_flight) = self.inner.poll_lock.try_lock() else {
            debug!("Attendance poll already in flight, skipping");
            return Ok(PollOutcome::Skipped);
        };

        let generation = self.inner.writes.load(Ordering::SeqCst);
        let today = self.inner.wall.now().date();
        let report = match self.inner.api.attendance(today, today).await {
            Ok(report) => report,
            Err(e) => {
                self.record_error(&e).await;
                return Err(e);
            }
        };

        if self.inner.writes.load(Ordering::SeqCst) != generation {
            debug!("Dropping attendance poll that raced a clock write");
            self.inner.refresh.notify_one();
            return Ok(PollOutcome::Stale);
        }

        self.apply(report, today).await;
        Ok(PollOutcome::Applied)
    }

    async fn apply(&self, report: AttendanceReport, today: NaiveDate) {
        let clock = match self.inner.worker_id {
            Some(worker_id) => reconcile(&report.records, worker_id, today),
            None => ClockState::NotClockedIn,
        };
        {
            let mut view = self.inner.view.write().await;
            if view.clock != clock {
                debug!("Clock state reconciled: {:?} -> {:?}", view.clock, clock);
            }
            view.snapshot = Some(AttendanceSnapshot {
                date: today,
                report,
                fetched_at: Utc::now(),
            });
            view.clock = clock;
            view.last_error = None;
        }
        self.inner.clock_tx.send_replace(clock);
    }

    async fn record_error(&self, error: &ClientError) {
        self.inner.view.write().await.last_error = Some(error.to_string());
    }

    pub async fn clock_in(&self) -> Result<AttendanceRecord, ClientError> {
        self.write_clock(ClockAction::In).await
    }

    pub async fn clock_out(&self) -> Result<AttendanceRecord, ClientError> {
        self.write_clock(ClockAction::Out).await
    }

    async fn write_clock(&self, action: ClockAction) -> Result<AttendanceRecord, ClientError> {
        if self.inner.worker_id.is_none() {
            return Err(ClientError::Forbidden(
                "this attendance view is not bound to a worker".to_string(),
            ));
        }
        let Ok(_writing) = self.inner.write_lock.try_lock() else {
            return Err(ClientError::Conflict(
                "a clock update is already in progress".to_string(),
            ));
        };

        let now = self.inner.wall.now();
        let time = truncate_to_seconds(now.time());
        let notes = non_blank(Some(self.inner.view.read().await.notes_draft.as_str()));
        let entry = AttendanceEntry {
            date: now.date(),
            status: AttendanceStatus::Present,
            clock_in: (action == ClockAction::In).then_some(time),
            clock_out: (action == ClockAction::Out).then_some(time),
            notes,
        };

        let record = match self.inner.api.record_attendance(&entry).await {
            Ok(record) => record,
            Err(e) => {
                self.record_error(&e).await;
                return Err(e);
            }
        };
        self.inner.writes.fetch_add(1, Ordering::SeqCst);

        let clock = match action {
            ClockAction::In => ClockState::ClockedIn {
                since: now.date().and_time(time),
            },
            ClockAction::Out => ClockState::NotClockedIn,
        };
        {
            let mut view = self.inner.view.write().await;
            view.clock = clock;
            view.notes_draft.clear();
        }
        self.inner.clock_tx.send_replace(clock);
        info!("Clocked {:?} at {} on {}", action, time, entry.date);

        match self.poll_once().await {
            Ok(PollOutcome::Skipped) => self.refresh_now(),
            Ok(_) => {}
            Err(e) => warn!("Re-poll after clock {:?} failed: {}", action, e),
        }
        Ok(record)
    }

    /// Spawn the interval poller. The first poll runs immediately.
    pub fn start(&self, period: Duration) -> PollerHandle {
        let cancel = CancellationToken::new();
        let sync = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { sync.run(period, token).await });
        PollerHandle {
            cancel,
            handle: Some(handle),
        }
    }

    async fn run(self, period: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.inner.refresh.notified() => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.poll_once() => outcome,
            };

            match outcome {
                Ok(_) => {}
                Err(ClientError::AuthExpired) => {
                    info!("Attendance polling stopped: session is no longer valid");
                    break;
                }
                Err(e) => warn!("Attendance poll failed: {}", e),
            }
        }
        debug!("Attendance poller exited");
    }
}

/// Owns a running poller. Dropping the handle cancels the poller, including
/// any poll in flight.
pub struct PollerHandle {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Cancel and wait for the poller task to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!("Attendance poller task failed: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
