//! Ticking display of how long the worker has been clocked in.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::reconcile::{format_elapsed, ClockState};
use super::WallClock;

/// How often the clocked-in duration is recomputed.
pub const ELAPSED_REFRESH: Duration = Duration::from_secs(60);

/// Publishes time on the clock, recomputed once per period and whenever the
/// clock state changes. Stops when dropped.
pub struct ElapsedTicker {
    elapsed: watch::Receiver<Option<chrono::Duration>>,
    cancel: CancellationToken,
}

impl ElapsedTicker {
    pub fn spawn(
        mut clock: watch::Receiver<ClockState>,
        wall: Arc<dyn WallClock>,
        period: Duration,
    ) -> Self {
        let initial = clock.borrow_and_update().elapsed(wall.now());
        let (tx, elapsed) = watch::channel(initial);
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                    changed = clock.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let state = *clock.borrow_and_update();
                tx.send_replace(state.elapsed(wall.now()));
            }
        });

        Self { elapsed, cancel }
    }

    pub fn current(&self) -> Option<chrono::Duration> {
        *self.elapsed.borrow()
    }

    pub fn display(&self) -> Option<String> {
        self.current().map(format_elapsed)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<chrono::Duration>> {
        self.elapsed.clone()
    }
}

impl Drop for ElapsedTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use tokio::time::Instant;

    /// Wall clock that advances with tokio's (pausable) clock.
    struct TokioClock {
        origin: NaiveDateTime,
        started: Instant,
    }

    impl WallClock for TokioClock {
        fn now(&self) -> NaiveDateTime {
            let passed = chrono::Duration::from_std(self.started.elapsed()).unwrap();
            self.origin + passed
        }
    }

    fn eight_am() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_every_period_while_clocked_in() {
        let (tx, rx) = watch::channel(ClockState::ClockedIn { since: eight_am() });
        let wall = Arc::new(TokioClock {
            origin: eight_am(),
            started: Instant::now(),
        });
        let ticker = ElapsedTicker::spawn(rx, wall, ELAPSED_REFRESH);
        assert_eq!(ticker.display().as_deref(), Some("0h 00m"));

        tokio::time::sleep(Duration::from_secs(60 * 60 + 1)).await;
        assert_eq!(ticker.display().as_deref(), Some("1h 00m"));

        tx.send_replace(ClockState::NotClockedIn);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticker.current(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_drop() {
        let (tx, rx) = watch::channel(ClockState::NotClockedIn);
        let wall = Arc::new(TokioClock {
            origin: eight_am(),
            started: Instant::now(),
        });
        let ticker = ElapsedTicker::spawn(rx, wall, ELAPSED_REFRESH);
        let updates = ticker.subscribe();
        drop(ticker);
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Sender side is gone once the task exits.
        assert!(updates.has_changed().is_err());
        drop(tx);
    }
}
