//! Once-per-second countdown ticks.
//!
//! The ticker owns its spawned task. Dropping it aborts the task, and the
//! receiving end observes a closed channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::ClockSource;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct CountdownTicker {
    abort_handle: AbortHandle,
}

impl CountdownTicker {
    /// Send `clock.adjusted_now()` every `period` until dropped or the
    /// receiver goes away.
    #[must_use]
    pub fn spawn(
        clock: Arc<ClockSource>,
        period: Duration,
        tx: mpsc::Sender<DateTime<Utc>>,
    ) -> Self {
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                if tx.send(clock.adjusted_now()).await.is_err() {
                    tracing::debug!("Countdown receiver dropped; ticker exiting");
                    break;
                }
            }
        });
        Self {
            abort_handle: task.abort_handle(),
        }
    }
}

impl Drop for CountdownTicker {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;

    use super::CountdownTicker;
    use crate::clock::{ClockSource, ManualClock};

    fn clock() -> Arc<ClockSource> {
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 3, 3, 0).unwrap();
        Arc::new(ClockSource::unsynced(Arc::new(ManualClock::new(now))))
    }

    #[tokio::test(start_paused = true)]
    async fn emits_adjusted_time_each_period() {
        let (tx, mut rx) = mpsc::channel(4);
        let _ticker = CountdownTicker::spawn(clock(), Duration::from_secs(1), tx);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first, Utc.with_ymd_and_hms(2025, 3, 3, 3, 3, 0).unwrap());
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_ticker_closes_channel() {
        let (tx, mut rx) = mpsc::channel(4);
        let ticker = CountdownTicker::spawn(clock(), Duration::from_secs(1), tx);
        assert!(rx.recv().await.is_some());

        drop(ticker);
        // Drain anything sent before the abort landed, then expect closure.
        while rx.recv().await.is_some() {}
        assert!(rx.is_closed());
    }
}
