//! Device clock reconciled against server time.
//!
//! The offset is sampled once per session. If the server time is absent or
//! cannot be fetched, the offset is zero and the device clock is trusted.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use ve_ledger::TimeAuthority;

pub trait LocalClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl LocalClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl LocalClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Clone)]
pub struct ClockSource {
    local: Arc<dyn LocalClock>,
    offset: TimeDelta,
}

impl std::fmt::Debug for ClockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockSource")
            .field("offset_ms", &self.offset.num_milliseconds())
            .finish_non_exhaustive()
    }
}

impl ClockSource {
    /// Trust the device clock as-is.
    #[must_use]
    pub fn unsynced(local: Arc<dyn LocalClock>) -> Self {
        Self {
            local,
            offset: TimeDelta::zero(),
        }
    }

    /// Sample `authority` once and derive the device/server offset.
    pub async fn sample(local: Arc<dyn LocalClock>, authority: &dyn TimeAuthority) -> Self {
        let offset = match authority.fetch_server_timestamp().await {
            Ok(Some(server_now)) => {
                let offset = local.now() - server_now;
                tracing::debug!(offset_ms = offset.num_milliseconds(), "Server time sampled");
                offset
            }
            Ok(None) => {
                tracing::debug!("No server time available; using device clock");
                TimeDelta::zero()
            }
            Err(e) => {
                tracing::warn!("Failed to get server time: {e}");
                TimeDelta::zero()
            }
        };
        Self { local, offset }
    }

    #[must_use]
    pub fn offset(&self) -> TimeDelta {
        self.offset
    }

    #[must_use]
    pub fn local_now(&self) -> DateTime<Utc> {
        self.local.now()
    }

    /// Local time corrected by the sampled offset.
    #[must_use]
    pub fn adjusted_now(&self) -> DateTime<Utc> {
        self.local.now() - self.offset
    }
}
