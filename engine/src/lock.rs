//! Cooldown lock predicate and countdown.
//!
//! A lesson is locked while `now - start < cooldown`. The countdown runs to
//! the exact unlock instant, so it reaches zero when the predicate flips.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown(TimeDelta);

impl Cooldown {
    pub const DEFAULT_SECS: u32 = 120;

    #[must_use]
    pub fn from_secs(secs: u32) -> Self {
        Self(TimeDelta::seconds(i64::from(secs)))
    }

    #[must_use]
    pub fn duration(self) -> TimeDelta {
        self.0
    }
}

impl Default for Cooldown {
    fn default() -> Self {
        Self::from_secs(Self::DEFAULT_SECS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockWindow {
    start: DateTime<Utc>,
    cooldown: Cooldown,
}

impl LockWindow {
    #[must_use]
    pub fn new(start: DateTime<Utc>, cooldown: Cooldown) -> Self {
        Self { start, cooldown }
    }

    #[must_use]
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        now - self.start < self.cooldown.duration()
    }

    #[must_use]
    pub fn unlocks_at(&self) -> DateTime<Utc> {
        self.start + self.cooldown.duration()
    }

    /// Counts to the exact unlock instant, not a minute boundary, so it
    /// elapses when [`Self::is_locked`] flips.
    #[must_use]
    pub fn countdown(&self, now: DateTime<Utc>) -> Countdown {
        Countdown::new(self.unlocks_at() - now)
    }
}

/// Time left until the unlock boundary, clamped at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown(TimeDelta);

impl Countdown {
    #[must_use]
    pub fn new(remaining: TimeDelta) -> Self {
        Self(remaining.max(TimeDelta::zero()))
    }

    #[must_use]
    pub fn remaining(self) -> TimeDelta {
        self.0
    }

    #[must_use]
    pub fn is_elapsed(self) -> bool {
        self.0 <= TimeDelta::zero()
    }

    /// Whole seconds left, rounded to the nearest second.
    #[must_use]
    pub fn rounded_secs(self) -> i64 {
        (self.0.num_milliseconds() + 500) / 1000
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.rounded_secs();
        write!(f, "{}m {}s", secs / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    use super::{Cooldown, Countdown, LockWindow};

    fn aligned_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn predicate_flips_exactly_at_cooldown() {
        let window = LockWindow::new(aligned_start(), Cooldown::from_secs(120));
        for ms in [0_i64, 1, 60_000, 119_000, 119_999] {
            let now = aligned_start() + TimeDelta::milliseconds(ms);
            assert!(window.is_locked(now), "expected locked at +{ms}ms");
        }
        for ms in [120_000_i64, 120_001, 3_600_000] {
            let now = aligned_start() + TimeDelta::milliseconds(ms);
            assert!(!window.is_locked(now), "expected unlocked at +{ms}ms");
        }
    }

    #[test]
    fn countdown_at_ninety_seconds_shows_thirty() {
        let window = LockWindow::new(aligned_start(), Cooldown::from_secs(120));
        let countdown = window.countdown(aligned_start() + TimeDelta::seconds(90));
        assert_eq!(countdown.to_string(), "0m 30s");
    }

    #[test]
    fn countdown_never_negative() {
        let window = LockWindow::new(aligned_start(), Cooldown::from_secs(120));
        let countdown = window.countdown(aligned_start() + TimeDelta::minutes(10));
        assert!(countdown.is_elapsed());
        assert_eq!(countdown.remaining(), TimeDelta::zero());
        assert_eq!(countdown.to_string(), "0m 0s");
    }

    #[test]
    fn countdown_elapses_when_predicate_flips() {
        let start = aligned_start() + TimeDelta::milliseconds(17_250);
        let window = LockWindow::new(start, Cooldown::from_secs(120));
        assert_eq!(
            window.countdown(start + TimeDelta::seconds(90)).to_string(),
            "0m 30s"
        );
        let just_before = window.unlocks_at() - TimeDelta::milliseconds(1);
        assert!(window.is_locked(just_before));
        assert!(!window.countdown(just_before).is_elapsed());
        assert!(!window.is_locked(window.unlocks_at()));
        assert!(window.countdown(window.unlocks_at()).is_elapsed());
    }

    #[test]
    fn display_folds_hours_into_minutes() {
        let countdown = Countdown::new(TimeDelta::seconds(2 * 3600 + 5 * 60 + 9));
        assert_eq!(countdown.to_string(), "125m 9s");
    }

    #[test]
    fn display_rounds_to_nearest_second() {
        assert_eq!(Countdown::new(TimeDelta::milliseconds(29_600)).to_string(), "0m 30s");
        assert_eq!(Countdown::new(TimeDelta::milliseconds(29_400)).to_string(), "0m 29s");
    }
}
