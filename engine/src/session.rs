//! Async driver for one lesson session.
//!
//! [`LessonSession`] owns a [`LessonState`], feeds it events, and executes the
//! effects it returns against the injected collaborators. Store completions
//! are fed back as events before `dispatch` returns, so callers always observe
//! a settled state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use ve_ledger::{Ledger, MetadataTimeAuthority, ReflectionWrite};
use ve_local::LocalLockStore;
use ve_types::{DeviceId, Lesson, LessonError, LessonId, Notice, QuizId};

use crate::clock::{ClockSource, LocalClock};
use crate::lock::Cooldown;
use crate::progress::{Effect, Event, LessonState, Stage};
use crate::ticker::{CountdownTicker, TICK_PERIOD};

/// Everything a session talks to. No ambient handles.
#[derive(Debug, Clone)]
pub struct Collaborators {
    pub ledger: Ledger,
    pub locks: LocalLockStore,
    pub clock: Arc<ClockSource>,
    pub device: DeviceId,
}

impl Collaborators {
    /// Build collaborators with a clock sampled against the ledger's
    /// `metadata/serverTime` document.
    pub async fn with_sampled_clock(
        ledger: Ledger,
        locks: LocalLockStore,
        local: Arc<dyn LocalClock>,
        device: DeviceId,
    ) -> Self {
        let authority = MetadataTimeAuthority::new(Arc::clone(ledger.store()));
        let clock = ClockSource::sample(local, &authority).await;
        Self {
            ledger,
            locks,
            clock: Arc::new(clock),
            device,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cooldown: Cooldown,
    pub auth_uid: Option<String>,
    pub tick_period: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cooldown: Cooldown::default(),
            auth_uid: None,
            tick_period: TICK_PERIOD,
        }
    }
}

struct Countdown {
    // Held for its Drop.
    _ticker: CountdownTicker,
    ticks: mpsc::Receiver<DateTime<Utc>>,
}

pub struct LessonSession {
    state: LessonState,
    deps: Collaborators,
    settings: SessionSettings,
    notices: Vec<Notice>,
    countdown: Option<Countdown>,
}

impl std::fmt::Debug for LessonSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LessonSession")
            .field("lesson", self.state.lesson().id())
            .field("stage", &self.state.stage())
            .field("ticking", &self.countdown.is_some())
            .finish_non_exhaustive()
    }
}

impl LessonSession {
    /// Reconcile the lock start, make sure the account exists, and mount.
    pub async fn open(
        lesson: Arc<Lesson>,
        deps: Collaborators,
        settings: SessionSettings,
    ) -> Result<Self, LessonError> {
        if let Err(e) = deps
            .ledger
            .ensure_account(&deps.device, settings.auth_uid.as_deref())
            .await
        {
            warn!(device = %deps.device, "Account bootstrap failed: {e}");
        }

        let lock_start = reconcile_lock_start(&deps, lesson.id()).await;
        let now = deps.clock.adjusted_now();
        let transition = LessonState::mount(lesson, settings.cooldown, lock_start, now);
        info!(
            lesson = %transition.state.lesson().id(),
            locked = transition.state.is_locked(),
            "Lesson session opened"
        );

        let mut session = Self {
            state: transition.state,
            deps,
            settings,
            notices: Vec::new(),
            countdown: None,
        };
        for effect in transition.effects {
            session.execute(effect).await?;
        }
        Ok(session)
    }

    #[must_use]
    pub fn state(&self) -> &LessonState {
        &self.state
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        self.state.stage()
    }

    #[must_use]
    pub fn collaborators(&self) -> &Collaborators {
        &self.deps
    }

    /// Whether a countdown ticker is currently running.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.countdown.is_some()
    }

    /// Drain notices raised since the last call.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Reduce `event` and run its effects to completion.
    ///
    /// Returns the rejection if the reducer refused an event. Remote failures
    /// are not errors here; they surface as notices.
    pub async fn dispatch(&mut self, event: Event) -> Result<(), LessonError> {
        let mut queue = VecDeque::from([event]);
        let mut rejected = None;

        while let Some(event) = queue.pop_front() {
            let transition = self.state.clone().reduce(event);
            self.state = transition.state;
            for effect in transition.effects {
                match self.execute(effect).await {
                    Ok(Some(follow_up)) => queue.push_back(follow_up),
                    Ok(None) => {}
                    Err(e) => rejected = Some(e),
                }
            }
        }

        rejected.map_or(Ok(()), Err)
    }

    pub async fn advance(&mut self) -> Result<(), LessonError> {
        self.dispatch(Event::Advance).await
    }

    pub async fn retreat(&mut self) -> Result<(), LessonError> {
        self.dispatch(Event::Retreat).await
    }

    pub async fn select_option(&mut self, quiz: QuizId, option: usize) -> Result<(), LessonError> {
        self.dispatch(Event::SelectOption { quiz, option }).await
    }

    pub async fn edit_reflection(&mut self, text: impl Into<String>) -> Result<(), LessonError> {
        self.dispatch(Event::EditReflection(text.into())).await
    }

    pub async fn submit_quiz(&mut self) -> Result<(), LessonError> {
        self.dispatch(Event::SubmitQuiz).await
    }

    /// Replace the draft with `text` and submit it.
    pub async fn submit_reflection(&mut self, text: impl Into<String>) -> Result<(), LessonError> {
        self.edit_reflection(text).await?;
        self.dispatch(Event::SubmitReflection).await
    }

    pub async fn retry_sync(&mut self) -> Result<(), LessonError> {
        self.dispatch(Event::RetrySync).await
    }

    /// Recompute the lock against the current adjusted time.
    pub async fn tick(&mut self) -> Result<(), LessonError> {
        let now = self.deps.clock.adjusted_now();
        self.dispatch(Event::Tick { now }).await
    }

    /// Next countdown tick, or `None` when no countdown is running.
    pub async fn next_tick(&mut self) -> Option<DateTime<Utc>> {
        self.countdown.as_mut()?.ticks.recv().await
    }

    /// Feed ticks until the lock lifts. `on_tick` sees every intermediate state.
    pub async fn run_until_unlocked(
        &mut self,
        mut on_tick: impl FnMut(&LessonState),
    ) -> Result<(), LessonError> {
        while self.state.is_locked() {
            let Some(now) = self.next_tick().await else {
                break;
            };
            self.dispatch(Event::Tick { now }).await?;
            on_tick(&self.state);
        }
        Ok(())
    }

    async fn execute(&mut self, effect: Effect) -> Result<Option<Event>, LessonError> {
        let device = &self.deps.device;
        match effect {
            Effect::PersistQuiz { lesson, outcome } => {
                let result = self.deps.ledger.record_quiz(device, &lesson, outcome).await;
                Ok(Some(match result {
                    Ok(record) => Event::QuizPersisted(record),
                    Err(e) => {
                        warn!(lesson = %lesson, "Quiz result not saved: {e}");
                        Event::QuizPersistFailed(e.into())
                    }
                }))
            }
            Effect::PersistReflection {
                record,
                lesson,
                text,
            } => {
                let result = self
                    .deps
                    .ledger
                    .record_reflection(&record, &lesson, &text)
                    .await;
                Ok(Some(match result {
                    Ok(write) => {
                        if let ReflectionWrite::Unpublished(e) = write {
                            self.notices.push(Notice::reflection_unpublished(&e.into()));
                        }
                        Event::ReflectionPersisted {
                            at: self.deps.clock.adjusted_now(),
                        }
                    }
                    Err(e) => {
                        warn!(lesson = %lesson, record = %record.id(), "Reflection not saved: {e}");
                        Event::ReflectionPersistFailed(e.into())
                    }
                }))
            }
            Effect::StoreLockStart { lesson, at } => {
                // The ledger already holds the authoritative date.
                if let Err(e) = self.deps.locks.record_lock_start(&lesson, at) {
                    warn!(lesson = %lesson, "Lock start not cached locally: {e}");
                }
                Ok(None)
            }
            Effect::StartCountdown => {
                self.start_countdown();
                Ok(None)
            }
            Effect::StopCountdown => {
                if self.countdown.take().is_some() {
                    debug!(lesson = %self.state.lesson().id(), "Countdown stopped");
                }
                Ok(None)
            }
            Effect::Notify(notice) => {
                warn!(title = %notice.title, retryable = notice.retryable, "{}", notice.message);
                self.notices.push(notice);
                Ok(None)
            }
            Effect::Reject(error) => {
                debug!(lesson = %self.state.lesson().id(), "Event rejected: {error}");
                Err(error)
            }
        }
    }

    fn start_countdown(&mut self) {
        let (tx, ticks) = mpsc::channel(4);
        let ticker = CountdownTicker::spawn(
            Arc::clone(&self.deps.clock),
            self.settings.tick_period,
            tx,
        );
        // Replacing an existing countdown drops (and aborts) its ticker.
        self.countdown = Some(Countdown {
            _ticker: ticker,
            ticks,
        });
        debug!(lesson = %self.state.lesson().id(), "Countdown started");
    }
}

/// Lock start at launch. The ledger wins when reachable; the local cache is
/// used offline and refreshed when the ledger is ahead of it.
///
/// The ledger value is the account's `last_lesson_date`, which phase 1 writes
/// at quiz submission. It is per account, not per lesson: every lesson in a
/// catalog locks together, and a quiz submitted without a reflection still
/// locks the lesson on the next launch.
async fn reconcile_lock_start(deps: &Collaborators, lesson: &LessonId) -> Option<DateTime<Utc>> {
    let local = deps.locks.lock_start(lesson).unwrap_or_else(|e| {
        warn!(lesson = %lesson, "Local lock cache unreadable: {e}");
        None
    });

    match deps.ledger.last_lesson_date(&deps.device).await {
        Ok(Some(remote)) => {
            if local.is_none_or(|local| local < remote)
                && let Err(e) = deps.locks.record_lock_start(lesson, remote)
            {
                warn!(lesson = %lesson, "Lock cache refresh failed: {e}");
            }
            let start = local.map_or(remote, |local| local.max(remote));
            debug!(lesson = %lesson, %start, "Lock start reconciled with ledger");
            Some(start)
        }
        Ok(None) => {
            debug!(lesson = %lesson, "Ledger has no lesson date; lesson unlocked");
            None
        }
        Err(e) => {
            warn!(lesson = %lesson, "Ledger unreachable, using local lock cache: {e}");
            local
        }
    }
}
