//! Lesson progression state machine.
//!
//! [`LessonState::reduce`] is a pure `(state, event) -> (state, effects)`
//! function. It never touches a store or a clock: time enters through event
//! payloads, and every side effect leaves as an [`Effect`] for the driver in
//! [`crate::session`] to execute. The driver feeds completions back as events.
//!
//! Transitions:
//!
//! ```text
//! mount ──locked──> Locked ──Tick(unlocked)──> Viewing(0)
//!   └───unlocked──> Viewing(0) <─Advance/Retreat─> QuizActive
//! QuizActive ──SubmitQuiz──> QuizSubmitted(score) ──SubmitReflection──> Completed
//! Completed ──(lock armed)──> Locked
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ve_ledger::RecordRef;
use ve_types::{
    Lesson, LessonError, LessonId, NonEmptyString, Notice, OptionFeedback, Page, PageKind,
    QuizId, QuizOutcome, QuizSelections, ValidationError,
};

use crate::lock::{Cooldown, Countdown, LockWindow};

/// What the user is looking at, derived from [`LessonState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Locked,
    Viewing(usize),
    QuizActive,
    QuizSubmitted(u32),
    ReflectionActive,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Advance,
    Retreat,
    SelectOption { quiz: QuizId, option: usize },
    EditReflection(String),
    SubmitQuiz,
    QuizPersisted(RecordRef),
    QuizPersistFailed(LessonError),
    /// Re-send a quiz result whose write failed.
    RetrySync,
    SubmitReflection,
    /// `at` is the adjusted time the write completed; it becomes the lock start.
    ReflectionPersisted { at: DateTime<Utc> },
    ReflectionPersistFailed(LessonError),
    Tick { now: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    PersistQuiz {
        lesson: LessonId,
        outcome: QuizOutcome,
    },
    PersistReflection {
        record: RecordRef,
        lesson: LessonId,
        text: NonEmptyString,
    },
    StoreLockStart {
        lesson: LessonId,
        at: DateTime<Utc>,
    },
    StartCountdown,
    StopCountdown,
    Notify(Notice),
    Reject(LessonError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Quiz,
    Reflection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Progress {
    Answering,
    QuizSubmitted {
        outcome: QuizOutcome,
        record: Option<RecordRef>,
    },
    Completed {
        outcome: QuizOutcome,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Lock {
    window: LockWindow,
    countdown: Countdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonState {
    lesson: Arc<Lesson>,
    cooldown: Cooldown,
    page: usize,
    selections: QuizSelections,
    draft: String,
    progress: Progress,
    in_flight: Option<Submission>,
    lock: Option<Lock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: LessonState,
    pub effects: Vec<Effect>,
}

/// Free-function form of [`LessonState::reduce`].
#[must_use]
pub fn reduce(state: LessonState, event: Event) -> Transition {
    state.reduce(event)
}

const LOCKED: &str = "lesson is locked";
const IN_FLIGHT: &str = "a submission is already in progress";
const QUIZ_ALREADY_SUBMITTED: &str = "quiz already submitted";
const NOT_ON_QUIZ: &str = "current page is not a quiz";
const QUIZ_FIRST: &str = "complete the quiz first to unlock reflection";
const QUIZ_UNSAVED: &str = "quiz results have not been saved yet";
const REFLECTION_ALREADY_SUBMITTED: &str = "reflection already submitted";
const NOTHING_TO_RETRY: &str = "there is no failed submission to retry";

impl LessonState {
    /// Initial state: locked if the cooldown that began at `lock_start` is
    /// still running at `now`, otherwise the first page.
    #[must_use]
    pub fn mount(
        lesson: Arc<Lesson>,
        cooldown: Cooldown,
        lock_start: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Transition {
        let mut state = Self {
            lesson,
            cooldown,
            page: 0,
            selections: QuizSelections::new(),
            draft: String::new(),
            progress: Progress::Answering,
            in_flight: None,
            lock: None,
        };
        let mut effects = Vec::new();
        if let Some(start) = lock_start {
            let window = LockWindow::new(start, cooldown);
            if window.is_locked(now) {
                state.lock = Some(Lock {
                    window,
                    countdown: window.countdown(now),
                });
                effects.push(Effect::StartCountdown);
            }
        }
        Transition { state, effects }
    }

    // ── Queries ──────────────────────────────────────────────

    #[must_use]
    pub fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    #[must_use]
    pub fn page_index(&self) -> usize {
        self.page
    }

    #[must_use]
    pub fn current_page(&self) -> Option<&Page> {
        self.lesson.page(self.page)
    }

    #[must_use]
    pub fn stage(&self) -> Stage {
        if self.lock.is_some() {
            return Stage::Locked;
        }
        if matches!(self.progress, Progress::Completed { .. }) {
            return Stage::Completed;
        }
        let submitted = self.outcome().map(|outcome| outcome.score);
        match (self.current_page().map(Page::kind), submitted) {
            (Some(PageKind::Quiz), None) => Stage::QuizActive,
            (Some(PageKind::Quiz), Some(score)) => Stage::QuizSubmitted(score),
            (Some(PageKind::Reflection), Some(_)) => Stage::ReflectionActive,
            _ => Stage::Viewing(self.page),
        }
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    #[must_use]
    pub fn lock_window(&self) -> Option<LockWindow> {
        self.lock.as_ref().map(|lock| lock.window)
    }

    #[must_use]
    pub fn countdown(&self) -> Option<Countdown> {
        self.lock.as_ref().map(|lock| lock.countdown)
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self.progress, Progress::Completed { .. })
    }

    #[must_use]
    pub fn quiz_submitted(&self) -> bool {
        !matches!(self.progress, Progress::Answering)
    }

    /// Score shown to the user once the quiz is submitted.
    #[must_use]
    pub fn outcome(&self) -> Option<QuizOutcome> {
        match &self.progress {
            Progress::Answering => None,
            Progress::QuizSubmitted { outcome, .. } | Progress::Completed { outcome } => {
                Some(*outcome)
            }
        }
    }

    #[must_use]
    pub fn record(&self) -> Option<&RecordRef> {
        match &self.progress {
            Progress::QuizSubmitted { record, .. } => record.as_ref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<Submission> {
        self.in_flight
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.in_flight.is_some()
    }

    #[must_use]
    pub fn selections(&self) -> &QuizSelections {
        &self.selections
    }

    #[must_use]
    pub fn reflection_draft(&self) -> &str {
        &self.draft
    }

    /// Correct/incorrect feedback for the pick on `quiz`.
    #[must_use]
    pub fn feedback(&self, quiz: &QuizId) -> Option<OptionFeedback> {
        self.lesson
            .quiz(quiz)
            .and_then(|page| self.selections.feedback(page))
    }

    fn current_quiz(&self) -> Option<&QuizId> {
        self.current_page()
            .and_then(Page::as_quiz)
            .map(|quiz| &quiz.id)
    }

    fn navigable(&self) -> bool {
        self.lock.is_none() && self.in_flight.is_none()
    }

    #[must_use]
    pub fn can_advance(&self) -> bool {
        self.navigable() && !self.is_completed() && self.page + 1 < self.lesson.page_count()
    }

    #[must_use]
    pub fn can_retreat(&self) -> bool {
        self.navigable() && self.page > 0
    }

    #[must_use]
    pub fn can_submit_quiz(&self) -> bool {
        self.navigable()
            && matches!(self.progress, Progress::Answering)
            && self
                .current_quiz()
                .is_some_and(|quiz| self.selections.has_selection(quiz))
    }

    #[must_use]
    pub fn can_submit_reflection(&self) -> bool {
        self.navigable()
            && self.record().is_some()
            && !self.draft.trim().is_empty()
    }

    #[must_use]
    pub fn can_retry_sync(&self) -> bool {
        self.navigable()
            && matches!(
                self.progress,
                Progress::QuizSubmitted { record: None, .. }
            )
    }

    // ── Transitions ──────────────────────────────────────────

    #[must_use]
    pub fn reduce(mut self, event: Event) -> Transition {
        let mut effects = Vec::new();
        if let Err(error) = self.apply(event, &mut effects) {
            effects.push(Effect::Reject(error));
        }
        Transition {
            state: self,
            effects,
        }
    }

    fn apply(&mut self, event: Event, effects: &mut Vec<Effect>) -> Result<(), LessonError> {
        match event {
            Event::Advance => {
                self.ensure_navigable()?;
                if self.can_advance() {
                    self.page += 1;
                }
            }
            Event::Retreat => {
                self.ensure_navigable()?;
                if self.can_retreat() {
                    self.page -= 1;
                }
            }
            Event::SelectOption { quiz, option } => self.select(quiz, option)?,
            Event::EditReflection(text) => {
                self.ensure_unlocked()?;
                if !self.is_completed() {
                    self.draft = text;
                }
            }
            Event::SubmitQuiz => self.submit_quiz(effects)?,
            Event::QuizPersisted(record) => {
                if self.in_flight == Some(Submission::Quiz) {
                    self.in_flight = None;
                    if let Progress::QuizSubmitted { record: slot, .. } = &mut self.progress {
                        *slot = Some(record);
                    }
                }
            }
            Event::QuizPersistFailed(error) => {
                if self.in_flight == Some(Submission::Quiz) {
                    self.in_flight = None;
                    effects.push(Effect::Notify(Notice::quiz_sync_failed(&error)));
                }
            }
            Event::RetrySync => {
                self.ensure_navigable()?;
                if !self.can_retry_sync() {
                    return Err(LessonError::PreconditionViolation(NOTHING_TO_RETRY));
                }
                let outcome = self
                    .outcome()
                    .ok_or(LessonError::PreconditionViolation(NOTHING_TO_RETRY))?;
                self.in_flight = Some(Submission::Quiz);
                effects.push(Effect::PersistQuiz {
                    lesson: self.lesson.id().clone(),
                    outcome,
                });
            }
            Event::SubmitReflection => self.submit_reflection(effects)?,
            Event::ReflectionPersisted { at } => self.complete(at, effects),
            Event::ReflectionPersistFailed(error) => {
                if self.in_flight == Some(Submission::Reflection) {
                    self.in_flight = None;
                    effects.push(Effect::Notify(Notice::submission_failed(
                        "reflection",
                        &error,
                    )));
                }
            }
            Event::Tick { now } => self.tick(now, effects),
        }
        Ok(())
    }

    fn ensure_unlocked(&self) -> Result<(), LessonError> {
        if self.lock.is_some() {
            return Err(LessonError::PreconditionViolation(LOCKED));
        }
        Ok(())
    }

    fn ensure_navigable(&self) -> Result<(), LessonError> {
        self.ensure_unlocked()?;
        if self.in_flight.is_some() {
            return Err(LessonError::PreconditionViolation(IN_FLIGHT));
        }
        Ok(())
    }

    fn select(&mut self, quiz: QuizId, option: usize) -> Result<(), LessonError> {
        self.ensure_unlocked()?;
        let page = self
            .lesson
            .quiz(&quiz)
            .ok_or_else(|| ValidationError::UnknownQuiz { quiz: quiz.clone() })?;
        if option >= page.options.len() {
            return Err(ValidationError::OptionOutOfRange {
                options: page.options.len(),
                quiz,
                option,
            }
            .into());
        }
        // Picks are frozen once the quiz has been scored.
        if matches!(self.progress, Progress::Answering) {
            self.selections.select(quiz, option);
        }
        Ok(())
    }

    fn submit_quiz(&mut self, effects: &mut Vec<Effect>) -> Result<(), LessonError> {
        self.ensure_navigable()?;
        if !matches!(self.progress, Progress::Answering) {
            return Err(LessonError::PreconditionViolation(QUIZ_ALREADY_SUBMITTED));
        }
        let quiz = self
            .current_quiz()
            .ok_or(LessonError::PreconditionViolation(NOT_ON_QUIZ))?;
        if !self.selections.has_selection(quiz) {
            return Err(ValidationError::MissingSelection { quiz: quiz.clone() }.into());
        }

        let outcome = self.selections.score(&self.lesson);
        self.progress = Progress::QuizSubmitted {
            outcome,
            record: None,
        };
        if self.page + 1 < self.lesson.page_count() {
            self.page += 1;
        }
        self.in_flight = Some(Submission::Quiz);
        effects.push(Effect::PersistQuiz {
            lesson: self.lesson.id().clone(),
            outcome,
        });
        Ok(())
    }

    fn submit_reflection(&mut self, effects: &mut Vec<Effect>) -> Result<(), LessonError> {
        self.ensure_navigable()?;
        let record = match &self.progress {
            Progress::Answering => return Err(LessonError::PreconditionViolation(QUIZ_FIRST)),
            Progress::Completed { .. } => {
                return Err(LessonError::PreconditionViolation(
                    REFLECTION_ALREADY_SUBMITTED,
                ));
            }
            Progress::QuizSubmitted { record, .. } => record.clone(),
        };
        let text = NonEmptyString::new(self.draft.as_str())
            .map_err(|_| ValidationError::EmptyReflection)?;
        let record = record.ok_or(LessonError::PreconditionViolation(QUIZ_UNSAVED))?;

        self.in_flight = Some(Submission::Reflection);
        effects.push(Effect::PersistReflection {
            record,
            lesson: self.lesson.id().clone(),
            text,
        });
        Ok(())
    }

    fn complete(&mut self, at: DateTime<Utc>, effects: &mut Vec<Effect>) {
        if self.in_flight != Some(Submission::Reflection) {
            return;
        }
        self.in_flight = None;
        let Some(outcome) = self.outcome() else {
            return;
        };
        self.progress = Progress::Completed { outcome };

        let window = LockWindow::new(at, self.cooldown);
        effects.push(Effect::StoreLockStart {
            lesson: self.lesson.id().clone(),
            at,
        });
        if window.is_locked(at) {
            self.lock = Some(Lock {
                window,
                countdown: window.countdown(at),
            });
            effects.push(Effect::StartCountdown);
        }
    }

    fn tick(&mut self, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        let Some(lock) = &mut self.lock else {
            return;
        };
        lock.countdown = lock.window.countdown(now);
        if lock.window.is_locked(now) && !lock.countdown.is_elapsed() {
            return;
        }
        self.restart();
        effects.push(Effect::StopCountdown);
    }

    /// Begin a fresh attempt after the cooldown has run out.
    fn restart(&mut self) {
        self.lock = None;
        self.page = 0;
        self.selections = QuizSelections::new();
        self.draft.clear();
        self.progress = Progress::Answering;
        self.in_flight = None;
    }
}
