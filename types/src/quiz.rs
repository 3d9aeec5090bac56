//! Per-session quiz selections and scoring.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{Lesson, QuizId, QuizPage};

/// The user's current pick for each quiz page.
///
/// Never persisted; collapses into a [`QuizOutcome`] at submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizSelections {
    picks: HashMap<QuizId, usize>,
}

impl QuizSelections {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pick, replacing any earlier pick for the same quiz.
    pub fn select(&mut self, quiz: QuizId, option: usize) {
        self.picks.insert(quiz, option);
    }

    #[must_use]
    pub fn selected(&self, quiz: &QuizId) -> Option<usize> {
        self.picks.get(quiz).copied()
    }

    #[must_use]
    pub fn has_selection(&self, quiz: &QuizId) -> bool {
        self.picks.contains_key(quiz)
    }

    /// Score every quiz page of `lesson`. Unanswered pages count as incorrect.
    #[must_use]
    pub fn score(&self, lesson: &Lesson) -> QuizOutcome {
        let score = lesson
            .quiz_pages()
            .filter(|quiz| self.selected(&quiz.id) == Some(quiz.answer_index))
            .count() as u32;
        QuizOutcome {
            score,
            total: lesson.quiz_count(),
        }
    }

    /// Feedback for the currently selected option of `quiz`, if any.
    #[must_use]
    pub fn feedback(&self, quiz: &QuizPage) -> Option<OptionFeedback> {
        self.selected(&quiz.id).map(|option| {
            if quiz.is_correct(option) {
                OptionFeedback::Correct { option }
            } else {
                OptionFeedback::Incorrect { option }
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub score: u32,
    pub total: u32,
}

impl QuizOutcome {
    /// Points awarded for the quiz alone (one per correct answer).
    #[must_use]
    pub fn points(self) -> i64 {
        i64::from(self.score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionFeedback {
    Correct { option: usize },
    Incorrect { option: usize },
}
