//! Lesson templates.
//!
//! A lesson is immutable once constructed: page order is fixed and every quiz
//! page carries its own id, so lessons with several quizzes score additively.
//! Invalid lessons are rejected at construction (and therefore at
//! deserialization).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{LessonId, QuizId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizPage {
    pub id: QuizId,
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
}

impl QuizPage {
    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.answer_index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Page {
    Content {
        title: String,
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<String>,
    },
    Quiz(QuizPage),
    Reflection {
        prompt: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Content,
    Quiz,
    Reflection,
}

impl Page {
    #[must_use]
    pub fn kind(&self) -> PageKind {
        match self {
            Page::Content { .. } => PageKind::Content,
            Page::Quiz(_) => PageKind::Quiz,
            Page::Reflection { .. } => PageKind::Reflection,
        }
    }

    #[must_use]
    pub fn as_quiz(&self) -> Option<&QuizPage> {
        match self {
            Page::Quiz(quiz) => Some(quiz),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LessonDefinitionError {
    #[error("lesson {lesson} has no pages")]
    NoPages { lesson: LessonId },
    #[error("quiz {quiz} has no options")]
    NoOptions { quiz: QuizId },
    #[error("quiz {quiz} answer index {answer_index} is out of range for {options} options")]
    AnswerOutOfRange {
        quiz: QuizId,
        answer_index: usize,
        options: usize,
    },
    #[error("quiz id {quiz} appears more than once")]
    DuplicateQuiz { quiz: QuizId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "LessonDefinition", into = "LessonDefinition")]
pub struct Lesson {
    id: LessonId,
    title: String,
    pages: Vec<Page>,
}

/// Unvalidated wire shape of a lesson.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LessonDefinition {
    id: LessonId,
    title: String,
    pages: Vec<Page>,
}

impl TryFrom<LessonDefinition> for Lesson {
    type Error = LessonDefinitionError;

    fn try_from(value: LessonDefinition) -> Result<Self, Self::Error> {
        Lesson::new(value.id, value.title, value.pages)
    }
}

impl From<Lesson> for LessonDefinition {
    fn from(value: Lesson) -> Self {
        Self {
            id: value.id,
            title: value.title,
            pages: value.pages,
        }
    }
}

impl Lesson {
    pub fn new(
        id: LessonId,
        title: impl Into<String>,
        pages: Vec<Page>,
    ) -> Result<Self, LessonDefinitionError> {
        if pages.is_empty() {
            return Err(LessonDefinitionError::NoPages { lesson: id });
        }

        let mut seen = HashSet::new();
        for quiz in pages.iter().filter_map(Page::as_quiz) {
            if quiz.options.is_empty() {
                return Err(LessonDefinitionError::NoOptions {
                    quiz: quiz.id.clone(),
                });
            }
            if quiz.answer_index >= quiz.options.len() {
                return Err(LessonDefinitionError::AnswerOutOfRange {
                    quiz: quiz.id.clone(),
                    answer_index: quiz.answer_index,
                    options: quiz.options.len(),
                });
            }
            if !seen.insert(&quiz.id) {
                return Err(LessonDefinitionError::DuplicateQuiz {
                    quiz: quiz.id.clone(),
                });
            }
        }

        Ok(Self {
            id,
            title: title.into(),
            pages,
        })
    }

    #[must_use]
    pub fn id(&self) -> &LessonId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    #[must_use]
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn quiz_pages(&self) -> impl Iterator<Item = &QuizPage> {
        self.pages.iter().filter_map(Page::as_quiz)
    }

    #[must_use]
    pub fn quiz(&self, id: &QuizId) -> Option<&QuizPage> {
        self.quiz_pages().find(|quiz| &quiz.id == id)
    }

    #[must_use]
    pub fn quiz_count(&self) -> u32 {
        self.quiz_pages().count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::{Lesson, LessonDefinitionError, Page, QuizPage};
    use crate::{LessonId, QuizId};

    fn quiz(id: &str, answer_index: usize) -> Page {
        Page::Quiz(QuizPage {
            id: QuizId::new(id).unwrap(),
            question: "Which?".to_owned(),
            options: vec!["a".to_owned(), "b".to_owned()],
            answer_index,
        })
    }

    #[test]
    fn rejects_answer_out_of_range() {
        let err = Lesson::new(LessonId::new("l").unwrap(), "L", vec![quiz("q1", 2)]).unwrap_err();
        assert!(matches!(
            err,
            LessonDefinitionError::AnswerOutOfRange { answer_index: 2, .. }
        ));
    }

    #[test]
    fn rejects_duplicate_quiz_ids() {
        let err = Lesson::new(
            LessonId::new("l").unwrap(),
            "L",
            vec![quiz("q1", 0), quiz("q1", 1)],
        )
        .unwrap_err();
        assert!(matches!(err, LessonDefinitionError::DuplicateQuiz { .. }));
    }

    #[test]
    fn deserializes_tagged_pages() {
        let json = r#"{
            "id": "kindness-001",
            "title": "Kindness",
            "pages": [
                {"type": "content", "title": "Be kind", "body": "Kindness matters."},
                {"type": "quiz", "id": "q1", "question": "Why?", "options": ["x", "y"], "answer_index": 1},
                {"type": "reflection", "prompt": "When were you kind?"}
            ]
        }"#;
        let lesson: Lesson = serde_json::from_str(json).unwrap();
        assert_eq!(lesson.page_count(), 3);
        assert_eq!(lesson.quiz_count(), 1);
        assert!(lesson.quiz(&QuizId::new("q1").unwrap()).unwrap().is_correct(1));
    }

    #[test]
    fn deserialization_runs_validation() {
        let json = r#"{"id": "empty", "title": "Empty", "pages": []}"#;
        assert!(serde_json::from_str::<Lesson>(json).is_err());
    }
}
