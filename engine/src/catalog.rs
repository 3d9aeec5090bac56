//! Lesson catalog: the built-in lessons or a JSON file of lesson definitions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use ve_types::{Lesson, LessonId};

const BUILTIN_LESSONS: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/lessons.json"));

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read lesson catalog {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid lesson catalog {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("lesson {0} is defined more than once")]
    DuplicateLesson(LessonId),
    #[error("lesson catalog is empty")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    lessons: Vec<Arc<Lesson>>,
}

impl Catalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_LESSONS, "<builtin>")
    }

    pub fn load_json(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json(&content, &path.display().to_string())?;
        tracing::info!(path = %path.display(), lessons = catalog.len(), "Lesson catalog loaded");
        Ok(catalog)
    }

    fn from_json(content: &str, origin: &str) -> Result<Self, CatalogError> {
        let lessons: Vec<Lesson> =
            serde_json::from_str(content).map_err(|source| CatalogError::Parse {
                origin: origin.to_owned(),
                source,
            })?;
        Self::new(lessons)
    }

    pub fn new(lessons: Vec<Lesson>) -> Result<Self, CatalogError> {
        if lessons.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut out: Vec<Arc<Lesson>> = Vec::with_capacity(lessons.len());
        for lesson in lessons {
            if out.iter().any(|existing| existing.id() == lesson.id()) {
                return Err(CatalogError::DuplicateLesson(lesson.id().clone()));
            }
            out.push(Arc::new(lesson));
        }
        Ok(Self { lessons: out })
    }

    #[must_use]
    pub fn get(&self, id: &LessonId) -> Option<Arc<Lesson>> {
        self.lessons.iter().find(|lesson| lesson.id() == id).cloned()
    }

    /// The lesson offered when none is named.
    #[must_use]
    pub fn first(&self) -> Arc<Lesson> {
        // Non-empty by construction.
        Arc::clone(&self.lessons[0])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Lesson>> {
        self.lessons.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }
}
