//! Course catalog — courses, modules, lessons and their quizzes.
//!
//! Content authoring happens elsewhere; the pipeline only reads the catalog
//! to locate a lesson's quiz and to count the lessons a course requires.

use serde::{Deserialize, Serialize};

use crate::error::{CredentialError, Result};

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Unique identifier for a course.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CourseId(pub String);

/// Unique identifier for a lesson.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LessonId(pub String);

/// Unique identifier for a quiz question.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuestionId(pub String);

impl std::fmt::Display for CourseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for LessonId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for QuestionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Catalog types
// ---------------------------------------------------------------------------

/// A multiple-choice question. `correct_option` indexes into `options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: QuestionId,
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_option: u32,
}

/// A lesson and its (possibly empty) quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub title: String,
    #[serde(default)]
    pub quiz: Vec<QuizQuestion>,
}

/// A module groups lessons inside a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// A course. `slug` is the public, human-readable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
}

impl Course {
    /// All lessons across all modules, in module order.
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.modules.iter().flat_map(|m| m.lessons.iter())
    }

    /// Number of lessons under the course's modules.
    pub fn lesson_count(&self) -> usize {
        self.lessons().count()
    }

    pub fn find_lesson(&self, id: &LessonId) -> Option<&Lesson> {
        self.lessons().find(|l| &l.id == id)
    }

    /// Structural checks run before a course enters the catalog.
    pub fn validate(&self) -> Result<()> {
        if self.slug.trim().is_empty() {
            return Err(CredentialError::Validation("course slug is empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for lesson in self.lessons() {
            if !seen.insert(&lesson.id) {
                return Err(CredentialError::Validation(format!(
                    "duplicate lesson id '{}' in course '{}'",
                    lesson.id, self.slug
                )));
            }
            for q in &lesson.quiz {
                if q.correct_option as usize >= q.options.len() {
                    return Err(CredentialError::Validation(format!(
                        "question '{}' in lesson '{}' has no option {}",
                        q.id, lesson.id, q.correct_option
                    )));
                }
            }
        }
        Ok(())
    }
}
