//! Quiz submissions, grading and attempt governance.

pub mod engine;
pub mod types;

pub use engine::{check_eligibility, grade_answers, QuizGradingService};
pub use types::{AttemptId, Eligibility, Grade, QuizAttempt, QuizResult, QuizSubmission};
