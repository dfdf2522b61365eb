//! Lesson progress records and course enrollment.

pub mod aggregator;
pub mod types;

pub use aggregator::{course_progress, ProgressAggregator};
pub use types::{Enrollment, ProgressRecord};
