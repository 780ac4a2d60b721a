//! Error types for the timetable solver.

use thiserror::Error;

use crate::data::FixedSlot;

/// A problem with the input configuration, caught before any variable exists.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one section is required")]
    NoSections,

    #[error("section '{0}' is declared more than once")]
    DuplicateSection(String),

    #[error("at least one course is required")]
    NoCourses,

    #[error("course '{0}' is declared more than once")]
    DuplicateCourse(String),

    #[error("course '{0}' is reserved for free periods; enable free periods instead")]
    ReservedCourse(String),

    #[error("course '{0}' needs more periods per section than the {1} slots in a week")]
    QuotaExceedsWeek(String, usize),

    #[error("fixed slot {0} names an unknown section")]
    UnknownSection(FixedSlot),

    #[error("fixed slot {0} names an unknown course")]
    UnknownCourse(FixedSlot),

    #[error("fixed slot {0} names a period outside 1..=7")]
    PeriodOutOfRange(FixedSlot),

    #[error("fixed slots {0} and {1} pin different courses to the same slot")]
    ConflictingFixedSlots(FixedSlot, FixedSlot),

    #[error("the solver needs at least one worker")]
    NoWorkers,
}

/// Main error type for timetable operations.
#[derive(Debug, Error)]
pub enum TimetableError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A solved assignment broke an invariant the constraints should guarantee.
    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("failed to start solver workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, TimetableError>;
