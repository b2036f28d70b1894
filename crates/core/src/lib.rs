//! Hifz core data models.
//!
//! This crate defines the entities and pure progression math behind the
//! memorization-plan gating engine: students, exam records, plans, exam
//! requests, and the track-specific official-exam requirement tables.

#![warn(missing_docs)]

// Core identities
mod id;

// People and plans
mod student;
mod plan;

// Exams
mod exam;
mod request;
mod registration;

// Pure progression math
pub mod pointer;
pub mod requirements;

// Re-exports
pub use id::*;

pub use student::{Gender, Student, Track};
pub use plan::{ContinuationMode, DurationUnit, PartRange, Plan, PlanDuration};
pub use exam::{ExamCode, ExamRecord, OfficialCode, PartNumber, CodeParseError, PASS_MARK};
pub use request::{ExamRequest, RequestKind, RunMode};
pub use registration::{RegistrationWindows, Window};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;

/// Calendar-date type used for exam and plan dates.
pub type Day = chrono::NaiveDate;
