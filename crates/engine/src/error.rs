//! Engine error taxonomy.

use hifz_core::{OfficialCode, PartNumber, StudentId, Track};
use hifz_storage::StorageError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by engine operations.
///
/// Every variant is detected before (or instead of) mutating state; a
/// failing operation never partially commits.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Exam code or part number outside the closed sets
    #[error(transparent)]
    BadCode(#[from] hifz_core::CodeParseError),

    /// Official date must come strictly after the trial date
    #[error("official date must be after the trial date")]
    OfficialBeforeTrial,

    /// The student has no approved plan
    #[error("no approved plan for student {0}")]
    NoActivePlan(StudentId),

    /// Today falls outside the plan's start..=due window
    #[error("plan is outside its scheduled period")]
    PlanOutsideWindow,

    /// Progress is paused for an official exam; only redo requests pass
    #[error("plan is paused for an official exam; part requests must use redo mode")]
    GateClosed,

    /// Continuation mode needs a prior parts range that was not declared
    #[error("continuation mode requires a prior parts range")]
    MissingPriorRange,

    /// The plan is not waiting on this official exam
    #[error("official exam {0} is not outstanding for the current plan")]
    CodeNotOutstanding(OfficialCode),

    /// The part was already passed; a redo request is required
    #[error("part {0} was already recited; submit a redo request")]
    AlreadyPassed(PartNumber),

    /// The official exam was already passed
    #[error("official exam {0} was already passed")]
    AlreadyCertified(OfficialCode),

    /// Another request for the same exam is still active
    #[error("an active request for this exam already exists")]
    DuplicateRequest,

    /// Registration is administratively closed today
    #[error("exam registration is currently closed")]
    RegistrationClosed,

    /// Official code from the other track's ladder
    #[error("official exam {code} does not belong to the {track} track")]
    TrackMismatch {
        /// Offending code
        code: OfficialCode,
        /// Student's track
        track: Track,
    },

    /// Unknown student
    #[error("student {0} not found")]
    StudentNotFound(StudentId),

    /// Unknown exam record
    #[error("exam record not found")]
    ExamNotFound,

    /// Unknown or unapproved exam request
    #[error("exam request not found or not approved")]
    RequestNotFound,

    /// Storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// Classify the error per the failure-handling policy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::BadCode(_)
            | EngineError::OfficialBeforeTrial
            | EngineError::MissingPriorRange => ErrorKind::Validation,

            EngineError::PlanOutsideWindow
            | EngineError::GateClosed
            | EngineError::CodeNotOutstanding(_)
            | EngineError::AlreadyPassed(_)
            | EngineError::AlreadyCertified(_)
            | EngineError::DuplicateRequest
            | EngineError::RegistrationClosed => ErrorKind::StateConflict,

            EngineError::NoActivePlan(_)
            | EngineError::StudentNotFound(_)
            | EngineError::ExamNotFound
            | EngineError::RequestNotFound => ErrorKind::NotFound,

            EngineError::TrackMismatch { .. } => ErrorKind::Integrity,

            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Coarse error classes, mirroring how callers should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state change
    Validation,
    /// The request conflicts with current state; nothing was mutated
    StateConflict,
    /// A referenced entity does not exist
    NotFound,
    /// Programming/data error; logged, never silently corrupts the plan
    Integrity,
    /// Underlying storage failure
    Storage,
}
