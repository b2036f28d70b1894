//! Exam request model - the admission ticket for sitting an exam.

use serde::{Deserialize, Serialize};
use crate::exam::{OfficialCode, PartNumber};
use crate::id::{RequestId, StudentId};
use crate::{Day, Time};

/// A request to sit an exam.
///
/// Lifecycle: pending (`approved = None`) → approved or rejected; an
/// approved request is *active* until an exam record attaches to it. A redo
/// supersedes an older approved request by flipping it to `Some(false)`
/// rather than deleting it, so the audit trail survives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamRequest {
    /// Unique identifier
    pub id: RequestId,

    /// Requesting student
    pub student_id: StudentId,

    /// What is being requested
    pub kind: RequestKind,

    /// None = pending, Some(true) = approved, Some(false) = rejected/superseded
    pub approved: Option<bool>,

    /// Created at
    pub created_at: Time,
}

impl ExamRequest {
    /// Create a pending part request.
    pub fn part(student_id: StudentId, part: PartNumber, date: Day, run_mode: RunMode) -> Self {
        Self {
            id: RequestId::new(),
            student_id,
            kind: RequestKind::Part { part, date, run_mode },
            approved: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Create a pending official request.
    pub fn official(
        student_id: StudentId,
        code: OfficialCode,
        trial_date: Day,
        official_date: Option<Day>,
    ) -> Self {
        Self {
            id: RequestId::new(),
            student_id,
            kind: RequestKind::Official { code, trial_date, official_date },
            approved: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Whether this row still counts toward the one-active-request rule.
    ///
    /// Rejected/superseded rows never do; pending and approved rows do until
    /// an exam record references them (checked against the ledger by the
    /// caller).
    pub fn is_live(&self) -> bool {
        self.approved != Some(false)
    }
}

/// Request payload, split by exam kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RequestKind {
    /// Part recitation exam
    Part {
        /// Target part
        part: PartNumber,
        /// Scheduled exam date
        date: Day,
        /// Normal first attempt or a redo of an already-passed part
        run_mode: RunMode,
    },
    /// Official milestone exam (trial sitting first, official sitting after)
    Official {
        /// Target official code
        code: OfficialCode,
        /// Trial sitting date
        trial_date: Day,
        /// Official sitting date; must be strictly after the trial
        official_date: Option<Day>,
    },
}

impl RequestKind {
    /// Part targeted by this request, if it is a part request.
    pub fn part(&self) -> Option<PartNumber> {
        match self {
            RequestKind::Part { part, .. } => Some(*part),
            RequestKind::Official { .. } => None,
        }
    }

    /// Official code targeted by this request, if it is an official request.
    pub fn official_code(&self) -> Option<OfficialCode> {
        match self {
            RequestKind::Part { .. } => None,
            RequestKind::Official { code, .. } => Some(*code),
        }
    }
}

/// Run mode for part requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// First attempt at a part
    Normal,
    /// Re-recitation of a part already passed
    Redo,
}
