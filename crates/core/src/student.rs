//! Student model - the person working through the 30 parts.

use serde::{Deserialize, Serialize};
use crate::id::StudentId;
use crate::{Day, Time};

/// A registered memorization student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    /// Unique identifier
    pub id: StudentId,

    /// Full name
    pub name: String,

    /// Contact address for notifications
    pub email: Option<String>,

    /// Program track
    pub track: Track,

    /// Gender, recorded for exam-session scheduling
    pub gender: Gender,

    /// Whether the student has completed the full official set
    pub is_qualified: bool,

    /// Date the qualification was earned
    pub qualified_date: Option<Day>,

    /// Created at
    pub created_at: Time,
}

impl Student {
    /// Create a new, unqualified student.
    pub fn new(name: impl Into<String>, track: Track, gender: Gender) -> Self {
        Self {
            id: StudentId::new(),
            name: name.into(),
            email: None,
            track,
            gender,
            is_qualified: false,
            qualified_date: None,
            created_at: chrono::Utc::now(),
        }
    }
}

/// Program track a student is enrolled in.
///
/// The track decides which official exams gate which milestones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Standard pace: an official exam every five parts.
    Regular,
    /// Consolidation track with its own exam ladder.
    Intensive,
}

impl std::fmt::Display for Track {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Track::Regular => write!(f, "regular"),
            Track::Intensive => write!(f, "intensive"),
        }
    }
}

/// Student gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    /// Male
    Male,
    /// Female
    Female,
}
