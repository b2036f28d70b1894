//! Exam codes and graded exam records.

use serde::{Deserialize, Serialize};
use crate::id::{ExamRecordId, RequestId, StudentId};
use crate::student::Track;
use crate::Day;

/// Score at or above which an exam counts as passed.
pub const PASS_MARK: f64 = 60.0;

/// One of the 30 memorization parts, 1..=30.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PartNumber(u8);

impl PartNumber {
    /// Total number of parts.
    pub const COUNT: u8 = 30;

    /// Part 1, the start of the sequence.
    pub const FIRST: PartNumber = PartNumber(1);

    /// Validate a raw part number.
    pub fn new(n: u8) -> Option<Self> {
        (1..=Self::COUNT).contains(&n).then_some(Self(n))
    }

    /// The raw 1..=30 value.
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for PartNumber {
    type Error = CodeParseError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::new(n).ok_or(CodeParseError::PartOutOfRange(n))
    }
}

impl From<PartNumber> for u8 {
    fn from(p: PartNumber) -> u8 {
        p.0
    }
}

impl std::fmt::Display for PartNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Official examination codes, a closed set per track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OfficialCode {
    /// Regular track, parts 1-5
    F1,
    /// Regular track, parts 6-10
    F2,
    /// Regular track, parts 11-15
    F3,
    /// Regular track, parts 16-20
    F4,
    /// Regular track, parts 21-25
    F5,
    /// Regular track, parts 26-30
    F6,
    /// Intensive track, parts 1-10
    T1,
    /// Intensive track, parts 11-20
    T2,
    /// Intensive track, parts 21-30
    T3,
    /// Intensive track, first half review (parts 1-15)
    H1,
    /// Intensive track, second half review (parts 16-30)
    H2,
    /// Intensive track, full recitation (the khatmah exam)
    Q,
}

impl OfficialCode {
    /// The track this code belongs to.
    pub fn track(self) -> Track {
        match self {
            OfficialCode::F1
            | OfficialCode::F2
            | OfficialCode::F3
            | OfficialCode::F4
            | OfficialCode::F5
            | OfficialCode::F6 => Track::Regular,
            _ => Track::Intensive,
        }
    }
}

impl std::fmt::Display for OfficialCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OfficialCode::F1 => "F1",
            OfficialCode::F2 => "F2",
            OfficialCode::F3 => "F3",
            OfficialCode::F4 => "F4",
            OfficialCode::F5 => "F5",
            OfficialCode::F6 => "F6",
            OfficialCode::T1 => "T1",
            OfficialCode::T2 => "T2",
            OfficialCode::T3 => "T3",
            OfficialCode::H1 => "H1",
            OfficialCode::H2 => "H2",
            OfficialCode::Q => "Q",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for OfficialCode {
    type Err = CodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = match s {
            "F1" => OfficialCode::F1,
            "F2" => OfficialCode::F2,
            "F3" => OfficialCode::F3,
            "F4" => OfficialCode::F4,
            "F5" => OfficialCode::F5,
            "F6" => OfficialCode::F6,
            "T1" => OfficialCode::T1,
            "T2" => OfficialCode::T2,
            "T3" => OfficialCode::T3,
            "H1" => OfficialCode::H1,
            "H2" => OfficialCode::H2,
            "Q" => OfficialCode::Q,
            _ => return Err(CodeParseError::UnknownCode(s.to_string())),
        };
        Ok(code)
    }
}

/// An exam code: either a part code (`J01`..`J30`) or an official code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExamCode {
    /// Part recitation exam, wire form `J01`..`J30`.
    Part(PartNumber),
    /// Official milestone exam.
    Official(OfficialCode),
}

impl ExamCode {
    /// The part number if this is a part code.
    pub fn part(self) -> Option<PartNumber> {
        match self {
            ExamCode::Part(p) => Some(p),
            ExamCode::Official(_) => None,
        }
    }

    /// The official code if this is an official code.
    pub fn official(self) -> Option<OfficialCode> {
        match self {
            ExamCode::Part(_) => None,
            ExamCode::Official(c) => Some(c),
        }
    }
}

impl From<PartNumber> for ExamCode {
    fn from(p: PartNumber) -> Self {
        ExamCode::Part(p)
    }
}

impl From<OfficialCode> for ExamCode {
    fn from(c: OfficialCode) -> Self {
        ExamCode::Official(c)
    }
}

impl std::fmt::Display for ExamCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExamCode::Part(p) => write!(f, "J{:02}", p.get()),
            ExamCode::Official(c) => c.fmt(f),
        }
    }
}

impl std::str::FromStr for ExamCode {
    type Err = CodeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(digits) = s.strip_prefix('J') {
            // Exactly two digits: J01..J30
            if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CodeParseError::UnknownCode(s.to_string()));
            }
            let n: u8 = digits
                .parse()
                .map_err(|_| CodeParseError::UnknownCode(s.to_string()))?;
            return Ok(ExamCode::Part(PartNumber::try_from(n)?));
        }
        Ok(ExamCode::Official(s.parse()?))
    }
}

impl TryFrom<String> for ExamCode {
    type Error = CodeParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ExamCode> for String {
    fn from(c: ExamCode) -> String {
        c.to_string()
    }
}

/// Error parsing an exam code or part number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeParseError {
    /// Part number outside 1..=30
    #[error("part number out of range: {0}")]
    PartOutOfRange(u8),

    /// Not a valid part or official code
    #[error("unknown exam code: {0}")]
    UnknownCode(String),
}

/// A graded exam attempt.
///
/// At most one record exists per (student, code, official) key; regrades
/// overwrite the existing record through the storage upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamRecord {
    /// Unique identifier
    pub id: ExamRecordId,

    /// Student who sat the exam
    pub student_id: StudentId,

    /// Exam code
    pub code: ExamCode,

    /// Whether this attempt counts as official
    pub official: bool,

    /// Whether the student passed
    pub passed: bool,

    /// Score, when graded numerically
    pub score: Option<f64>,

    /// Date the exam was taken
    pub taken_on: Day,

    /// Originating exam request, if any
    pub request_id: Option<RequestId>,
}

impl ExamRecord {
    /// Create a pass/fail record without a numeric score.
    pub fn new(student_id: StudentId, code: ExamCode, official: bool, passed: bool, taken_on: Day) -> Self {
        Self {
            id: ExamRecordId::new(),
            student_id,
            code,
            official,
            passed,
            score: None,
            taken_on,
            request_id: None,
        }
    }

    /// Create a scored record; passed is derived from [`PASS_MARK`].
    pub fn scored(student_id: StudentId, code: ExamCode, official: bool, score: f64, taken_on: Day) -> Self {
        Self {
            id: ExamRecordId::new(),
            student_id,
            code,
            official,
            passed: score >= PASS_MARK,
            score: Some(score),
            taken_on,
            request_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_codes_parse_round_trip() {
        for n in 1..=30u8 {
            let code: ExamCode = ExamCode::Part(PartNumber::new(n).unwrap());
            let s = code.to_string();
            assert_eq!(s.len(), 3);
            assert_eq!(s.parse::<ExamCode>().unwrap(), code);
        }
        assert_eq!("J05".parse::<ExamCode>().unwrap(), ExamCode::Part(PartNumber::new(5).unwrap()));
    }

    #[test]
    fn rejects_invalid_part_codes() {
        assert!("J00".parse::<ExamCode>().is_err());
        assert!("J31".parse::<ExamCode>().is_err());
        assert!("J5".parse::<ExamCode>().is_err());
        assert!("J005".parse::<ExamCode>().is_err());
        assert!("X1".parse::<ExamCode>().is_err());
    }

    #[test]
    fn official_codes_parse() {
        for s in ["F1", "F2", "F3", "F4", "F5", "F6", "T1", "T2", "T3", "H1", "H2", "Q"] {
            let code: ExamCode = s.parse().unwrap();
            assert_eq!(code.to_string(), s);
            assert!(code.official().is_some());
        }
    }

    #[test]
    fn track_of_codes() {
        assert_eq!(OfficialCode::F3.track(), Track::Regular);
        assert_eq!(OfficialCode::Q.track(), Track::Intensive);
        assert_eq!(OfficialCode::H2.track(), Track::Intensive);
    }

    #[test]
    fn scored_record_uses_pass_mark() {
        let sid = StudentId::new();
        let day = chrono::NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let code = ExamCode::Part(PartNumber::new(1).unwrap());
        assert!(ExamRecord::scored(sid, code, false, 60.0, day).passed);
        assert!(!ExamRecord::scored(sid, code, false, 59.5, day).passed);
    }
}
