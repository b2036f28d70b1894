//! Plan model - a student's approved memorization schedule.

use std::collections::BTreeSet;
use serde::{Deserialize, Serialize};
use crate::exam::{OfficialCode, PartNumber};
use crate::id::{PlanId, StudentId};
use crate::{Day, Time};

/// A memorization plan.
///
/// The most-recently-created approved plan is the authoritative one for a
/// student; older rows are history, unapproved rows are pending review. The
/// pointer and gate fields are mutated only by the progression engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier
    pub id: PlanId,

    /// Owning student
    pub student_id: StudentId,

    /// Next part the student should attempt (1..=30)
    pub current_part: PartNumber,

    /// Whether progress is gated on outstanding official exams
    pub paused_for_official: bool,

    /// Official exams that must pass before the gate reopens
    pub outstanding_official: BTreeSet<OfficialCode>,

    /// Plan start date
    pub start_date: Day,

    /// Current deadline; extended one duration unit per unpaused advance
    pub due_date: Day,

    /// Length of one scheduling unit
    pub duration: PlanDuration,

    /// How the plan continues from the student's prior history
    pub continuation: ContinuationMode,

    /// Contiguous part range the student had already recited at submission
    pub prior_parts: Option<PartRange>,

    /// Official exams the student declared as already passed at submission
    pub prior_officials: Vec<OfficialCode>,

    /// Administrative approval
    pub approved: bool,

    /// Created at
    pub created_at: Time,
}

impl Plan {
    /// Check the gate invariant: paused iff codes are outstanding.
    pub fn gate_consistent(&self) -> bool {
        self.paused_for_official == !self.outstanding_official.is_empty()
    }
}

/// Scheduling unit of a plan deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    /// Calendar days
    Day,
    /// Calendar weeks
    Week,
}

/// One deadline extension step: `value` days or weeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanDuration {
    /// Day or week
    pub unit: DurationUnit,

    /// Number of units, at least 1
    pub value: u32,
}

impl PlanDuration {
    /// Number of calendar days in one extension step.
    pub fn days(&self) -> i64 {
        match self.unit {
            DurationUnit::Week => i64::from(self.value) * 7,
            DurationUnit::Day => i64::from(self.value),
        }
    }
}

/// Where a new plan picks up relative to the student's prior history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationMode {
    /// Start at the beginning of the prior range (or part 1)
    FromStart,
    /// Resume at the end of the prior range
    FromEnd,
    /// Resume at an explicitly chosen part
    Specific(PartNumber),
}

/// Inclusive contiguous range of parts, e.g. 1..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartRange {
    /// First part in the range
    pub start: PartNumber,

    /// Last part in the range
    pub end: PartNumber,
}

impl PartRange {
    /// Build a range, normalizing order.
    pub fn new(start: PartNumber, end: PartNumber) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// Whether the range contains the part.
    pub fn contains(&self, part: PartNumber) -> bool {
        self.start <= part && part <= self.end
    }

    /// Iterate the parts in the range.
    pub fn iter(&self) -> impl Iterator<Item = PartNumber> {
        (self.start.get()..=self.end.get()).filter_map(PartNumber::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: u8) -> PartNumber {
        PartNumber::new(n).unwrap()
    }

    #[test]
    fn duration_days() {
        let d = PlanDuration { unit: DurationUnit::Week, value: 2 };
        assert_eq!(d.days(), 14);
        let d = PlanDuration { unit: DurationUnit::Day, value: 10 };
        assert_eq!(d.days(), 10);
    }

    #[test]
    fn part_range_contains_and_iterates() {
        let r = PartRange::new(part(3), part(6));
        assert!(r.contains(part(3)));
        assert!(r.contains(part(6)));
        assert!(!r.contains(part(7)));
        let parts: Vec<u8> = r.iter().map(PartNumber::get).collect();
        assert_eq!(parts, vec![3, 4, 5, 6]);
    }

    #[test]
    fn part_range_normalizes_order() {
        let r = PartRange::new(part(9), part(4));
        assert_eq!(r.start.get(), 4);
        assert_eq!(r.end.get(), 9);
    }
}
