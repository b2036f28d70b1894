//! Due-date arithmetic.
//!
//! Deadlines move in whole plan-duration steps: one step forward per
//! unpaused advance, never while the gate is closed.

use chrono::Duration;
use hifz_core::{Day, PlanDuration};

/// Days past the due date before a plan counts as overdue.
pub const GRACE_DAYS: i64 = 2;

/// Deadline for a plan starting on `start`.
pub fn initial_due_date(start: Day, duration: PlanDuration) -> Day {
    start + Duration::days(duration.days())
}

/// Extend an existing deadline by one duration step.
pub fn extend(due: Day, duration: PlanDuration) -> Day {
    due + Duration::days(duration.days())
}

/// Whether `today` is past the deadline plus the grace period.
pub fn past_grace(today: Day, due: Day) -> bool {
    today > due + Duration::days(GRACE_DAYS)
}
