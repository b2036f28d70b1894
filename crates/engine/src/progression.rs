//! Pointer advancement after a passed part exam.

use std::collections::BTreeSet;
use hifz_core::{
    pointer, requirements, ExamRecord, OfficialCode, PartNumber, Plan, StudentId, Track,
};
use hifz_storage::Storage;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::scheduler;

/// Parts with a passing, non-official record.
pub(crate) fn passed_parts(records: &[ExamRecord]) -> BTreeSet<PartNumber> {
    records
        .iter()
        .filter(|r| r.passed && !r.official)
        .filter_map(|r| r.code.part())
        .collect()
}

/// Official codes with a passing official record.
pub(crate) fn passing_officials(records: &[ExamRecord]) -> BTreeSet<OfficialCode> {
    records
        .iter()
        .filter(|r| r.passed && r.official)
        .filter_map(|r| r.code.official())
        .collect()
}

/// Whether every part in `prev+1 ..= edge` has been passed.
fn bracket_complete(passed: &BTreeSet<PartNumber>, prev: u8, edge: u8) -> bool {
    (prev + 1..=edge).all(|n| PartNumber::new(n).is_some_and(|p| passed.contains(&p)))
}

/// Recompute a student's plan after a passed (non-redo) part exam.
///
/// Checks whether the part completed its milestone bracket, closes the gate
/// on any official exams now owed, and, while the gate stays open, moves
/// the part pointer to the next gap. The deadline is pushed out one
/// duration step only when `newly_passed` is set, i.e. when the grading
/// put a pass on the ledger that was not there before. While paused, both
/// pointer and deadline are frozen.
///
/// No-op (returns `None`) when the student has no approved plan.
pub async fn advance_after_part_success<S: Storage>(
    storage: &mut S,
    student_id: StudentId,
    part: PartNumber,
    newly_passed: bool,
) -> Result<Option<Plan>> {
    let Some(mut plan) = storage.active_plan(student_id).await? else {
        debug!(%student_id, "no approved plan; part pass recorded without advancing");
        return Ok(None);
    };

    let track = storage
        .load_student(student_id)
        .await?
        .map(|s| s.track)
        .unwrap_or(Track::Regular);

    let records = storage.list_exams(student_id).await?;
    let passed = passed_parts(&records);
    let officials = passing_officials(&records);

    // Did this part complete its milestone bracket? Only the bracket the
    // part falls into is ever tested; a single pass elsewhere never
    // completes a milestone early.
    let (prev, edge) = requirements::bracket_for(track, part);
    let mut pending: BTreeSet<OfficialCode> = BTreeSet::new();
    if bracket_complete(&passed, prev, edge) {
        pending = requirements::required_official_codes(track, edge)
            .difference(&officials)
            .copied()
            .collect();
        debug!(%student_id, edge, ?pending, "milestone bracket complete");
    }

    // The pause flag is sticky: outstanding exams from an earlier milestone
    // keep the gate closed even if this bracket needs nothing new.
    let paused = !pending.is_empty() || plan.paused_for_official;

    // Outstanding set: prune anything already satisfied, fold in the new debt.
    plan.outstanding_official = plan
        .outstanding_official
        .difference(&officials)
        .copied()
        .chain(pending)
        .collect();
    plan.paused_for_official = paused;

    if !paused {
        // The pointer is a pure function of the ledger, so replaying the
        // same grading event lands on the same part. The deadline moves
        // only for a grading that changed the ledger; a pass that leaves
        // the pointer put (say, recited out of order) still earns its
        // extension.
        plan.current_part = pointer::next_gap(&passed, part);
        if newly_passed {
            plan.due_date = scheduler::extend(plan.due_date, plan.duration);
        }
    }

    debug_assert!(plan.gate_consistent());
    debug!(
        %student_id,
        part = %part,
        current = %plan.current_part,
        paused = plan.paused_for_official,
        "plan advanced after part success"
    );

    storage.save_plan(&plan).await.map_err(EngineError::from)?;
    Ok(Some(plan))
}
