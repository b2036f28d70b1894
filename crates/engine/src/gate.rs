//! Official-exam gate: closing, reopening, and revocation.

use hifz_core::{requirements, OfficialCode, PartNumber, Plan, StudentId};
use hifz_storage::Storage;
use tracing::{debug, info};

use crate::error::{EngineError, Result};
use crate::progression::passing_officials;
use crate::scheduler;

/// Reopen the gate (or shrink the outstanding set) after a passed official.
///
/// Removes the code, then re-verifies every remaining outstanding code
/// against the ledger rather than trusting the stored list; codes that
/// turn out to be satisfied are pruned too. The part pointer is never
/// moved here: the student resumes exactly where the pause left them, and
/// only the next part success advances the pointer. The deadline is
/// extended one duration step exactly when the gate transitions from
/// closed to open.
///
/// No-op (returns `None`) when the student has no approved plan.
pub async fn clear_pause_on_official_pass<S: Storage>(
    storage: &mut S,
    student_id: StudentId,
    code: OfficialCode,
) -> Result<Option<Plan>> {
    let Some(mut plan) = storage.active_plan(student_id).await? else {
        debug!(%student_id, %code, "official pass without an approved plan");
        return Ok(None);
    };

    let records = storage.list_exams(student_id).await?;
    let satisfied = passing_officials(&records);

    let was_paused = plan.paused_for_official;
    plan.outstanding_official.remove(&code);
    plan.outstanding_official
        .retain(|c| !satisfied.contains(c));

    let still_missing = !plan.outstanding_official.is_empty();
    plan.paused_for_official = still_missing;

    if was_paused && !still_missing {
        plan.due_date = scheduler::extend(plan.due_date, plan.duration);
        info!(%student_id, %code, due = %plan.due_date, "official gate reopened");
    }

    debug_assert!(plan.gate_consistent());
    storage.save_plan(&plan).await.map_err(EngineError::from)?;
    Ok(Some(plan))
}

/// Corrective path: a previously-passed official exam was revoked.
///
/// Forces the pause back on, puts the code back in the outstanding set,
/// and rewinds the part pointer to the milestone edge the code certifies,
/// so the student re-sits from the edge rather than past it.
pub async fn reopen_on_official_revocation<S: Storage>(
    storage: &mut S,
    student_id: StudentId,
    code: OfficialCode,
) -> Result<Option<Plan>> {
    let Some(mut plan) = storage.active_plan(student_id).await? else {
        return Ok(None);
    };

    plan.paused_for_official = true;
    plan.outstanding_official.insert(code);
    if let Some(edge) = PartNumber::new(requirements::edge_from_code(code)) {
        plan.current_part = edge;
    }

    info!(%student_id, %code, current = %plan.current_part, "official revoked; gate re-closed");

    debug_assert!(plan.gate_consistent());
    storage.save_plan(&plan).await.map_err(EngineError::from)?;
    Ok(Some(plan))
}
