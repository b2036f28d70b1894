//! Admission control for new exam requests.

use hifz_core::{
    Day, ExamCode, ExamRecord, ExamRequest, Plan, RegistrationWindows, RequestKind, RunMode,
    Student,
};
use hifz_storage::Storage;
use tracing::{debug, error};

use crate::error::{EngineError, Result};

/// Whether a request row still blocks a new request for the same exam.
///
/// Rejected/superseded rows never block; pending or approved ones block
/// until an exam record attaches to them.
pub(crate) fn is_active(request: &ExamRequest, records: &[ExamRecord]) -> bool {
    request.is_live() && !records.iter().any(|r| r.request_id == Some(request.id))
}

/// Validate a prospective exam request, performing no writes except the
/// redo supersession.
///
/// On success the caller persists the pending request. Every rejection is
/// detected before any state change; the one write this function may do
/// (deactivating the prior approved request a redo replaces) only happens
/// on a path that then re-checks for remaining active duplicates.
pub async fn admit<S: Storage>(
    storage: &mut S,
    windows: &RegistrationWindows,
    today: Day,
    student: &Student,
    plan: &Plan,
    kind: &RequestKind,
) -> Result<()> {
    // Requests are only accepted while the plan is inside its window.
    if today < plan.start_date || today > plan.due_date {
        return Err(EngineError::PlanOutsideWindow);
    }

    match kind {
        RequestKind::Part { part, run_mode, .. } => {
            // A part inside the confirmed prior range was already recited;
            // it may only be re-requested as a redo.
            if *run_mode == RunMode::Normal {
                if let Some(range) = plan.prior_parts {
                    if range.contains(*part) {
                        return Err(EngineError::AlreadyPassed(*part));
                    }
                }
                if plan.paused_for_official {
                    return Err(EngineError::GateClosed);
                }
            }

            if windows.part_closed(today) {
                return Err(EngineError::RegistrationClosed);
            }

            // A redo supersedes whatever approved request it is re-running.
            if *run_mode == RunMode::Redo {
                let prior: Vec<ExamRequest> = storage
                    .list_requests(student.id)
                    .await?
                    .into_iter()
                    .filter(|r| r.approved == Some(true) && r.kind.part() == Some(*part))
                    .collect();
                for mut request in prior {
                    debug!(request = %request.id, part = %part, "redo supersedes prior request");
                    request.approved = Some(false);
                    storage.save_request(&request).await?;
                }
            }

            let records = storage.list_exams(student.id).await?;
            let duplicate = storage
                .list_requests(student.id)
                .await?
                .iter()
                .any(|r| r.kind.part() == Some(*part) && is_active(r, &records));
            if duplicate {
                return Err(EngineError::DuplicateRequest);
            }
        }

        RequestKind::Official { code, trial_date, official_date } => {
            if let Some(official) = official_date {
                if official <= trial_date {
                    return Err(EngineError::OfficialBeforeTrial);
                }
            }

            // A code from the other ladder reaching this point is a data
            // error, not a user mistake.
            if code.track() != student.track {
                error!(%code, track = %student.track, "official code outside student track");
                return Err(EngineError::TrackMismatch { code: *code, track: student.track });
            }

            let records = storage.list_exams(student.id).await?;
            let already_passed = records
                .iter()
                .any(|r| r.official && r.passed && r.code == ExamCode::Official(*code));
            if already_passed {
                return Err(EngineError::AlreadyCertified(*code));
            }

            if windows.official_closed(today) {
                return Err(EngineError::RegistrationClosed);
            }

            // Nothing to satisfy unless the gate is waiting on this code.
            if !plan.outstanding_official.contains(code) {
                return Err(EngineError::CodeNotOutstanding(*code));
            }

            let duplicate = storage
                .list_requests(student.id)
                .await?
                .iter()
                .any(|r| r.kind.official_code() == Some(*code) && is_active(r, &records));
            if duplicate {
                return Err(EngineError::DuplicateRequest);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hifz_core::{PartNumber, RequestId, StudentId};

    fn part(n: u8) -> PartNumber {
        PartNumber::new(n).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> Day {
        chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn request_with_attached_record_is_not_active() {
        let sid = StudentId::new();
        let request = ExamRequest::part(sid, part(4), day(2026, 2, 1), RunMode::Normal);

        let mut graded = ExamRecord::new(
            sid,
            ExamCode::Part(part(4)),
            false,
            true,
            day(2026, 2, 1),
        );
        graded.request_id = Some(request.id);

        assert!(is_active(&request, &[]));
        assert!(!is_active(&request, &[graded]));
    }

    #[test]
    fn superseded_request_is_not_active() {
        let sid = StudentId::new();
        let mut request = ExamRequest::part(sid, part(4), day(2026, 2, 1), RunMode::Normal);
        request.approved = Some(false);
        assert!(!is_active(&request, &[]));

        // A record for a *different* request does not retire this one.
        let mut other = ExamRecord::new(sid, ExamCode::Part(part(5)), false, true, day(2026, 2, 2));
        other.request_id = Some(RequestId::new());
        let mut pending = ExamRequest::part(sid, part(5), day(2026, 2, 2), RunMode::Normal);
        pending.approved = None;
        assert!(is_active(&pending, &[ExamRecord::new(
            sid,
            ExamCode::Part(part(9)),
            false,
            true,
            day(2026, 2, 3),
        )]));
    }
}
