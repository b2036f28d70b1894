//! Daily overdue sweep over active plans.

use hifz_core::Day;
use hifz_storage::Storage;
use tracing::debug;

use crate::error::Result;
use crate::notify::Notification;
use crate::progression::passed_parts;
use crate::{scheduler, validator};

/// Collect reminders for every active plan past its deadline and grace.
///
/// An unpaused plan is flagged when its current part has no passing
/// record and no active request; a paused plan is flagged for each
/// outstanding official exam nobody has requested yet. Plans inside the
/// grace period produce nothing.
pub async fn sweep<S: Storage>(storage: &S, today: Day) -> Result<Vec<Notification>> {
    let mut notifications = Vec::new();

    for plan in storage.list_active_plans().await? {
        if !scheduler::past_grace(today, plan.due_date) {
            continue;
        }
        let Some(student) = storage.load_student(plan.student_id).await? else {
            continue;
        };

        let records = storage.list_exams(plan.student_id).await?;
        let requests = storage.list_requests(plan.student_id).await?;

        if plan.paused_for_official {
            for &code in &plan.outstanding_official {
                let requested = requests
                    .iter()
                    .any(|r| r.kind.official_code() == Some(code) && validator::is_active(r, &records));
                if !requested {
                    notifications.push(Notification::OfficialPending {
                        student_id: student.id,
                        student_name: student.name.clone(),
                        code,
                        due_date: plan.due_date,
                    });
                }
            }
        } else {
            let silent = !passed_parts(&records).contains(&plan.current_part)
                && !requests.iter().any(|r| {
                    r.kind.part() == Some(plan.current_part) && validator::is_active(r, &records)
                });
            if silent {
                notifications.push(Notification::PartOverdue {
                    student_id: student.id,
                    student_name: student.name.clone(),
                    part: plan.current_part,
                    due_date: plan.due_date,
                });
            }
        }
    }

    debug!(count = notifications.len(), "overdue sweep complete");
    Ok(notifications)
}
