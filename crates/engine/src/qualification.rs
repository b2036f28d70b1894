//! Full-qualification evaluation.

use hifz_core::{requirements, Student, StudentId};
use hifz_storage::Storage;
use tracing::info;

use crate::error::{EngineError, Result};
use crate::progression::passing_officials;

/// Promote the student if their passing officials cover the whole track set.
///
/// Idempotent: an already-qualified student is left untouched. Returns the
/// updated student when a promotion happened, `None` otherwise; the caller
/// dispatches the congratulation notification after its unit of work
/// commits.
pub async fn promote_if_qualified<S: Storage>(
    storage: &mut S,
    student_id: StudentId,
) -> Result<Option<Student>> {
    let Some(mut student) = storage.load_student(student_id).await? else {
        return Ok(None);
    };
    if student.is_qualified {
        return Ok(None);
    }

    let records = storage.list_exams(student_id).await?;
    let have = passing_officials(&records);
    let need = requirements::full_qualification_set(student.track);
    if !have.is_superset(&need) {
        return Ok(None);
    }

    // Qualification date: the day the last qualifying exam was taken.
    let qualified_on = records
        .iter()
        .filter(|r| r.passed && r.official)
        .map(|r| r.taken_on)
        .max();

    student.is_qualified = true;
    student.qualified_date = qualified_on;
    storage.save_student(&student).await.map_err(EngineError::from)?;

    info!(%student_id, track = %student.track, date = ?qualified_on, "student fully qualified");
    Ok(Some(student))
}
