//! Engine facade: the unit-of-work operations callers drive.

use std::sync::Arc;
use hifz_core::{
    requirements, ContinuationMode, Day, ExamCode, ExamRecord, ExamRecordId, ExamRequest,
    OfficialCode, PartNumber, PartRange, Plan, PlanDuration, PlanId, RequestId, RequestKind,
    RunMode, StudentId, PASS_MARK,
};
use hifz_storage::Storage;
use tracing::{debug, error};

use crate::error::{EngineError, Result};
use crate::notify::{dispatch_all, LogNotifier, Notification, Notifier};
use crate::{gate, progression, qualification, reminder, scheduler, validator};

/// Which sitting of an official request is being graded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Trial sitting; recorded but never opens the gate.
    Trial,
    /// Official sitting; a pass opens the gate and counts toward
    /// qualification.
    Official,
}

/// Submission payload for a new plan.
#[derive(Debug, Clone)]
pub struct PlanSpec {
    /// Owning student
    pub student_id: StudentId,
    /// Contiguous part range already recited, if any
    pub prior_parts: Option<PartRange>,
    /// Official exams already passed, as declared at submission
    pub prior_officials: Vec<OfficialCode>,
    /// Where the plan picks up
    pub continuation: ContinuationMode,
    /// Deadline step size
    pub duration: PlanDuration,
    /// Approve immediately (administrative submission)
    pub approved: bool,
}

/// Read-only plan projection with the derived overdue flag.
#[derive(Debug, Clone)]
pub struct PlanStatus {
    /// The authoritative plan
    pub plan: Plan,
    /// Past due date + grace with no active request for the current part
    pub overdue: bool,
}

/// The gating engine.
///
/// Owns its storage: every mutating operation takes `&mut self`, so two
/// grading events for the same student cannot interleave; the exclusive
/// borrow is the in-process equivalent of the plan row lock. Validation
/// always runs before the first write, and a failing operation rolls the
/// unit of work back; notifications go out only after a commit.
pub struct GatingEngine<S: Storage> {
    storage: S,
    notifier: Arc<dyn Notifier>,
}

impl<S: Storage> GatingEngine<S> {
    /// Create an engine over the given storage, logging notifications.
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Replace the notification sink.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Shared access to the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Exclusive access to the underlying storage (seeding, admin edits).
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    // === Exam results ===

    /// Record a graded exam attempt and run its downstream effects.
    ///
    /// A passed part (non-redo) advances the plan; a passed official
    /// shrinks the gate and may promote the student. Re-sending the same
    /// result is idempotent: the ledger merges on (student, code,
    /// official) and downstream effects run once.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_exam_result(
        &mut self,
        student_id: StudentId,
        code: ExamCode,
        passed: bool,
        official: bool,
        score: Option<f64>,
        taken_on: Day,
        request_id: Option<RequestId>,
    ) -> Result<ExamRecord> {
        match self
            .apply_exam_result(student_id, code, passed, official, score, taken_on, request_id)
            .await
        {
            Ok((record, notifications)) => {
                self.storage.commit("record exam result").await?;
                dispatch_all(self.notifier.as_ref(), &notifications).await;
                Ok(record)
            }
            Err(e) => {
                let _ = self.storage.rollback().await;
                Err(e)
            }
        }
    }

    /// Grade an approved exam request by score.
    ///
    /// `stage` selects the sitting for official requests and is ignored
    /// for part requests. Scores at or above [`PASS_MARK`] pass.
    pub async fn grade_request(
        &mut self,
        request_id: RequestId,
        score: f64,
        stage: Stage,
    ) -> Result<ExamRecord> {
        let request = self
            .storage
            .load_request(request_id)
            .await?
            .filter(|r| r.approved == Some(true))
            .ok_or(EngineError::RequestNotFound)?;

        let (code, official, taken_on) = match &request.kind {
            RequestKind::Part { part, date, .. } => (ExamCode::Part(*part), false, *date),
            RequestKind::Official { code, trial_date, official_date } => {
                let official = stage == Stage::Official;
                let taken_on = match stage {
                    Stage::Trial => *trial_date,
                    Stage::Official => official_date.unwrap_or(*trial_date),
                };
                (ExamCode::Official(*code), official, taken_on)
            }
        };

        self.record_exam_result(
            request.student_id,
            code,
            score >= PASS_MARK,
            official,
            Some(score),
            taken_on,
            Some(request_id),
        )
        .await
    }

    /// Delete an exam record, cascading to its request and reversing the
    /// gate effects of a revoked passing official.
    pub async fn delete_exam_result(&mut self, exam_id: ExamRecordId) -> Result<()> {
        match self.apply_exam_deletion(exam_id).await {
            Ok(()) => self.storage.commit("delete exam result").await.map_err(Into::into),
            Err(e) => {
                let _ = self.storage.rollback().await;
                Err(e)
            }
        }
    }

    // === Plans ===

    /// Create a plan, seeding declared prior history into the ledger and
    /// deriving the initial pointer and gate state.
    pub async fn create_plan(&mut self, spec: PlanSpec, today: Day) -> Result<Plan> {
        match self.apply_plan_creation(spec, today).await {
            Ok(plan) => {
                self.storage.commit("create plan").await?;
                Ok(plan)
            }
            Err(e) => {
                let _ = self.storage.rollback().await;
                Err(e)
            }
        }
    }

    /// The student's authoritative plan plus its derived overdue flag.
    pub async fn get_active_plan(
        &self,
        student_id: StudentId,
        today: Day,
    ) -> Result<Option<PlanStatus>> {
        let Some(plan) = self.storage.active_plan(student_id).await? else {
            return Ok(None);
        };

        let mut overdue = scheduler::past_grace(today, plan.due_date);
        if overdue {
            // A student already booked for the current part is late but
            // not silent; the flag stays down.
            let records = self.storage.list_exams(student_id).await?;
            let requested = self
                .storage
                .list_requests(student_id)
                .await?
                .iter()
                .any(|r| r.kind.part() == Some(plan.current_part) && validator::is_active(r, &records));
            overdue = !requested;
        }

        Ok(Some(PlanStatus { plan, overdue }))
    }

    // === Exam requests ===

    /// Validate and file a new exam request (pending approval).
    pub async fn submit_exam_request(
        &mut self,
        student_id: StudentId,
        kind: RequestKind,
        today: Day,
    ) -> Result<ExamRequest> {
        match self.apply_request_submission(student_id, kind, today).await {
            Ok(request) => {
                self.storage.commit("submit exam request").await?;
                Ok(request)
            }
            Err(e) => {
                let _ = self.storage.rollback().await;
                Err(e)
            }
        }
    }

    /// Approve a pending exam request.
    pub async fn approve_request(&mut self, request_id: RequestId) -> Result<ExamRequest> {
        self.resolve_request(request_id, true).await
    }

    /// Reject a pending exam request.
    pub async fn reject_request(&mut self, request_id: RequestId) -> Result<ExamRequest> {
        self.resolve_request(request_id, false).await
    }

    async fn resolve_request(&mut self, request_id: RequestId, approve: bool) -> Result<ExamRequest> {
        let Some(mut request) = self.storage.load_request(request_id).await? else {
            return Err(EngineError::RequestNotFound);
        };
        request.approved = Some(approve);
        self.storage.save_request(&request).await?;
        self.storage.commit("resolve exam request").await?;
        Ok(request)
    }

    // === Configuration ===

    /// Replace the registration blackout windows.
    pub async fn update_registration(
        &mut self,
        windows: hifz_core::RegistrationWindows,
    ) -> Result<()> {
        self.storage.save_registration(&windows).await?;
        self.storage.commit("update registration windows").await?;
        Ok(())
    }

    // === Reminders ===

    /// Run the daily overdue sweep and dispatch the reminders it finds.
    pub async fn send_due_reminders(&mut self, today: Day) -> Result<Vec<Notification>> {
        let notifications = reminder::sweep(&self.storage, today).await?;
        dispatch_all(self.notifier.as_ref(), &notifications).await;
        Ok(notifications)
    }

    // === Internals ===

    #[allow(clippy::too_many_arguments)]
    async fn apply_exam_result(
        &mut self,
        student_id: StudentId,
        code: ExamCode,
        passed: bool,
        official: bool,
        score: Option<f64>,
        taken_on: Day,
        request_id: Option<RequestId>,
    ) -> Result<(ExamRecord, Vec<Notification>)> {
        let student = self
            .storage
            .load_student(student_id)
            .await?
            .ok_or(EngineError::StudentNotFound(student_id))?;

        // Writing a record for the other track's ladder is a data error.
        if let Some(official_code) = code.official() {
            if official_code.track() != student.track {
                error!(%official_code, track = %student.track, "exam code outside student track");
                return Err(EngineError::TrackMismatch {
                    code: official_code,
                    track: student.track,
                });
            }
        }

        // Whether this grading changes the ledger, as opposed to replaying
        // a pass already on it.
        let was_passing = self
            .storage
            .find_exam(student_id, code, official)
            .await?
            .is_some_and(|r| r.passed);

        let mut record = ExamRecord::new(student_id, code, official, passed, taken_on);
        record.score = score;
        record.request_id = request_id;
        let record = self.storage.upsert_exam(&record).await?;

        let is_redo = match record.request_id {
            Some(rid) => matches!(
                self.storage.load_request(rid).await?.map(|r| r.kind),
                Some(RequestKind::Part { run_mode: RunMode::Redo, .. })
            ),
            None => false,
        };

        let mut notifications = Vec::new();

        if let (true, Some(part)) = (passed && !is_redo, code.part()) {
            progression::advance_after_part_success(&mut self.storage, student_id, part, !was_passing)
                .await?;
        }

        if passed && official {
            if let Some(official_code) = code.official() {
                gate::clear_pause_on_official_pass(&mut self.storage, student_id, official_code)
                    .await?;
                if let Some(promoted) =
                    qualification::promote_if_qualified(&mut self.storage, student_id).await?
                {
                    notifications.push(Notification::QualificationEarned {
                        student_id,
                        student_name: promoted.name.clone(),
                        qualified_on: promoted.qualified_date,
                    });
                }
            }
        }

        // A failed part or failed official sitting retires its request so
        // the student can file a fresh one; a graded redo retires its
        // request either way. A failed trial leaves the request alive so
        // the official sitting can still be graded through it.
        let failed_trial = code.official().is_some() && !official;
        if let Some(rid) = record.request_id {
            if is_redo || (!passed && !failed_trial) {
                if let Some(mut request) = self.storage.load_request(rid).await? {
                    if request.approved == Some(true) {
                        request.approved = Some(false);
                        self.storage.save_request(&request).await?;
                    }
                }
            }
        }

        Ok((record, notifications))
    }

    async fn apply_exam_deletion(&mut self, exam_id: ExamRecordId) -> Result<()> {
        let Some(record) = self.storage.load_exam(exam_id).await? else {
            return Err(EngineError::ExamNotFound);
        };

        debug!(exam = %exam_id, code = %record.code, "deleting exam record");

        // A request-linked record takes its siblings and the request with
        // it, so the student can file anew.
        if let Some(rid) = record.request_id {
            self.storage.delete_exams_by_request(rid).await?;
            self.storage.delete_request(rid).await?;
        } else {
            self.storage.delete_exam(exam_id).await?;
        }

        if record.official && record.passed {
            if let Some(code) = record.code.official() {
                gate::reopen_on_official_revocation(&mut self.storage, record.student_id, code)
                    .await?;
            }
        }

        Ok(())
    }

    async fn apply_plan_creation(&mut self, spec: PlanSpec, today: Day) -> Result<Plan> {
        let student = self
            .storage
            .load_student(spec.student_id)
            .await?
            .ok_or(EngineError::StudentNotFound(spec.student_id))?;

        for &code in &spec.prior_officials {
            if code.track() != student.track {
                error!(%code, track = %student.track, "declared official outside student track");
                return Err(EngineError::TrackMismatch { code, track: student.track });
            }
        }

        let current_part = match spec.continuation {
            ContinuationMode::Specific(part) => part,
            ContinuationMode::FromEnd => spec
                .prior_parts
                .map(|r| r.end)
                .ok_or(EngineError::MissingPriorRange)?,
            ContinuationMode::FromStart => {
                spec.prior_parts.map(|r| r.start).unwrap_or(PartNumber::FIRST)
            }
        };

        // Seed declared history as ledger records; existing records win.
        if let Some(range) = spec.prior_parts {
            for part in range.iter() {
                let code = ExamCode::Part(part);
                if self.storage.find_exam(student.id, code, false).await?.is_none() {
                    self.storage
                        .upsert_exam(&ExamRecord::new(student.id, code, false, true, today))
                        .await?;
                }
            }
        }
        for &official in &spec.prior_officials {
            let code = ExamCode::Official(official);
            if self.storage.find_exam(student.id, code, true).await?.is_none() {
                self.storage
                    .upsert_exam(&ExamRecord::new(student.id, code, true, true, today))
                    .await?;
            }
        }

        // Initial gate state: every edge at or below the pointer must have
        // its officials actually passed, declared or not.
        let mut paused = false;
        let mut outstanding = std::collections::BTreeSet::new();
        if spec.prior_parts.is_some() {
            let records = self.storage.list_exams(student.id).await?;
            let satisfied = progression::passing_officials(&records);
            outstanding = requirements::edge_numbers(student.track)
                .iter()
                .filter(|&&edge| edge <= current_part.get())
                .flat_map(|&edge| requirements::required_official_codes(student.track, edge))
                .filter(|code| !satisfied.contains(code))
                .collect();
            paused = !outstanding.is_empty();
        }

        let plan = Plan {
            id: PlanId::new(),
            student_id: student.id,
            current_part,
            paused_for_official: paused,
            outstanding_official: outstanding,
            start_date: today,
            due_date: scheduler::initial_due_date(today, spec.duration),
            duration: spec.duration,
            continuation: spec.continuation,
            prior_parts: spec.prior_parts,
            prior_officials: spec.prior_officials,
            approved: spec.approved,
            created_at: chrono::Utc::now(),
        };

        debug_assert!(plan.gate_consistent());
        self.storage.save_plan(&plan).await?;
        Ok(plan)
    }

    async fn apply_request_submission(
        &mut self,
        student_id: StudentId,
        kind: RequestKind,
        today: Day,
    ) -> Result<ExamRequest> {
        let student = self
            .storage
            .load_student(student_id)
            .await?
            .ok_or(EngineError::StudentNotFound(student_id))?;
        let plan = self
            .storage
            .active_plan(student_id)
            .await?
            .ok_or(EngineError::NoActivePlan(student_id))?;
        let windows = self.storage.load_registration().await?;

        validator::admit(&mut self.storage, &windows, today, &student, &plan, &kind).await?;

        let request = ExamRequest {
            id: RequestId::new(),
            student_id,
            kind,
            approved: None,
            created_at: chrono::Utc::now(),
        };
        self.storage.save_request(&request).await?;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hifz_core::{DurationUnit, Gender, RegistrationWindows, Student, Track, Window};
    use hifz_storage::JsonStorage;
    use tempfile::TempDir;

    use crate::error::ErrorKind;

    fn day(y: i32, m: u32, d: u32) -> Day {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn part(n: u8) -> PartNumber {
        PartNumber::new(n).unwrap()
    }

    fn week() -> PlanDuration {
        PlanDuration { unit: DurationUnit::Week, value: 1 }
    }

    async fn engine(dir: &TempDir) -> GatingEngine<JsonStorage> {
        GatingEngine::new(JsonStorage::new(dir.path()).await.unwrap())
    }

    async fn add_student(engine: &mut GatingEngine<JsonStorage>, track: Track) -> Student {
        let student = Student::new("Maryam", track, Gender::Female);
        engine.storage_mut().save_student(&student).await.unwrap();
        student
    }

    fn fresh_spec(student_id: StudentId) -> PlanSpec {
        PlanSpec {
            student_id,
            prior_parts: None,
            prior_officials: Vec::new(),
            continuation: ContinuationMode::FromStart,
            duration: week(),
            approved: true,
        }
    }

    async fn pass_part(engine: &mut GatingEngine<JsonStorage>, student_id: StudentId, n: u8, on: Day) {
        engine
            .record_exam_result(student_id, ExamCode::Part(part(n)), true, false, None, on, None)
            .await
            .unwrap();
    }

    async fn current_plan(engine: &GatingEngine<JsonStorage>, student_id: StudentId) -> Plan {
        engine.storage().active_plan(student_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn regular_milestone_pauses_at_part_five() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();

        for n in 1..=4u8 {
            pass_part(&mut engine, student.id, n, day(2026, 3, n as u32)).await;
            let plan = current_plan(&engine, student.id).await;
            assert_eq!(plan.current_part, part(n + 1));
            assert!(!plan.paused_for_official);
        }

        pass_part(&mut engine, student.id, 5, day(2026, 3, 5)).await;
        let plan = current_plan(&engine, student.id).await;
        assert!(plan.paused_for_official);
        assert_eq!(plan.outstanding_official, [OfficialCode::F1].into_iter().collect());
        // The pointer stays put while the gate is closed.
        assert_eq!(plan.current_part, part(5));
        // Four open advances, each one week: 03-08 + 28 days.
        assert_eq!(plan.due_date, day(2026, 4, 5));
    }

    #[tokio::test]
    async fn intensive_final_bracket_owes_three_officials() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Intensive).await;

        let spec = PlanSpec {
            student_id: student.id,
            prior_parts: Some(PartRange::new(part(1), part(20))),
            prior_officials: vec![OfficialCode::T1, OfficialCode::H1, OfficialCode::T2],
            continuation: ContinuationMode::FromEnd,
            duration: week(),
            approved: true,
        };
        let plan = engine.create_plan(spec, day(2026, 3, 1)).await.unwrap();
        assert!(!plan.paused_for_official, "declared officials cover every edge through 20");

        for n in 21..=29u8 {
            pass_part(&mut engine, student.id, n, day(2026, 3, n as u32 - 20)).await;
        }
        let plan = current_plan(&engine, student.id).await;
        assert_eq!(plan.current_part, part(30));

        pass_part(&mut engine, student.id, 30, day(2026, 3, 12)).await;
        let plan = current_plan(&engine, student.id).await;
        assert!(plan.paused_for_official);
        assert_eq!(
            plan.outstanding_official,
            [OfficialCode::T3, OfficialCode::H2, OfficialCode::Q].into_iter().collect()
        );
    }

    #[tokio::test]
    async fn official_pass_reopens_gate_and_extends_deadline_once() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();
        for n in 1..=5u8 {
            pass_part(&mut engine, student.id, n, day(2026, 3, n as u32)).await;
        }

        let due_paused = current_plan(&engine, student.id).await.due_date;
        engine
            .record_exam_result(
                student.id,
                ExamCode::Official(OfficialCode::F1),
                true,
                true,
                Some(82.0),
                day(2026, 3, 20),
                None,
            )
            .await
            .unwrap();

        let plan = current_plan(&engine, student.id).await;
        assert!(!plan.paused_for_official);
        assert!(plan.outstanding_official.is_empty());
        assert_eq!(plan.current_part, part(5), "reopening never moves the pointer");
        assert_eq!(plan.due_date, due_paused + chrono::Duration::days(7));

        // Replaying the same pass leaves the deadline alone.
        engine
            .record_exam_result(
                student.id,
                ExamCode::Official(OfficialCode::F1),
                true,
                true,
                Some(82.0),
                day(2026, 3, 20),
                None,
            )
            .await
            .unwrap();
        let plan = current_plan(&engine, student.id).await;
        assert_eq!(plan.due_date, due_paused + chrono::Duration::days(7));

        // Part 5 is already on the ledger, so the next pass hops to 6.
        pass_part(&mut engine, student.id, 5, day(2026, 3, 21)).await;
        assert_eq!(current_plan(&engine, student.id).await.current_part, part(6));
    }

    #[tokio::test]
    async fn replayed_part_pass_merges_and_advances_once() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();

        pass_part(&mut engine, student.id, 1, day(2026, 3, 2)).await;
        pass_part(&mut engine, student.id, 1, day(2026, 3, 2)).await;

        let records = engine.storage().list_exams(student.id).await.unwrap();
        assert_eq!(records.len(), 1);
        let plan = current_plan(&engine, student.id).await;
        assert_eq!(plan.current_part, part(2));
        assert_eq!(plan.due_date, day(2026, 3, 15), "one extension, not two");
    }

    #[tokio::test]
    async fn qualification_needs_the_full_official_set() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;

        let codes = [
            OfficialCode::F1,
            OfficialCode::F2,
            OfficialCode::F3,
            OfficialCode::F4,
            OfficialCode::F5,
        ];
        for (i, code) in codes.into_iter().enumerate() {
            engine
                .record_exam_result(
                    student.id,
                    ExamCode::Official(code),
                    true,
                    true,
                    Some(70.0),
                    day(2026, 1, i as u32 + 1),
                    None,
                )
                .await
                .unwrap();
        }
        let loaded = engine.storage().load_student(student.id).await.unwrap().unwrap();
        assert!(!loaded.is_qualified, "five of six is not enough");

        engine
            .record_exam_result(
                student.id,
                ExamCode::Official(OfficialCode::F6),
                true,
                true,
                Some(70.0),
                day(2026, 2, 1),
                None,
            )
            .await
            .unwrap();
        let loaded = engine.storage().load_student(student.id).await.unwrap().unwrap();
        assert!(loaded.is_qualified);
        assert_eq!(loaded.qualified_date, Some(day(2026, 2, 1)));
    }

    #[tokio::test]
    async fn revoked_official_recloses_gate_and_rewinds() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();
        for n in 1..=5u8 {
            pass_part(&mut engine, student.id, n, day(2026, 3, n as u32)).await;
        }
        engine
            .record_exam_result(
                student.id,
                ExamCode::Official(OfficialCode::F1),
                true,
                true,
                None,
                day(2026, 3, 20),
                None,
            )
            .await
            .unwrap();
        pass_part(&mut engine, student.id, 5, day(2026, 3, 21)).await;
        assert_eq!(current_plan(&engine, student.id).await.current_part, part(6));

        let record = engine
            .storage()
            .find_exam(student.id, ExamCode::Official(OfficialCode::F1), true)
            .await
            .unwrap()
            .unwrap();
        engine.delete_exam_result(record.id).await.unwrap();

        let plan = current_plan(&engine, student.id).await;
        assert!(plan.paused_for_official);
        assert_eq!(plan.outstanding_official, [OfficialCode::F1].into_iter().collect());
        assert_eq!(plan.current_part, part(5), "pointer rewinds to the certified edge");
    }

    #[tokio::test]
    async fn plan_seeds_declared_history_and_derives_gate() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;

        let spec = PlanSpec {
            student_id: student.id,
            prior_parts: Some(PartRange::new(part(1), part(7))),
            prior_officials: Vec::new(),
            continuation: ContinuationMode::FromEnd,
            duration: week(),
            approved: true,
        };
        let plan = engine.create_plan(spec, day(2026, 3, 1)).await.unwrap();

        assert_eq!(plan.current_part, part(7));
        assert!(plan.paused_for_official, "edge 5 was crossed without its official");
        assert_eq!(plan.outstanding_official, [OfficialCode::F1].into_iter().collect());
        assert_eq!(plan.due_date, day(2026, 3, 8));

        let records = engine.storage().list_exams(student.id).await.unwrap();
        assert_eq!(records.len(), 7);
        assert!(records.iter().all(|r| r.passed && !r.official));
    }

    #[tokio::test]
    async fn request_admission_redo_and_gate() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        let spec = PlanSpec {
            student_id: student.id,
            prior_parts: Some(PartRange::new(part(1), part(5))),
            prior_officials: Vec::new(),
            continuation: ContinuationMode::FromEnd,
            duration: week(),
            approved: true,
        };
        engine.create_plan(spec, day(2026, 3, 1)).await.unwrap();
        let today = day(2026, 3, 2);

        // Normal re-sit of an already-recited part is rejected; redo works.
        let normal = RequestKind::Part {
            part: part(3),
            date: day(2026, 3, 4),
            run_mode: RunMode::Normal,
        };
        let err = engine.submit_exam_request(student.id, normal, today).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyPassed(p) if p == part(3)));

        let redo = RequestKind::Part {
            part: part(3),
            date: day(2026, 3, 4),
            run_mode: RunMode::Redo,
        };
        engine.submit_exam_request(student.id, redo, today).await.unwrap();

        // The closed gate blocks fresh parts but not the owed official.
        let fresh = RequestKind::Part {
            part: part(6),
            date: day(2026, 3, 4),
            run_mode: RunMode::Normal,
        };
        let err = engine.submit_exam_request(student.id, fresh, today).await.unwrap_err();
        assert!(matches!(err, EngineError::GateClosed));
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        let official = RequestKind::Official {
            code: OfficialCode::F1,
            trial_date: day(2026, 3, 5),
            official_date: Some(day(2026, 3, 6)),
        };
        engine.submit_exam_request(student.id, official, today).await.unwrap();

        // Wrong ladder and inverted dates never get through.
        let wrong_track = RequestKind::Official {
            code: OfficialCode::T1,
            trial_date: day(2026, 3, 5),
            official_date: Some(day(2026, 3, 6)),
        };
        let err = engine.submit_exam_request(student.id, wrong_track, today).await.unwrap_err();
        assert!(matches!(err, EngineError::TrackMismatch { .. }));

        let inverted = RequestKind::Official {
            code: OfficialCode::F1,
            trial_date: day(2026, 3, 6),
            official_date: Some(day(2026, 3, 5)),
        };
        let err = engine.submit_exam_request(student.id, inverted, today).await.unwrap_err();
        assert!(matches!(err, EngineError::OfficialBeforeTrial));
    }

    #[tokio::test]
    async fn graded_request_drives_progression() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();

        let kind = RequestKind::Part {
            part: part(1),
            date: day(2026, 3, 3),
            run_mode: RunMode::Normal,
        };
        let request = engine.submit_exam_request(student.id, kind, day(2026, 3, 2)).await.unwrap();
        assert_eq!(request.approved, None);

        // Grading an unapproved request is refused.
        let err = engine.grade_request(request.id, 75.0, Stage::Official).await.unwrap_err();
        assert!(matches!(err, EngineError::RequestNotFound));

        engine.approve_request(request.id).await.unwrap();
        let record = engine.grade_request(request.id, 75.0, Stage::Official).await.unwrap();
        assert!(record.passed);
        assert!(!record.official, "part exams are never official records");
        assert_eq!(record.request_id, Some(request.id));
        assert_eq!(current_plan(&engine, student.id).await.current_part, part(2));

        // A failing grade retires the request so a fresh one can be filed.
        let kind = RequestKind::Part {
            part: part(2),
            date: day(2026, 3, 10),
            run_mode: RunMode::Normal,
        };
        let request = engine.submit_exam_request(student.id, kind, day(2026, 3, 9)).await.unwrap();
        engine.approve_request(request.id).await.unwrap();
        let record = engine.grade_request(request.id, 41.0, Stage::Official).await.unwrap();
        assert!(!record.passed);
        let stored = engine.storage().load_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.approved, Some(false));
        assert_eq!(current_plan(&engine, student.id).await.current_part, part(2));
    }

    #[tokio::test]
    async fn official_request_graded_through_both_sittings() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();
        for n in 1..=5u8 {
            pass_part(&mut engine, student.id, n, day(2026, 3, n as u32)).await;
        }

        let kind = RequestKind::Official {
            code: OfficialCode::F1,
            trial_date: day(2026, 3, 10),
            official_date: Some(day(2026, 3, 17)),
        };
        let request = engine.submit_exam_request(student.id, kind, day(2026, 3, 9)).await.unwrap();
        engine.approve_request(request.id).await.unwrap();

        // The trial sitting is recorded but never touches the gate.
        let trial = engine.grade_request(request.id, 68.0, Stage::Trial).await.unwrap();
        assert!(!trial.official);
        assert!(current_plan(&engine, student.id).await.paused_for_official);

        let official = engine.grade_request(request.id, 74.0, Stage::Official).await.unwrap();
        assert!(official.official);
        assert_eq!(official.taken_on, day(2026, 3, 17));
        let plan = current_plan(&engine, student.id).await;
        assert!(!plan.paused_for_official);
        assert!(plan.outstanding_official.is_empty());
    }

    #[tokio::test]
    async fn overdue_projection_respects_pending_request() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();

        // Due 03-08; two days of grace end on 03-10.
        let status = engine.get_active_plan(student.id, day(2026, 3, 10)).await.unwrap().unwrap();
        assert!(!status.overdue);
        let status = engine.get_active_plan(student.id, day(2026, 3, 11)).await.unwrap().unwrap();
        assert!(status.overdue);

        let kind = RequestKind::Part {
            part: part(1),
            date: day(2026, 3, 12),
            run_mode: RunMode::Normal,
        };
        engine.submit_exam_request(student.id, kind, day(2026, 3, 5)).await.unwrap();
        let status = engine.get_active_plan(student.id, day(2026, 3, 11)).await.unwrap().unwrap();
        assert!(!status.overdue, "a booked exam quiets the overdue flag");
    }

    #[tokio::test]
    async fn failed_trial_keeps_official_request_alive() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();
        for n in 1..=5u8 {
            pass_part(&mut engine, student.id, n, day(2026, 3, n as u32)).await;
        }

        let kind = RequestKind::Official {
            code: OfficialCode::F1,
            trial_date: day(2026, 3, 10),
            official_date: Some(day(2026, 3, 17)),
        };
        let request = engine.submit_exam_request(student.id, kind, day(2026, 3, 9)).await.unwrap();
        engine.approve_request(request.id).await.unwrap();

        // A failed trial is recorded but the request survives it.
        let trial = engine.grade_request(request.id, 40.0, Stage::Trial).await.unwrap();
        assert!(!trial.passed);
        let stored = engine.storage().load_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.approved, Some(true), "the official sitting is still scheduled");

        // The scheduled official sitting grades through the same request.
        let official = engine.grade_request(request.id, 81.0, Stage::Official).await.unwrap();
        assert!(official.passed && official.official);
        assert!(!current_plan(&engine, student.id).await.paused_for_official);

        // A failed official sitting does retire its request.
        let record = engine
            .storage()
            .find_exam(student.id, ExamCode::Official(OfficialCode::F1), true)
            .await
            .unwrap()
            .unwrap();
        engine.delete_exam_result(record.id).await.unwrap();
        let kind = RequestKind::Official {
            code: OfficialCode::F1,
            trial_date: day(2026, 3, 20),
            official_date: Some(day(2026, 3, 27)),
        };
        let request = engine.submit_exam_request(student.id, kind, day(2026, 3, 19)).await.unwrap();
        engine.approve_request(request.id).await.unwrap();
        engine.grade_request(request.id, 44.0, Stage::Official).await.unwrap();
        let stored = engine.storage().load_request(request.id).await.unwrap().unwrap();
        assert_eq!(stored.approved, Some(false));
    }

    #[tokio::test]
    async fn out_of_order_pass_still_extends_deadline() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();

        // Part 2 ahead of part 1: the pointer stays on the hole behind,
        // but the week is still earned.
        pass_part(&mut engine, student.id, 2, day(2026, 3, 2)).await;
        let plan = current_plan(&engine, student.id).await;
        assert_eq!(plan.current_part, part(1));
        assert_eq!(plan.due_date, day(2026, 3, 15));

        // Replaying it earns nothing.
        pass_part(&mut engine, student.id, 2, day(2026, 3, 2)).await;
        let plan = current_plan(&engine, student.id).await;
        assert_eq!(plan.due_date, day(2026, 3, 15));

        // Filling the hole jumps past the already-heard part.
        pass_part(&mut engine, student.id, 1, day(2026, 3, 3)).await;
        let plan = current_plan(&engine, student.id).await;
        assert_eq!(plan.current_part, part(3));
        assert_eq!(plan.due_date, day(2026, 3, 22));
    }

    #[tokio::test]
    async fn duplicate_request_for_same_exam_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();
        let today = day(2026, 3, 2);

        let kind = RequestKind::Part {
            part: part(1),
            date: day(2026, 3, 4),
            run_mode: RunMode::Normal,
        };
        let first = engine.submit_exam_request(student.id, kind.clone(), today).await.unwrap();
        let err = engine.submit_exam_request(student.id, kind.clone(), today).await.unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRequest));
        assert_eq!(err.kind(), ErrorKind::StateConflict);

        // Grading the first request retires it, and the part is open again.
        engine.approve_request(first.id).await.unwrap();
        engine.grade_request(first.id, 40.0, Stage::Official).await.unwrap();
        engine.submit_exam_request(student.id, kind, today).await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_official_request_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        let spec = PlanSpec {
            student_id: student.id,
            prior_parts: Some(PartRange::new(part(1), part(5))),
            prior_officials: Vec::new(),
            continuation: ContinuationMode::FromEnd,
            duration: week(),
            approved: true,
        };
        engine.create_plan(spec, day(2026, 3, 1)).await.unwrap();

        let kind = RequestKind::Official {
            code: OfficialCode::F1,
            trial_date: day(2026, 3, 5),
            official_date: Some(day(2026, 3, 6)),
        };
        engine.submit_exam_request(student.id, kind.clone(), day(2026, 3, 2)).await.unwrap();
        let err = engine
            .submit_exam_request(student.id, kind, day(2026, 3, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateRequest));
    }

    #[tokio::test]
    async fn registration_blackout_blocks_submission() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();

        engine
            .update_registration(RegistrationWindows {
                part: Some(Window { from: day(2026, 3, 3), until: Some(day(2026, 3, 5)) }),
                official: None,
            })
            .await
            .unwrap();

        let kind = RequestKind::Part {
            part: part(1),
            date: day(2026, 3, 7),
            run_mode: RunMode::Normal,
        };
        let err = engine
            .submit_exam_request(student.id, kind.clone(), day(2026, 3, 4))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RegistrationClosed));

        // The part blackout does not touch official registration.
        let student2 = add_student(&mut engine, Track::Regular).await;
        let spec = PlanSpec {
            student_id: student2.id,
            prior_parts: Some(PartRange::new(part(1), part(5))),
            prior_officials: Vec::new(),
            continuation: ContinuationMode::FromEnd,
            duration: week(),
            approved: true,
        };
        engine.create_plan(spec, day(2026, 3, 1)).await.unwrap();
        let official = RequestKind::Official {
            code: OfficialCode::F1,
            trial_date: day(2026, 3, 5),
            official_date: Some(day(2026, 3, 6)),
        };
        engine.submit_exam_request(student2.id, official, day(2026, 3, 4)).await.unwrap();

        // Past the window the part request goes through.
        engine.submit_exam_request(student.id, kind, day(2026, 3, 6)).await.unwrap();
    }

    #[tokio::test]
    async fn request_outside_plan_window_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine(&dir).await;
        let student = add_student(&mut engine, Track::Regular).await;
        // Start 03-01, one week: due 03-08.
        engine.create_plan(fresh_spec(student.id), day(2026, 3, 1)).await.unwrap();

        let kind = RequestKind::Part {
            part: part(1),
            date: day(2026, 3, 12),
            run_mode: RunMode::Normal,
        };
        let err = engine
            .submit_exam_request(student.id, kind.clone(), day(2026, 3, 9))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PlanOutsideWindow));

        let err = engine
            .submit_exam_request(student.id, kind.clone(), day(2026, 2, 28))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::PlanOutsideWindow));

        engine.submit_exam_request(student.id, kind, day(2026, 3, 8)).await.unwrap();
    }
}
