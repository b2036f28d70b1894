//! Storage trait abstraction.

use async_trait::async_trait;
use hifz_core::{
    ExamCode, ExamRecord, ExamRecordId, ExamRequest, Plan, PlanId, RegistrationWindows,
    RequestId, Student, StudentId,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Storage abstraction for Hifz data.
///
/// This trait allows different storage backends to be plugged in.
#[async_trait]
pub trait Storage: Send + Sync {
    // === Student operations ===

    /// Save a student (create or update).
    async fn save_student(&mut self, student: &Student) -> Result<()>;

    /// Load a student by ID.
    async fn load_student(&self, id: StudentId) -> Result<Option<Student>>;

    // === Plan operations ===

    /// Save a plan (create or update).
    async fn save_plan(&mut self, plan: &Plan) -> Result<()>;

    /// Load a plan by ID.
    async fn load_plan(&self, id: PlanId) -> Result<Option<Plan>>;

    /// List a student's plans, newest first.
    async fn list_plans(&self, student_id: StudentId) -> Result<Vec<Plan>>;

    /// The authoritative plan: the student's most-recently-created approved row.
    async fn active_plan(&self, student_id: StudentId) -> Result<Option<Plan>> {
        Ok(self
            .list_plans(student_id)
            .await?
            .into_iter()
            .find(|p| p.approved))
    }

    /// Every student's authoritative plan (for the overdue sweep).
    async fn list_active_plans(&self) -> Result<Vec<Plan>>;

    // === Exam record operations ===

    /// Insert or merge an exam record.
    ///
    /// The identity key is (student, code, official): a record with the same
    /// key overwrites passed/score/taken_on in place and keeps the existing
    /// request link when the new record carries none. Never duplicates.
    async fn upsert_exam(&mut self, record: &ExamRecord) -> Result<ExamRecord>;

    /// Load an exam record by ID.
    async fn load_exam(&self, id: ExamRecordId) -> Result<Option<ExamRecord>>;

    /// Find the record for a (student, code, official) key.
    async fn find_exam(
        &self,
        student_id: StudentId,
        code: ExamCode,
        official: bool,
    ) -> Result<Option<ExamRecord>>;

    /// List all of a student's exam records.
    async fn list_exams(&self, student_id: StudentId) -> Result<Vec<ExamRecord>>;

    /// Delete an exam record.
    async fn delete_exam(&mut self, id: ExamRecordId) -> Result<()>;

    /// Delete every record attached to a request. Returns how many went.
    async fn delete_exams_by_request(&mut self, request_id: RequestId) -> Result<usize>;

    // === Exam request operations ===

    /// Save an exam request (create or update).
    async fn save_request(&mut self, request: &ExamRequest) -> Result<()>;

    /// Load an exam request by ID.
    async fn load_request(&self, id: RequestId) -> Result<Option<ExamRequest>>;

    /// List all of a student's exam requests.
    async fn list_requests(&self, student_id: StudentId) -> Result<Vec<ExamRequest>>;

    /// Delete an exam request.
    async fn delete_request(&mut self, id: RequestId) -> Result<()>;

    // === Registration windows ===

    /// Load the registration blackout configuration.
    async fn load_registration(&self) -> Result<RegistrationWindows>;

    /// Save the registration blackout configuration.
    async fn save_registration(&mut self, windows: &RegistrationWindows) -> Result<()>;

    // === Unit-of-work support ===

    /// Commit pending changes with a message.
    async fn commit(&mut self, message: &str) -> Result<()>;

    /// Rollback pending changes.
    async fn rollback(&mut self) -> Result<()>;
}
