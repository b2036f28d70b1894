//! JSON file storage implementation.
//!
//! Stores data as JSON files in a `.hifz` directory, one file per entity.
//! Exam records are named by their merge key (student, code, official), so
//! the upsert invariant holds structurally: a second write for the same key
//! lands on the same file.

use std::path::Path;
use std::sync::Arc;
use hifz_core::{
    ExamCode, ExamRecord, ExamRecordId, ExamRequest, Plan, PlanId, RegistrationWindows,
    RequestId, Student, StudentId,
};
use super::{Result, Storage, StorageError};
use tokio::fs;
use tokio::sync::Mutex;

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: std::path::PathBuf,
    pending: Arc<Mutex<bool>>,
}

impl JsonStorage {
    /// Create storage, making the per-entity subdirectories as needed.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("students")).await?;
        fs::create_dir_all(root.join("plans")).await?;
        fs::create_dir_all(root.join("exams")).await?;
        fs::create_dir_all(root.join("requests")).await?;

        Ok(Self {
            root,
            pending: Arc::new(Mutex::new(false)),
        })
    }

    fn student_path(&self, id: StudentId) -> std::path::PathBuf {
        self.root.join("students").join(format!("{}.json", id))
    }
    fn plan_path(&self, id: PlanId) -> std::path::PathBuf {
        self.root.join("plans").join(format!("{}.json", id))
    }
    fn exam_path(&self, student_id: StudentId, code: ExamCode, official: bool) -> std::path::PathBuf {
        // The merge key is the file name.
        let flag = if official { "official" } else { "part" };
        self.root
            .join("exams")
            .join(format!("{}_{}_{}.json", student_id, code, flag))
    }
    fn request_path(&self, id: RequestId) -> std::path::PathBuf {
        self.root.join("requests").join(format!("{}.json", id))
    }
    fn registration_path(&self) -> std::path::PathBuf {
        self.root.join("registration.json")
    }

    async fn set_pending(&self) {
        *self.pending.lock().await = true;
    }

    async fn all_exams(&self) -> Result<Vec<ExamRecord>> {
        list_dir(&self.root.join("exams")).await
    }
}

#[async_trait::async_trait]
impl Storage for JsonStorage {
    async fn save_student(&mut self, student: &Student) -> Result<()> {
        write_json(&self.student_path(student.id), student).await?;
        self.set_pending().await;
        Ok(())
    }

    async fn load_student(&self, id: StudentId) -> Result<Option<Student>> {
        read_json(&self.student_path(id)).await
    }

    async fn save_plan(&mut self, plan: &Plan) -> Result<()> {
        write_json(&self.plan_path(plan.id), plan).await?;
        self.set_pending().await;
        Ok(())
    }

    async fn load_plan(&self, id: PlanId) -> Result<Option<Plan>> {
        read_json(&self.plan_path(id)).await
    }

    async fn list_plans(&self, student_id: StudentId) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = list_dir(&self.root.join("plans"))
            .await?
            .into_iter()
            .filter(|p: &Plan| p.student_id == student_id)
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(plans)
    }

    async fn list_active_plans(&self) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = list_dir(&self.root.join("plans")).await?;
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        // Newest approved plan per student.
        let mut seen = std::collections::HashSet::new();
        Ok(plans
            .into_iter()
            .filter(|p| p.approved && seen.insert(p.student_id))
            .collect())
    }

    async fn upsert_exam(&mut self, record: &ExamRecord) -> Result<ExamRecord> {
        let path = self.exam_path(record.student_id, record.code, record.official);

        let mut merged = record.clone();
        if let Some(existing) = read_json::<ExamRecord>(&path).await? {
            // Keep the stable identity and any request link the regrade
            // did not re-supply.
            merged.id = existing.id;
            if merged.request_id.is_none() {
                merged.request_id = existing.request_id;
            }
        }

        write_json(&path, &merged).await?;
        self.set_pending().await;
        Ok(merged)
    }

    async fn load_exam(&self, id: ExamRecordId) -> Result<Option<ExamRecord>> {
        Ok(self.all_exams().await?.into_iter().find(|e| e.id == id))
    }

    async fn find_exam(
        &self,
        student_id: StudentId,
        code: ExamCode,
        official: bool,
    ) -> Result<Option<ExamRecord>> {
        read_json(&self.exam_path(student_id, code, official)).await
    }

    async fn list_exams(&self, student_id: StudentId) -> Result<Vec<ExamRecord>> {
        Ok(self
            .all_exams()
            .await?
            .into_iter()
            .filter(|e| e.student_id == student_id)
            .collect())
    }

    async fn delete_exam(&mut self, id: ExamRecordId) -> Result<()> {
        let Some(record) = self.load_exam(id).await? else {
            return Err(StorageError::NotFound(format!("exam record {}", id)));
        };
        remove_if_exists(&self.exam_path(record.student_id, record.code, record.official)).await?;
        self.set_pending().await;
        Ok(())
    }

    async fn delete_exams_by_request(&mut self, request_id: RequestId) -> Result<usize> {
        let mut deleted = 0;
        for record in self.all_exams().await? {
            if record.request_id == Some(request_id) {
                remove_if_exists(&self.exam_path(record.student_id, record.code, record.official))
                    .await?;
                deleted += 1;
            }
        }
        if deleted > 0 {
            self.set_pending().await;
        }
        Ok(deleted)
    }

    async fn save_request(&mut self, request: &ExamRequest) -> Result<()> {
        write_json(&self.request_path(request.id), request).await?;
        self.set_pending().await;
        Ok(())
    }

    async fn load_request(&self, id: RequestId) -> Result<Option<ExamRequest>> {
        read_json(&self.request_path(id)).await
    }

    async fn list_requests(&self, student_id: StudentId) -> Result<Vec<ExamRequest>> {
        let mut requests: Vec<ExamRequest> = list_dir(&self.root.join("requests"))
            .await?
            .into_iter()
            .filter(|r: &ExamRequest| r.student_id == student_id)
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn delete_request(&mut self, id: RequestId) -> Result<()> {
        remove_if_exists(&self.request_path(id)).await?;
        self.set_pending().await;
        Ok(())
    }

    async fn load_registration(&self) -> Result<RegistrationWindows> {
        Ok(read_json(&self.registration_path()).await?.unwrap_or_default())
    }

    async fn save_registration(&mut self, windows: &RegistrationWindows) -> Result<()> {
        write_json(&self.registration_path(), windows).await?;
        self.set_pending().await;
        Ok(())
    }

    async fn commit(&mut self, _message: &str) -> Result<()> {
        // Files are already on disk; commit just clears the pending flag.
        *self.pending.lock().await = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        // No snapshot to restore; rollback clears the pending flag.
        *self.pending.lock().await = false;
        Ok(())
    }
}

async fn write_json<T: serde::Serialize>(path: &std::path::Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json.as_bytes()).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &std::path::Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Ok(Some(item)) = read_json(&entry.path()).await {
            items.push(item);
        }
    }
    Ok(items)
}

async fn remove_if_exists(path: &std::path::Path) -> Result<()> {
    fs::remove_file(path).await.or_else(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Ok(())
        } else {
            Err(e)
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use hifz_core::{Gender, OfficialCode, PartNumber, Track};

    async fn storage() -> (tempfile::TempDir, JsonStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        (dir, storage)
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn student_round_trip() {
        let (_dir, mut storage) = storage().await;
        let student = Student::new("Ahmad", Track::Regular, Gender::Male);
        storage.save_student(&student).await.unwrap();
        let loaded = storage.load_student(student.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Ahmad");
        assert_eq!(loaded.track, Track::Regular);
        assert!(!loaded.is_qualified);
    }

    #[tokio::test]
    async fn upsert_exam_merges_instead_of_duplicating() {
        let (_dir, mut storage) = storage().await;
        let sid = StudentId::new();
        let code = ExamCode::Part(PartNumber::new(3).unwrap());

        let first = ExamRecord::new(sid, code, false, false, day(2026, 2, 1));
        storage.upsert_exam(&first).await.unwrap();

        // Regrade: same key, now passing.
        let second = ExamRecord::new(sid, code, false, true, day(2026, 2, 8));
        let merged = storage.upsert_exam(&second).await.unwrap();

        assert_eq!(merged.id, first.id);
        let all = storage.list_exams(sid).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].passed);
        assert_eq!(all[0].taken_on, day(2026, 2, 8));
    }

    #[tokio::test]
    async fn upsert_keeps_existing_request_link() {
        let (_dir, mut storage) = storage().await;
        let sid = StudentId::new();
        let code = ExamCode::Official(OfficialCode::F1);
        let rid = RequestId::new();

        let mut first = ExamRecord::new(sid, code, true, false, day(2026, 3, 1));
        first.request_id = Some(rid);
        storage.upsert_exam(&first).await.unwrap();

        let second = ExamRecord::new(sid, code, true, true, day(2026, 3, 5));
        let merged = storage.upsert_exam(&second).await.unwrap();
        assert_eq!(merged.request_id, Some(rid));
    }

    #[tokio::test]
    async fn part_and_official_records_are_distinct_keys() {
        let (_dir, mut storage) = storage().await;
        let sid = StudentId::new();
        let code = ExamCode::Part(PartNumber::new(5).unwrap());

        storage
            .upsert_exam(&ExamRecord::new(sid, code, false, true, day(2026, 1, 1)))
            .await
            .unwrap();
        storage
            .upsert_exam(&ExamRecord::new(sid, code, true, true, day(2026, 1, 2)))
            .await
            .unwrap();

        assert_eq!(storage.list_exams(sid).await.unwrap().len(), 2);
        assert!(storage.find_exam(sid, code, false).await.unwrap().is_some());
        assert!(storage.find_exam(sid, code, true).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_exams_by_request_cascades() {
        let (_dir, mut storage) = storage().await;
        let sid = StudentId::new();
        let rid = RequestId::new();

        for n in [1u8, 2] {
            let mut record = ExamRecord::new(
                sid,
                ExamCode::Part(PartNumber::new(n).unwrap()),
                false,
                true,
                day(2026, 4, 1),
            );
            record.request_id = Some(rid);
            storage.upsert_exam(&record).await.unwrap();
        }

        let deleted = storage.delete_exams_by_request(rid).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(storage.list_exams(sid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn registration_defaults_to_open() {
        let (_dir, storage) = storage().await;
        let windows = storage.load_registration().await.unwrap();
        assert_eq!(windows, RegistrationWindows::default());
    }
}
